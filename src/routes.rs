use axum::{
    extract::{FromRequest, Multipart, Path, Query, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::*,
    query::Select,
    store::Store,
    uploads::{Uploads, PUBLIC_PREFIX},
    validation,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub uploads: Uploads,
}

pub fn router(state: AppState) -> Router {
    let upload_dir = state.uploads.dir().to_path_buf();
    Router::new()
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/courses/:id", delete(delete_course))
        .route("/api/materials", get(list_materials).post(create_material))
        .route("/api/materials/:id", delete(delete_material))
        .route("/api/notes", get(list_notes).post(create_note))
        .route("/api/notes/:id", put(update_note).delete(delete_note))
        .route("/api/assignments", get(list_assignments).post(create_assignment))
        .route(
            "/api/assignments/:id",
            put(update_assignment).delete(delete_assignment),
        )
        .route("/api/general", get(list_general).post(create_general))
        .route("/api/general/:id", delete(delete_general))
        .route("/api/search", get(search))
        // stored material files
        .nest_service(PUBLIC_PREFIX, ServeDir::new(upload_dir))
        .with_state(state)
}

#[serde_as]
#[derive(Deserialize, Debug, Default)]
struct CourseScope {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    course_id: Option<String>,
}

#[serde_as]
#[derive(Deserialize, Debug, Default)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    course_id: Option<String>,
}

/// `Json` whose rejections come back as [`AppError`] bodies.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct AppJson<T>(T);

type Deleted = Json<serde_json::Value>;

fn deleted() -> Deleted {
    Json(serde_json::json!({ "success": true }))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// --- courses ---

async fn list_courses(State(st): State<AppState>) -> Json<Vec<Course>> {
    Json(st.store.select(&Select::all().sorted()))
}

async fn create_course(
    State(st): State<AppState>,
    AppJson(input): AppJson<CourseInput>,
) -> Result<Json<Course>> {
    validation::course(&input)?;
    Ok(Json(st.store.insert(new_id(), input)))
}

async fn delete_course(State(st): State<AppState>, Path(id): Path<String>) -> Deleted {
    // cascaded materials take their files with them
    for file in st.store.delete::<Course>(&id).file_paths() {
        st.uploads.remove(&file).await;
    }
    deleted()
}

// --- materials ---

async fn list_materials(
    State(st): State<AppState>,
    Query(scope): Query<CourseScope>,
) -> Json<Vec<Material>> {
    Json(st.store.select(&Select::scoped(scope.course_id).sorted()))
}

async fn create_material(
    State(st): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<Material>> {
    let mut input = MaterialInput::default();
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            // browsers send an empty part when no file was picked
            if !bytes.is_empty() || file_name.as_deref().is_some_and(|n| !n.is_empty()) {
                upload = Some((file_name, bytes.to_vec()));
            }
            continue;
        }
        let value = non_empty(field.text().await?);
        match name.as_str() {
            "course_id" => input.course_id = value,
            "type" => input.kind = value.unwrap_or_default(),
            "title" => input.title = value.unwrap_or_default(),
            "content" => input.content = value,
            "url" => input.url = value,
            "tags" => input.tags = value,
            _ => {}
        }
    }

    validation::material(&input, upload.is_some())?;

    if let Some((file_name, bytes)) = upload {
        input.file_path = Some(st.uploads.store(file_name.as_deref(), &bytes).await?);
    }
    let stored = input.file_path.clone();
    match st.store.insert_in_course(new_id(), input) {
        Ok(material) => Ok(Json(material)),
        Err(e) => {
            if let Some(file) = stored {
                st.uploads.remove(&file).await;
            }
            Err(e)
        }
    }
}

async fn delete_material(State(st): State<AppState>, Path(id): Path<String>) -> Deleted {
    for file in st.store.delete::<Material>(&id).file_paths() {
        st.uploads.remove(&file).await;
    }
    deleted()
}

// --- notes ---

async fn list_notes(
    State(st): State<AppState>,
    Query(scope): Query<CourseScope>,
) -> Json<Vec<Note>> {
    Json(st.store.select(&Select::scoped(scope.course_id).sorted()))
}

async fn create_note(
    State(st): State<AppState>,
    AppJson(input): AppJson<NoteInput>,
) -> Result<Json<Note>> {
    validation::note(&input.title)?;
    Ok(Json(st.store.insert_in_course(new_id(), input)?))
}

async fn update_note(
    State(st): State<AppState>,
    Path(id): Path<String>,
    AppJson(changes): AppJson<NoteChanges>,
) -> Result<Json<Note>> {
    validation::note(&changes.title)?;
    st.store
        .update(&id, changes)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("note {id}")))
}

async fn delete_note(State(st): State<AppState>, Path(id): Path<String>) -> Deleted {
    st.store.delete::<Note>(&id);
    deleted()
}

// --- assignments ---

async fn list_assignments(
    State(st): State<AppState>,
    Query(scope): Query<CourseScope>,
) -> Json<Vec<Assignment>> {
    Json(st.store.select(&Select::scoped(scope.course_id).sorted()))
}

async fn create_assignment(
    State(st): State<AppState>,
    AppJson(input): AppJson<AssignmentInput>,
) -> Result<Json<Assignment>> {
    validation::assignment(
        &input.title,
        input.due_date.as_deref(),
        input.status.as_deref(),
    )?;
    Ok(Json(st.store.insert_in_course(new_id(), input)?))
}

async fn update_assignment(
    State(st): State<AppState>,
    Path(id): Path<String>,
    AppJson(changes): AppJson<AssignmentChanges>,
) -> Result<Json<Assignment>> {
    validation::assignment(
        &changes.title,
        changes.due_date.as_deref(),
        changes.status.as_deref(),
    )?;
    st.store
        .update(&id, changes)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("assignment {id}")))
}

async fn delete_assignment(State(st): State<AppState>, Path(id): Path<String>) -> Deleted {
    st.store.delete::<Assignment>(&id);
    deleted()
}

// --- general items ---

async fn list_general(State(st): State<AppState>) -> Json<Vec<GeneralItem>> {
    Json(st.store.select(&Select::all().sorted()))
}

async fn create_general(
    State(st): State<AppState>,
    AppJson(input): AppJson<GeneralItemInput>,
) -> Result<Json<GeneralItem>> {
    validation::general_item(&input)?;
    Ok(Json(st.store.insert(new_id(), input)))
}

async fn delete_general(State(st): State<AppState>, Path(id): Path<String>) -> Deleted {
    st.store.delete::<GeneralItem>(&id);
    deleted()
}

// --- search ---

async fn search(
    State(st): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResults> {
    // an empty term matches every record
    let term = params.q.trim();
    let select = Select::scoped(params.course_id.clone()).matching(term);
    let courses = match params.course_id {
        Some(_) => Vec::new(),
        None => st.store.select(&Select::all().matching(term)),
    };
    Json(SearchResults {
        courses,
        materials: st.store.select(&select),
        notes: st.store.select(&select),
        assignments: st.store.select(&select),
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
