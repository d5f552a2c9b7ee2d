// JSON-file backed store; every mutation rewrites the whole file under one lock.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    error::{AppError, Result},
    models::{Document, Material},
    query::{Insert, Record, Select, Update},
};

#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    doc: Mutex<Document>,
}

/// Everything a delete removed: the record, if it existed, and the
/// materials that went with it.
#[derive(Debug)]
pub struct Deleted<R> {
    pub record: Option<R>,
    pub materials: Vec<Material>,
}

impl<R: Record> Deleted<R> {
    /// Upload paths referenced by the removed records.
    pub fn file_paths(&self) -> Vec<String> {
        self.record
            .iter()
            .filter_map(|r| r.file_path())
            .chain(self.materials.iter().filter_map(|m| m.file_path.as_deref()))
            .map(String::from)
            .collect()
    }
}

impl Store {
    /// Loads `path` if it exists and writes the (possibly fresh) document back
    /// so the file is there for the next run.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let store = Store {
            inner: Arc::new(Inner {
                path,
                doc: Mutex::new(Document::default()),
            }),
        };
        if store.load() {
            store.save();
        } else {
            tracing::warn!(path=%store.path().display(), "unreadable store file left in place");
        }
        tracing::info!(path = %store.path().display(), "store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Re-reads the backing file. A missing file leaves memory untouched. An
    /// unreadable one resets memory to an empty document and is renamed out of
    /// the way; returns false if that rename failed and the file must not be
    /// overwritten.
    pub fn load(&self) -> bool {
        let path = self.path();
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                tracing::error!(error=%e, path=%path.display(), "failed to read store, starting empty");
                *self.lock() = Document::default();
                return quarantine(path);
            }
        };
        match parse_document(&raw) {
            Ok(doc) => {
                *self.lock() = doc;
                true
            }
            Err(e) => {
                tracing::error!(error=%e, path=%path.display(), "failed to parse store, starting empty");
                *self.lock() = Document::default();
                quarantine(path)
            }
        }
    }

    pub fn save(&self) {
        let doc = self.lock();
        self.write(&doc);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Document {
        self.lock().clone()
    }

    pub fn select<R: Record>(&self, select: &Select) -> Vec<R> {
        let doc = self.lock();
        let mut rows: Vec<R> = R::rows(&doc)
            .iter()
            .filter(|r| select.accepts(*r))
            .cloned()
            .collect();
        if select.sorted {
            rows.sort_by(R::listing_order);
        }
        rows
    }

    pub fn select_one<R: Record>(&self, id: &str) -> Option<R> {
        self.select::<R>(&Select::by_id(id)).into_iter().next()
    }

    /// Stamps the record with the current time, appends it and persists.
    pub fn insert<I: Insert>(&self, id: String, fields: I) -> I::Record {
        let mut doc = self.lock();
        self.append(&mut doc, fields.into_record(id, Utc::now()))
    }

    /// Like [`Store::insert`], but a `course_id` naming no stored course is a
    /// validation error. The check and the insert share one lock, so a
    /// concurrent course delete cannot leave the record dangling.
    pub fn insert_in_course<I: Insert>(&self, id: String, fields: I) -> Result<I::Record> {
        let mut doc = self.lock();
        if let Some(course_id) = fields.course_id() {
            if !doc.courses.iter().any(|c| c.id == course_id) {
                return Err(AppError::validation(format!("course {course_id} does not exist")));
            }
        }
        Ok(self.append(&mut doc, fields.into_record(id, Utc::now())))
    }

    /// Returns the updated record, or `None` when `id` is unknown (nothing is written).
    pub fn update<U: Update>(&self, id: &str, changes: U) -> Option<U::Record> {
        let mut doc = self.lock();
        let record = U::Record::rows_mut(&mut doc)
            .iter_mut()
            .find(|r| r.id() == id)?;
        changes.apply(record, Utc::now());
        let updated = record.clone();
        tracing::debug!(collection=%U::Record::COLLECTION, id, "updated");
        self.write(&doc);
        Some(updated)
    }

    /// Removes the record and anything it owns. Unknown ids are a no-op, but
    /// the document is still rewritten.
    pub fn delete<R: Record>(&self, id: &str) -> Deleted<R> {
        let mut doc = self.lock();
        let rows = R::rows_mut(&mut doc);
        let idx = rows.iter().position(|r| r.id() == id);
        let record = idx.map(|idx| rows.remove(idx));
        rows.retain(|r| r.id() != id);
        let materials = R::cascade(&mut doc, id);
        tracing::debug!(
            collection=%R::COLLECTION,
            id,
            found=record.is_some(),
            cascaded_materials=materials.len(),
            "deleted"
        );
        self.write(&doc);
        Deleted { record, materials }
    }

    fn append<R: Record>(&self, doc: &mut Document, record: R) -> R {
        R::rows_mut(doc).push(record.clone());
        tracing::debug!(collection=%R::COLLECTION, id=%record.id(), "inserted");
        self.write(doc);
        record
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, doc: &Document) {
        let path = self.path();
        let result = serde_json::to_vec_pretty(doc)
            .map_err(std::io::Error::from)
            .and_then(|bytes| fs::write(path, bytes));
        if let Err(e) = result {
            tracing::error!(error=%e, path=%path.display(), "failed to save store");
        }
    }
}

// Collections are read as raw values first so one bad record costs only itself.
#[serde_as]
#[derive(Deserialize, Default)]
struct RawDocument {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    courses: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    materials: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    notes: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    assignments: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    general_items: Vec<Value>,
}

fn parse_document(raw: &[u8]) -> serde_json::Result<Document> {
    let raw: RawDocument = serde_json::from_slice(raw)?;
    Ok(Document {
        courses: readable(raw.courses),
        materials: readable(raw.materials),
        notes: readable(raw.notes),
        assignments: readable(raw.assignments),
        general_items: readable(raw.general_items),
    })
}

fn readable<R: Record + DeserializeOwned>(values: Vec<Value>) -> Vec<R> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(collection=%R::COLLECTION, index, error=%e, "dropping unreadable record");
                None
            }
        })
        .collect()
}

/// Renames an unreadable store file so the next save cannot overwrite it.
fn quarantine(path: &Path) -> bool {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
    let target = path.with_file_name(name);
    match fs::rename(path, &target) {
        Ok(()) => {
            tracing::warn!(saved_as=%target.display(), "kept unreadable store file");
            true
        }
        Err(e) => {
            tracing::error!(error=%e, "failed to set aside unreadable store file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::initialize(dir.path().join("database.json")).unwrap();
        (dir, store)
    }

    fn course(store: &Store, id: &str, name: &str) -> Course {
        store.insert(
            id.into(),
            CourseInput {
                name: name.into(),
                ..Default::default()
            },
        )
    }

    fn note(store: &Store, id: &str, course_id: Option<&str>, title: &str) -> Note {
        store.insert(
            id.into(),
            NoteInput {
                course_id: course_id.map(String::from),
                title: title.into(),
                content: "body".into(),
                tags: None,
            },
        )
    }

    fn assignment(store: &Store, id: &str, course_id: Option<&str>, due: Option<&str>) -> Assignment {
        store.insert(
            id.into(),
            AssignmentInput {
                course_id: course_id.map(String::from),
                title: format!("assignment {id}"),
                due_date: due.map(String::from),
                ..Default::default()
            },
        )
    }

    #[test]
    fn initialize_creates_empty_file() {
        let (dir, store) = open();
        let raw = fs::read_to_string(dir.path().join("database.json")).unwrap();
        let doc: Document = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc, Document::default());
        for key in ["courses", "materials", "notes", "assignments", "general_items"] {
            assert!(raw.contains(key), "missing {key}");
        }
        assert!(store.select::<Course>(&Select::all()).is_empty());
    }

    #[test]
    fn insert_then_select_one_returns_stamped_record() {
        let (_dir, store) = open();
        let before = Utc::now();
        let inserted = store.insert(
            "m1".into(),
            MaterialInput {
                kind: "link".into(),
                title: "Lecture slides".into(),
                url: Some("https://example.com/slides".into()),
                ..Default::default()
            },
        );
        let fetched: Material = store.select_one("m1").unwrap();
        assert_eq!(fetched, inserted);
        assert!(fetched.created_at >= before);
        assert_eq!(fetched.kind, "link");
        assert_eq!(fetched.file_path, None);
        assert!(store.select_one::<Material>("nope").is_none());
        assert!(store.select::<Material>(&Select::by_id("nope")).is_empty());
    }

    #[test]
    fn deleting_course_cascades_to_dependents_only() {
        let (_dir, store) = open();
        course(&store, "c1", "Physics");
        course(&store, "c2", "History");
        store.insert(
            "m1".into(),
            MaterialInput {
                course_id: Some("c1".into()),
                kind: "file".into(),
                title: "syllabus".into(),
                ..Default::default()
            },
        );
        note(&store, "n1", Some("c1"), "kinematics");
        note(&store, "n2", Some("c2"), "rome");
        assignment(&store, "a1", Some("c1"), None);
        store.insert(
            "g1".into(),
            GeneralItemInput {
                kind: "task".into(),
                title: "groceries".into(),
                ..Default::default()
            },
        );

        let removed = store.delete::<Course>("c1").record.unwrap();
        assert_eq!(removed.name, "Physics");

        let doc = store.snapshot();
        assert_eq!(doc.courses.len(), 1);
        assert!(doc.materials.is_empty());
        assert_eq!(doc.notes.len(), 1);
        assert_eq!(doc.notes[0].id, "n2");
        assert!(doc.assignments.is_empty());
        assert_eq!(doc.general_items.len(), 1);
    }

    #[test]
    fn assignments_sort_by_due_date_with_missing_last() {
        let (_dir, store) = open();
        assignment(&store, "a1", None, Some("2024-03-01"));
        assignment(&store, "a2", None, None);
        assignment(&store, "a3", None, Some("2024-01-01"));

        let due: Vec<Option<String>> = store
            .select::<Assignment>(&Select::all().sorted())
            .into_iter()
            .map(|a| a.due_date)
            .collect();
        assert_eq!(
            due,
            vec![Some("2024-01-01".to_string()), Some("2024-03-01".to_string()), None]
        );
    }

    #[test]
    fn notes_sort_by_most_recently_updated() {
        let (_dir, store) = open();
        note(&store, "n1", None, "first");
        note(&store, "n2", None, "second");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .update(
                "n1",
                NoteChanges {
                    title: "first, edited".into(),
                    content: "new".into(),
                    tags: None,
                },
            )
            .unwrap();
        let ids: Vec<String> = store
            .select::<Note>(&Select::all().sorted())
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[test]
    fn update_note_keeps_created_at_and_bumps_updated_at() {
        let (_dir, store) = open();
        let original = note(&store, "n1", None, "draft");
        let updated = store
            .update(
                "n1",
                NoteChanges {
                    title: "final".into(),
                    content: "rewritten".into(),
                    tags: Some("exam".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
        assert_eq!(updated.content, "rewritten");
        assert_eq!(store.select_one::<Note>("n1").unwrap(), updated);
    }

    #[test]
    fn update_unknown_id_returns_none() {
        let (_dir, store) = open();
        let res = store.update("ghost", AssignmentChanges::default());
        assert!(res.is_none());
    }

    #[test]
    fn search_matches_regardless_of_case() {
        let (_dir, store) = open();
        note(&store, "n1", None, "Midterm Review");
        note(&store, "n2", None, "Lab report");
        for term in ["midterm", "REVIEW"] {
            let hits = store.select::<Note>(&Select::all().matching(term));
            assert_eq!(hits.len(), 1, "term {term}");
            assert_eq!(hits[0].id, "n1");
        }
    }

    #[test]
    fn course_scoped_search() {
        let (_dir, store) = open();
        note(&store, "n1", Some("c1"), "Exam prep");
        note(&store, "n2", Some("c2"), "Exam prep");
        let hits = store.select::<Note>(&Select::by_course("c2").matching("exam"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "n2");
    }

    #[test]
    fn records_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let inserted = {
            let store = Store::initialize(&path).unwrap();
            course(&store, "c1", "Chemistry")
        };
        let reopened = Store::initialize(&path).unwrap();
        assert_eq!(reopened.select_one::<Course>("c1"), Some(inserted));
    }

    #[test]
    fn load_picks_up_external_edits() {
        let (dir, store) = open();
        fs::write(
            dir.path().join("database.json"),
            r#"{"courses":[{"id":"c9","name":"Edited","code":null,"created_at":"2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert!(store.load());
        let c: Course = store.select_one("c9").unwrap();
        assert_eq!(c.color, DEFAULT_COURSE_COLOR);
        assert!(store.snapshot().general_items.is_empty());
    }

    #[test]
    fn missing_and_null_collections_default_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        fs::write(&path, r#"{"courses": null, "notes": []}"#).unwrap();
        let store = Store::initialize(&path).unwrap();
        assert_eq!(store.snapshot(), Document::default());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("general_items"));
    }

    #[test]
    fn corrupt_file_resets_and_is_kept_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        fs::write(&path, "{ not json").unwrap();
        let store = Store::initialize(&path).unwrap();
        assert_eq!(store.snapshot(), Document::default());
        let kept = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(kept);
    }

    #[test]
    fn deleting_twice_is_harmless() {
        let (_dir, store) = open();
        note(&store, "n1", None, "keep");
        note(&store, "n2", None, "drop");
        assert!(store.delete::<Note>("n2").record.is_some());
        let after_first = store.snapshot();
        assert!(store.delete::<Note>("n2").record.is_none());
        assert_eq!(store.snapshot(), after_first);
        assert_eq!(after_first.notes.len(), 1);
    }

    #[test]
    fn delete_material_exposes_file_path() {
        let (_dir, store) = open();
        store.insert(
            "m1".into(),
            MaterialInput {
                kind: "file".into(),
                title: "scan".into(),
                file_path: Some("/uploads/123-456.pdf".into()),
                ..Default::default()
            },
        );
        let deleted = store.delete::<Material>("m1");
        assert_eq!(deleted.file_paths(), vec!["/uploads/123-456.pdf"]);
        assert_eq!(deleted.record.unwrap().file_path.as_deref(), Some("/uploads/123-456.pdf"));
    }

    #[test]
    fn course_delete_returns_cascaded_materials() {
        let (_dir, store) = open();
        course(&store, "c1", "Chemistry");
        for (id, file) in [("m1", Some("/uploads/1-a.pdf")), ("m2", None)] {
            store.insert(
                id.into(),
                MaterialInput {
                    course_id: Some("c1".into()),
                    kind: "file".into(),
                    title: id.into(),
                    file_path: file.map(String::from),
                    ..Default::default()
                },
            );
        }
        let deleted = store.delete::<Course>("c1");
        assert_eq!(deleted.materials.len(), 2);
        assert_eq!(deleted.file_paths(), vec!["/uploads/1-a.pdf"]);
        assert!(store.snapshot().materials.is_empty());
    }

    #[test]
    fn insert_in_course_requires_the_course() {
        let (_dir, store) = open();
        course(&store, "c1", "Art");
        let input = |course_id: &str| NoteInput {
            course_id: Some(course_id.into()),
            title: "sketch".into(),
            ..Default::default()
        };
        assert!(matches!(
            store.insert_in_course("n1".into(), input("c2")),
            Err(AppError::Validation(_))
        ));
        assert!(store.snapshot().notes.is_empty());

        let note = store.insert_in_course("n2".into(), input("c1")).unwrap();
        assert_eq!(note.course_id.as_deref(), Some("c1"));
        let loose = store
            .insert_in_course("n3".into(), NoteInput { title: "free".into(), ..Default::default() })
            .unwrap();
        assert!(loose.course_id.is_none());
    }

    #[test]
    fn loose_records_load_and_unreadable_ones_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        fs::write(
            &path,
            r#"{
                "courses": [{"id": "c1", "name": "Biology", "color": null}],
                "notes": [
                    {"id": "n1", "course_id": "c1", "content": "no title"},
                    {"id": "n2", "title": "empty", "content": null},
                    {"title": "no id"}
                ],
                "assignments": [{"id": "a1", "title": "lab", "status": null}]
            }"#,
        )
        .unwrap();
        let store = Store::initialize(&path).unwrap();
        let doc = store.snapshot();
        assert_eq!(doc.courses.len(), 1);
        assert_eq!(doc.courses[0].name, "Biology");
        assert_eq!(doc.courses[0].color, DEFAULT_COURSE_COLOR);
        let ids: Vec<_> = doc.notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["n1", "n2"]);
        assert_eq!(doc.notes[0].title, "");
        assert_eq!(doc.notes[1].content, "");
        assert_eq!(doc.assignments[0].status, DEFAULT_ASSIGNMENT_STATUS);
        let kept_aside = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(!kept_aside);
    }

    #[test]
    fn failed_save_is_logged_and_memory_keeps_the_change() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        let store = Store::initialize(nested.join("database.json")).unwrap();
        fs::remove_dir_all(&nested).unwrap();

        let c = course(&store, "c1", "Music");
        assert_eq!(store.select_one::<Course>("c1"), Some(c));
        note(&store, "n1", None, "scales");
        assert!(store.delete::<Note>("n1").record.is_some());
        assert!(store.select_one::<Note>("n1").is_none());
        assert!(!nested.exists());
    }

    #[test]
    fn unreadable_file_is_kept_aside_before_saving() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        // a directory reads as an error other than NotFound
        fs::create_dir(&path).unwrap();
        let store = Store::initialize(&path).unwrap();
        assert_eq!(store.snapshot(), Document::default());
        assert!(path.is_file());
        let kept = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-") && e.path().is_dir());
        assert!(kept);
    }
}
