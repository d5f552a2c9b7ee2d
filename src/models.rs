use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString};

pub const DEFAULT_COURSE_COLOR: &str = "#6366f1";
pub const DEFAULT_ASSIGNMENT_STATUS: &str = "pending";
pub const DEFAULT_ITEM_STATUS: &str = "active";

pub const ASSIGNMENT_STATUSES: &[&str] = &["pending", "in_progress", "completed"];

// Stored records are read leniently: a missing or null text field or
// timestamp loads as its default instead of failing the whole document.

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Course {
    pub id: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub name: String,
    pub code: Option<String>,
    #[serde(default = "default_color", deserialize_with = "color_or_default")]
    pub color: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Material {
    pub id: String,
    pub course_id: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    pub content: Option<String>,
    pub file_path: Option<String>, // "/uploads/<stored name>"
    pub url: Option<String>,
    pub tags: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub course_id: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub content: String,
    pub tags: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: String,
    pub course_id: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    #[serde(
        default = "default_assignment_status",
        deserialize_with = "assignment_status_or_default"
    )]
    pub status: String,
    pub attachments: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneralItem {
    pub id: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    pub content: Option<String>,
    pub due_date: Option<String>,
    pub url: Option<String>,
    #[serde(default = "default_item_status", deserialize_with = "item_status_or_default")]
    pub status: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// The whole persisted state. Missing or null collections load as empty.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Document {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub general_items: Vec<GeneralItem>,
}

// --- request payloads ---
// Empty strings in optional slots are treated as absent.

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CourseInput {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub name: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub code: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub color: Option<String>,
}

/// Built by the HTTP layer from a multipart form; `file_path` is filled in
/// after the upload has been stored.
#[derive(Debug, Clone, Default)]
pub struct MaterialInput {
    pub course_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub url: Option<String>,
    pub tags: Option<String>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NoteInput {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub content: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub tags: Option<String>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NoteChanges {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub content: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub tags: Option<String>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AssignmentInput {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub status: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub attachments: Option<String>,
}

/// Replaces every editable field of an assignment; the course link is fixed.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AssignmentChanges {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub status: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub attachments: Option<String>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GeneralItemInput {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub content: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub courses: Vec<Course>,
    pub materials: Vec<Material>,
    pub notes: Vec<Note>,
    pub assignments: Vec<Assignment>,
}

fn default_color() -> String {
    DEFAULT_COURSE_COLOR.into()
}

fn default_assignment_status() -> String {
    DEFAULT_ASSIGNMENT_STATUS.into()
}

fn default_item_status() -> String {
    DEFAULT_ITEM_STATUS.into()
}

fn color_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_color))
}

fn assignment_status_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_assignment_status))
}

fn item_status_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_item_status))
}
