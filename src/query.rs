// Typed store commands: selects, inserts and updates per collection.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::{cmp::Ordering, fmt, mem};

use crate::models::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Courses,
    Materials,
    Notes,
    Assignments,
    GeneralItems,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Courses => "courses",
            Collection::Materials => "materials",
            Collection::Notes => "notes",
            Collection::Assignments => "assignments",
            Collection::GeneralItems => "general_items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    All,
    Id(String),
    Course(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    pub filter: Filter,
    /// Case-insensitive substring matched against the record's text fields.
    pub search: Option<String>,
    pub sorted: bool,
}

impl Select {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            filter: Filter::Id(id.into()),
            ..Self::default()
        }
    }

    pub fn by_course(course_id: impl Into<String>) -> Self {
        Self {
            filter: Filter::Course(course_id.into()),
            ..Self::default()
        }
    }

    /// Scoped to a course when one is given, otherwise everything.
    pub fn scoped(course_id: Option<String>) -> Self {
        course_id.map(Self::by_course).unwrap_or_default()
    }

    pub fn matching(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    pub fn accepts<R: Record>(&self, record: &R) -> bool {
        let in_scope = match &self.filter {
            Filter::All => true,
            Filter::Id(id) => record.id() == id,
            Filter::Course(course_id) => record.course_id() == Some(course_id.as_str()),
        };
        in_scope
            && self
                .search
                .as_deref()
                .map_or(true, |term| contains_term(record.search_fields(), term))
    }
}

fn contains_term(fields: [Option<&str>; 2], term: &str) -> bool {
    let term = term.to_lowercase();
    fields
        .into_iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(&term))
}

/// A record type stored in one collection of the [`Document`].
pub trait Record: Clone + Send + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn course_id(&self) -> Option<&str> {
        None
    }

    fn search_fields(&self) -> [Option<&str>; 2];

    /// Order used when a select asks for sorted output.
    fn listing_order(a: &Self, b: &Self) -> Ordering;

    fn rows(doc: &Document) -> &Vec<Self>;

    fn rows_mut(doc: &mut Document) -> &mut Vec<Self>;

    /// Upload referenced by the record, if any.
    fn file_path(&self) -> Option<&str> {
        None
    }

    /// Drops records owned by the record `id` that was just deleted and
    /// returns the materials among them.
    fn cascade(_doc: &mut Document, _id: &str) -> Vec<Material> {
        Vec::new()
    }
}

pub trait Insert {
    type Record: Record;

    /// Course the new record must belong to.
    fn course_id(&self) -> Option<&str> {
        None
    }

    fn into_record(self, id: String, now: DateTime<Utc>) -> Self::Record;
}

pub trait Update {
    type Record: Record;

    fn apply(self, record: &mut Self::Record, now: DateTime<Utc>);
}

impl Record for Course {
    const COLLECTION: Collection = Collection::Courses;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self) -> [Option<&str>; 2] {
        [Some(&self.name), self.code.as_deref()]
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }

    fn rows(doc: &Document) -> &Vec<Self> {
        &doc.courses
    }

    fn rows_mut(doc: &mut Document) -> &mut Vec<Self> {
        &mut doc.courses
    }

    fn cascade(doc: &mut Document, id: &str) -> Vec<Material> {
        let owned = |course_id: &Option<String>| course_id.as_deref() == Some(id);
        let (removed, kept): (Vec<Material>, Vec<Material>) = mem::take(&mut doc.materials)
            .into_iter()
            .partition(|m| owned(&m.course_id));
        doc.materials = kept;
        doc.notes.retain(|n| !owned(&n.course_id));
        doc.assignments.retain(|a| !owned(&a.course_id));
        removed
    }
}

impl Record for Material {
    const COLLECTION: Collection = Collection::Materials;

    fn id(&self) -> &str {
        &self.id
    }

    fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    fn search_fields(&self) -> [Option<&str>; 2] {
        [Some(&self.title), self.content.as_deref()]
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }

    fn rows(doc: &Document) -> &Vec<Self> {
        &doc.materials
    }

    fn rows_mut(doc: &mut Document) -> &mut Vec<Self> {
        &mut doc.materials
    }

    fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

impl Record for Note {
    const COLLECTION: Collection = Collection::Notes;

    fn id(&self) -> &str {
        &self.id
    }

    fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    fn search_fields(&self) -> [Option<&str>; 2] {
        [Some(&self.title), Some(&self.content)]
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.updated_at.cmp(&a.updated_at)
    }

    fn rows(doc: &Document) -> &Vec<Self> {
        &doc.notes
    }

    fn rows_mut(doc: &mut Document) -> &mut Vec<Self> {
        &mut doc.notes
    }
}

impl Record for Assignment {
    const COLLECTION: Collection = Collection::Assignments;

    fn id(&self) -> &str {
        &self.id
    }

    fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    fn search_fields(&self) -> [Option<&str>; 2] {
        [Some(&self.title), self.description.as_deref()]
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        due_date_order(a.due_date.as_deref(), b.due_date.as_deref())
    }

    fn rows(doc: &Document) -> &Vec<Self> {
        &doc.assignments
    }

    fn rows_mut(doc: &mut Document) -> &mut Vec<Self> {
        &mut doc.assignments
    }
}

impl Record for GeneralItem {
    const COLLECTION: Collection = Collection::GeneralItems;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self) -> [Option<&str>; 2] {
        [Some(&self.title), self.content.as_deref()]
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }

    fn rows(doc: &Document) -> &Vec<Self> {
        &doc.general_items
    }

    fn rows_mut(doc: &mut Document) -> &mut Vec<Self> {
        &mut doc.general_items
    }
}

/// Accepts RFC 3339, `datetime-local` style values and plain dates.
pub fn parse_due_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Ascending by date; unparseable dates after parseable ones, missing dates last.
pub fn due_date_order(a: Option<&str>, b: Option<&str>) -> Ordering {
    fn key(raw: Option<&str>) -> (u8, Option<NaiveDateTime>, &str) {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => (2, None, ""),
            Some(s) => match parse_due_date(s) {
                Some(dt) => (0, Some(dt), s),
                None => (1, None, s),
            },
        }
    }
    key(a).cmp(&key(b))
}

impl Insert for CourseInput {
    type Record = Course;

    fn into_record(self, id: String, now: DateTime<Utc>) -> Course {
        Course {
            id,
            name: self.name,
            code: self.code,
            color: self.color.unwrap_or_else(|| DEFAULT_COURSE_COLOR.into()),
            created_at: now,
        }
    }
}

impl Insert for MaterialInput {
    type Record = Material;

    fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    fn into_record(self, id: String, now: DateTime<Utc>) -> Material {
        Material {
            id,
            course_id: self.course_id,
            kind: self.kind,
            title: self.title,
            content: self.content,
            file_path: self.file_path,
            url: self.url,
            tags: self.tags,
            created_at: now,
        }
    }
}

impl Insert for NoteInput {
    type Record = Note;

    fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    fn into_record(self, id: String, now: DateTime<Utc>) -> Note {
        Note {
            id,
            course_id: self.course_id,
            title: self.title,
            content: self.content,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Insert for AssignmentInput {
    type Record = Assignment;

    fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    fn into_record(self, id: String, now: DateTime<Utc>) -> Assignment {
        Assignment {
            id,
            course_id: self.course_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            status: self
                .status
                .unwrap_or_else(|| DEFAULT_ASSIGNMENT_STATUS.into()),
            attachments: self.attachments,
            created_at: now,
        }
    }
}

impl Insert for GeneralItemInput {
    type Record = GeneralItem;

    fn into_record(self, id: String, now: DateTime<Utc>) -> GeneralItem {
        GeneralItem {
            id,
            kind: self.kind,
            title: self.title,
            content: self.content,
            due_date: self.due_date,
            url: self.url,
            status: DEFAULT_ITEM_STATUS.into(),
            created_at: now,
        }
    }
}

impl Update for NoteChanges {
    type Record = Note;

    fn apply(self, note: &mut Note, now: DateTime<Utc>) {
        note.title = self.title;
        note.content = self.content;
        note.tags = self.tags;
        // never move backwards, even if the clock does
        note.updated_at = now.max(note.updated_at);
    }
}

impl Update for AssignmentChanges {
    type Record = Assignment;

    fn apply(self, assignment: &mut Assignment, _now: DateTime<Utc>) {
        assignment.title = self.title;
        assignment.description = self.description;
        assignment.due_date = self.due_date;
        assignment.status = self
            .status
            .unwrap_or_else(|| DEFAULT_ASSIGNMENT_STATUS.into());
        assignment.attachments = self.attachments;
    }
}
