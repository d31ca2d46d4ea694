use crate::engine::{MarkRecord, MarkRow};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub register_number: String,
    pub department: Option<String>,
    pub year: i64,
    pub semester: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub register_number: String,
    pub department: Option<String>,
    pub year: i64,
    pub semester: Option<i64>,
}

/// `None` leaves a field alone; `Some(None)` clears an optional one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub department: Option<Option<String>>,
    pub year: Option<i64>,
    pub semester: Option<Option<i64>>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.department.is_none()
            && self.year.is_none()
            && self.semester.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub year: Option<i64>,
    pub semester: Option<i64>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("register number {0} is already registered")]
    DuplicateRegisterNumber(String),

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("write to {table} failed: {source}")]
    Write {
        table: &'static str,
        op: WriteOp,
        #[source]
        source: rusqlite::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
}

impl StoreError {
    pub fn write(table: &'static str, op: WriteOp) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Write { table, op, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StoreError::StudentNotFound(_) => "not_found",
            StoreError::DuplicateRegisterNumber(_) => "conflict",
            StoreError::Query(_) => "db_query_failed",
            StoreError::Write {
                op: WriteOp::Insert,
                ..
            } => "db_insert_failed",
            StoreError::Write {
                op: WriteOp::Update,
                ..
            } => "db_update_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            StoreError::Write { table, .. } => Some(json!({ "table": table })),
            StoreError::DuplicateRegisterNumber(reg) => Some(json!({ "registerNumber": reg })),
            _ => None,
        }
    }
}

/// Record-oriented boundary to wherever students and marks live. There is no
/// transaction spanning calls: a multi-row save is a sequence of upserts.
pub trait Store {
    fn find_student_by_register_number(&self, register_number: &str)
        -> Result<Option<Student>, StoreError>;

    fn find_student_by_id(&self, id: &str) -> Result<Option<Student>, StoreError>;

    /// Ordered by register number.
    fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError>;

    fn find_marks_by_student_id(&self, student_id: &str) -> Result<Vec<MarkRow>, StoreError>;

    /// Keyed by (student_id, subject); creates the row on first write.
    fn upsert_mark(&self, student_id: &str, record: &MarkRecord) -> Result<(), StoreError>;

    fn insert_student(&self, student: &NewStudent) -> Result<Student, StoreError>;

    fn update_student(&self, id: &str, patch: &StudentPatch) -> Result<(), StoreError>;
}
