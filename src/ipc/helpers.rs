use std::collections::HashSet;

use serde::Serialize;
use serde_json::json;

use crate::catalog::Subject;
use crate::db::{SchemaCaps, SqliteStore};
use crate::engine::{self, CompleteView, DueStatus, MarkRecord, MarkRow};
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::store::{Store, StoreError, Student};

pub const MIN_YEAR: i64 = 2;
pub const MAX_YEAR: i64 = 4;
pub const MIN_SEMESTER: i64 = 1;
pub const MAX_SEMESTER: i64 = 8;
pub const MAX_SCORE: i64 = 100;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        tracing::warn!(error = %e, "store call failed");
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn store(state: &AppState) -> Result<SqliteStore<'_>, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    Ok(SqliteStore::new(conn, state.caps))
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must not be empty"))),
        None => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .and_then(|s| if s.is_empty() { None } else { Some(s) })
}

/// Absent and null both read as `None`; anything else must be an integer.
pub fn optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{key} must be an integer"))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    optional_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn optional_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{key} must be a boolean"))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    optional_bool(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn validate_year(year: i64) -> Result<i64, HandlerErr> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(
            HandlerErr::bad_params(format!("year must be between {MIN_YEAR} and {MAX_YEAR}"))
                .with_details(json!({ "year": year })),
        );
    }
    Ok(year)
}

pub fn validate_semester(semester: i64) -> Result<i64, HandlerErr> {
    if !(MIN_SEMESTER..=MAX_SEMESTER).contains(&semester) {
        return Err(HandlerErr::bad_params(format!(
            "semester must be between {MIN_SEMESTER} and {MAX_SEMESTER}"
        ))
        .with_details(json!({ "semester": semester })));
    }
    Ok(semester)
}

pub fn validate_score(key: &str, value: Option<i64>) -> Result<Option<i64>, HandlerErr> {
    match value {
        Some(v) if !(0..=MAX_SCORE).contains(&v) => Err(HandlerErr::bad_params(format!(
            "{key} must be between 0 and {MAX_SCORE}"
        ))
        .with_details(json!({ key: v }))),
        _ => Ok(value),
    }
}

fn require_known_subject<'a>(subjects: &'a [Subject], name: &str) -> Result<&'a Subject, HandlerErr> {
    subjects.iter().find(|s| s.name == name).ok_or_else(|| {
        HandlerErr::bad_params("subject is not in the catalog for this student")
            .with_details(json!({ "subject": name }))
    })
}

pub fn administrative_field_err(subject: &str, field: &str) -> HandlerErr {
    HandlerErr::bad_params(format!("{field} does not apply to administrative subjects"))
        .with_details(json!({ "subject": subject, "field": field }))
}

/// Defaults are tolerated so full rows can be sent back unchanged.
fn check_administrative_row(row: &MarkRow) -> Result<(), HandlerErr> {
    let carried = [
        ("iat1", row.iat1.is_some()),
        ("iat2", row.iat2.is_some()),
        ("model", row.model.is_some()),
        ("assignmentSubmitted", row.assignment_submitted == Some(true)),
        ("departmentFine", row.department_fine.is_some_and(|f| f != 0)),
    ];
    match carried.iter().find(|(_, set)| *set) {
        Some((field, _)) => Err(administrative_field_err(&row.subject, field)),
        None => Ok(()),
    }
}

/// Parses a client-supplied list of full mark rows. Omitted flags stay `None`
/// and are defaulted by reconciliation.
pub fn parse_mark_rows(
    value: Option<&serde_json::Value>,
    subjects: &[Subject],
) -> Result<Vec<MarkRow>, HandlerErr> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing marks"));
    };
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let subject = required_str(item, "subject")?;
        let known = require_known_subject(subjects, &subject)?;
        if !seen.insert(subject.clone()) {
            return Err(HandlerErr::bad_params("subject listed twice")
                .with_details(json!({ "subject": subject })));
        }
        let department_fine = optional_i64(item, "departmentFine")?;
        if let Some(fine) = department_fine.filter(|f| *f < 0) {
            return Err(HandlerErr::bad_params("departmentFine must be >= 0")
                .with_details(json!({ "subject": subject, "departmentFine": fine })));
        }
        let row = MarkRow {
            iat1: validate_score("iat1", optional_i64(item, "iat1")?)?,
            iat2: validate_score("iat2", optional_i64(item, "iat2")?)?,
            model: validate_score("model", optional_i64(item, "model")?)?,
            signed: optional_bool(item, "signed")?,
            assignment_submitted: optional_bool(item, "assignmentSubmitted")?,
            department_fine,
            subject,
        };
        if known.is_administrative() {
            check_administrative_row(&row)?;
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn student_by_id(store: &dyn Store, id: &str) -> Result<Student, HandlerErr> {
    store.find_student_by_id(id)?.ok_or_else(|| {
        HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": id }))
    })
}

pub fn student_by_register_number(store: &dyn Store, reg: &str) -> Result<Student, HandlerErr> {
    store.find_student_by_register_number(reg)?.ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "registerNumber": reg }))
    })
}

/// A student's expected subjects with their reconciled records.
pub struct StudentMarks {
    pub student: Student,
    pub subjects: Vec<Subject>,
    pub view: CompleteView,
}

pub fn load_student_marks(
    state: &AppState,
    store: &dyn Store,
    student: Student,
) -> Result<StudentMarks, HandlerErr> {
    let subjects = state.catalog.subjects_for(student.year, student.semester);
    let rows = store.find_marks_by_student_id(&student.id)?;
    let view = engine::reconcile(&subjects, &rows);
    Ok(StudentMarks {
        student,
        subjects,
        view,
    })
}

/// Upserts records one by one. Rows written before a failure stay written.
pub fn save_records(
    store: &dyn Store,
    student_id: &str,
    records: &[&MarkRecord],
) -> Result<usize, HandlerErr> {
    let mut saved = 0usize;
    for record in records {
        if let Err(e) = store.upsert_mark(student_id, record) {
            let mut he = HandlerErr::from(e);
            let mut details = he.details.take().unwrap_or_else(|| json!({}));
            details["saved"] = json!(saved);
            details["subject"] = json!(record.subject);
            return Err(he.with_details(details));
        }
        saved += 1;
    }
    tracing::debug!(student_id, saved, "saved mark rows");
    Ok(saved)
}

/// Clearance values a schema without the clearance columns dropped on write.
pub fn ignored_fields(caps: SchemaCaps, records: &[&MarkRecord]) -> Vec<&'static str> {
    if caps.marks_has_clearance_fields {
        return Vec::new();
    }
    let mut fields = Vec::new();
    if records.iter().any(|r| r.assignment_submitted) {
        fields.push("assignmentSubmitted");
    }
    if records.iter().any(|r| r.department_fine != 0) {
        fields.push("departmentFine");
    }
    if !fields.is_empty() {
        tracing::warn!(?fields, "clearance fields not stored by this schema");
    }
    fields
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectLine<'a> {
    #[serde(flatten)]
    record: &'a MarkRecord,
    fees_paid: bool,
    due_status: DueStatus,
}

pub fn view_json(subjects: &[Subject], view: &CompleteView) -> serde_json::Value {
    let lines: Vec<SubjectLine> = engine::subject_statuses(subjects, view)
        .map(|(record, due_status)| SubjectLine {
            record,
            fees_paid: record.fees_paid(),
            due_status,
        })
        .collect();
    json!({
        "subjects": lines,
        "subjectCount": subjects.len(),
        "overallStatus": engine::overall_status(subjects, view),
    })
}

pub fn student_marks_json(marks: &StudentMarks) -> serde_json::Value {
    let mut v = view_json(&marks.subjects, &marks.view);
    v["student"] = json!(marks.student);
    v
}
