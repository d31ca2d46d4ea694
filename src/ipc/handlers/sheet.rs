use crate::engine::{self, MarkRecord, ScoreField};
use crate::ipc::helpers::{
    ignored_fields, load_student_marks, optional_i64, parse_mark_rows, required_i64,
    required_str, respond, save_records, store, student_by_id, student_marks_json,
    validate_semester, validate_year, HandlerErr, StudentMarks,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{Store, StudentFilter};
use serde_json::json;
use std::collections::BTreeSet;

const SHEET_SAVE_MAX_STUDENTS: usize = 1000;

fn sheet_row(marks: &StudentMarks) -> serde_json::Value {
    let mut row = student_marks_json(marks);
    let mut averages = serde_json::Map::new();
    for field in ScoreField::ALL {
        averages.insert(
            field.key().to_string(),
            json!(engine::score_average(&marks.view, field)),
        );
    }
    row["averages"] = serde_json::Value::Object(averages);
    row["assignmentsComplete"] = json!(engine::assignments_complete(&marks.view));
    row["feesPaid"] = json!(engine::fees_paid(&marks.view));
    row
}

/// Every student of one semester with their reconciled records and roll-ups.
fn sheet_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let semester = validate_semester(required_i64(&req.params, "semester")?)?;
    let year = optional_i64(&req.params, "year")?
        .map(validate_year)
        .transpose()?;

    let students = store.list_students(&StudentFilter {
        year,
        semester: Some(semester),
    })?;
    let header = match (year, students.first()) {
        (Some(y), _) => state.catalog.subjects_for(y, Some(semester)),
        (None, Some(first)) => state.catalog.subjects_for(first.year, Some(semester)),
        (None, None) => Vec::new(),
    };

    let mut rows = Vec::with_capacity(students.len());
    let mut completed = 0usize;
    for student in students {
        let marks = load_student_marks(state, &store, student)?;
        if engine::overall_status(&marks.subjects, &marks.view).is_completed() {
            completed += 1;
        }
        rows.push(sheet_row(&marks));
    }

    tracing::debug!(semester, students = rows.len(), "sheet loaded");
    Ok(json!({
        "semester": semester,
        "year": year,
        "subjects": header,
        "students": rows,
        "completedCount": completed,
        "pendingCount": rows.len() - completed,
    }))
}

struct SavedStudent {
    rows: usize,
    ignored: Vec<&'static str>,
}

fn save_one(
    state: &AppState,
    store: &dyn Store,
    item: &serde_json::Value,
) -> Result<SavedStudent, HandlerErr> {
    let student_id = required_str(item, "studentId")?;
    let student = student_by_id(store, &student_id)?;
    let subjects = state.catalog.subjects_for(student.year, student.semester);
    let rows = parse_mark_rows(item.get("marks"), &subjects)?;
    let view = engine::reconcile(&subjects, &rows);
    let records: Vec<&MarkRecord> = rows
        .iter()
        .filter_map(|r| view.record(&r.subject))
        .collect();
    let written = save_records(store, &student.id, &records)?;
    Ok(SavedStudent {
        rows: written,
        ignored: ignored_fields(state.caps, &records),
    })
}

/// Saves each student independently; one student's failure does not stop the rest.
fn sheet_save(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let Some(items) = req.params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing students"));
    };
    if items.len() > SHEET_SAVE_MAX_STUDENTS {
        return Err(HandlerErr::bad_params("too many students")
            .with_details(json!({ "max": SHEET_SAVE_MAX_STUDENTS, "got": items.len() })));
    }

    let mut saved = 0usize;
    let mut rows_written = 0usize;
    let mut ignored = BTreeSet::new();
    let mut failed = Vec::new();
    for item in items {
        match save_one(state, &store, item) {
            Ok(done) => {
                saved += 1;
                rows_written += done.rows;
                ignored.extend(done.ignored);
            }
            Err(e) => failed.push(json!({
                "studentId": item.get("studentId"),
                "code": e.code,
                "message": e.message,
                "details": e.details,
            })),
        }
    }

    if !failed.is_empty() {
        tracing::warn!(saved, failed = failed.len(), "sheet saved with failures");
    }
    Ok(json!({
        "saved": saved,
        "rowsWritten": rows_written,
        "ignoredFields": ignored,
        "failed": failed,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sheet.get" => sheet_get(state, req),
        "sheet.save" => sheet_save(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
