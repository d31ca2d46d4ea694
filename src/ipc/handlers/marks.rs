use crate::engine::{self, FieldChange, MarkEdit, MarkPatch, MarkRecord, ScoreField};
use crate::ipc::helpers::{
    administrative_field_err, ignored_fields, load_student_marks, parse_mark_rows,
    required_bool, required_str, respond, save_records, store, student_by_id,
    student_marks_json, validate_score, HandlerErr, StudentMarks,
};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;

const MARKS_EDIT_MAX_EDITS: usize = 500;

fn load_by_student_id(
    state: &AppState,
    store: &dyn Store,
    req: &Request,
) -> Result<StudentMarks, HandlerErr> {
    let student_id = required_str(&req.params, "studentId")?;
    let student = student_by_id(store, &student_id)?;
    load_student_marks(state, store, student)
}

fn with_count(
    key: &str,
    count: usize,
    ignored: Vec<&'static str>,
    marks: &StudentMarks,
) -> serde_json::Value {
    let mut v = student_marks_json(marks);
    v[key] = json!(count);
    v["ignoredFields"] = json!(ignored);
    v
}

/// Full rows from the client, written in the order given.
fn marks_save(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let current = load_by_student_id(state, &store, req)?;
    let rows = parse_mark_rows(req.params.get("marks"), &current.subjects)?;
    let incoming = engine::reconcile(&current.subjects, &rows);
    let records: Vec<&MarkRecord> = rows
        .iter()
        .filter_map(|r| incoming.record(&r.subject))
        .collect();
    let saved = save_records(&store, &current.student.id, &records)?;
    let ignored = ignored_fields(state.caps, &records);

    let fresh = load_student_marks(state, &store, current.student)?;
    Ok(with_count("saved", saved, ignored, &fresh))
}

fn parse_edit(item: &serde_json::Value) -> Result<MarkEdit, HandlerErr> {
    let subject = required_str(item, "subject")?;
    let field = required_str(item, "field")?;
    let change = match field.as_str() {
        "iat1" | "iat2" | "model" => {
            let score = match field.as_str() {
                "iat1" => ScoreField::Iat1,
                "iat2" => ScoreField::Iat2,
                _ => ScoreField::Model,
            };
            let value = match item.get("value") {
                None | Some(serde_json::Value::Null) => None,
                Some(v) => Some(v.as_i64().ok_or_else(|| {
                    HandlerErr::bad_params("score value must be an integer or null")
                        .with_details(json!({ "subject": subject, "value": v }))
                })?),
            };
            FieldChange::Score(score, validate_score(&field, value)?)
        }
        "signed" => FieldChange::Signed(required_bool(item, "value")?),
        "assignmentSubmitted" => FieldChange::AssignmentSubmitted(required_bool(item, "value")?),
        "departmentFees" => FieldChange::FeesPaid(required_bool(item, "value")?),
        other => {
            return Err(HandlerErr::bad_params(
                "field must be one of: iat1, iat2, model, signed, assignmentSubmitted, departmentFees",
            )
            .with_details(json!({ "field": other })))
        }
    };
    Ok(MarkEdit { subject, change })
}

/// Applies field edits to the reconciled view and writes only the subjects
/// whose record actually changed.
fn marks_edit(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let current = load_by_student_id(state, &store, req)?;
    let Some(items) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing edits"));
    };
    if items.len() > MARKS_EDIT_MAX_EDITS {
        return Err(HandlerErr::bad_params("too many edits")
            .with_details(json!({ "max": MARKS_EDIT_MAX_EDITS, "got": items.len() })));
    }

    let mut next = current.view.clone();
    for item in items {
        let edit = parse_edit(item)?;
        let Some(record) = current.view.record(&edit.subject) else {
            return Err(
                HandlerErr::bad_params("subject is not in the catalog for this student")
                    .with_details(json!({ "subject": edit.subject })),
            );
        };
        if !edit.change.applies_to(record.category) {
            return Err(administrative_field_err(&edit.subject, edit.change.key()));
        }
        next = next.with_edit(&edit);
    }
    write_changes(state, &store, current, next, "updated")
}

fn write_changes(
    state: &AppState,
    store: &dyn Store,
    current: StudentMarks,
    next: engine::CompleteView,
    count_key: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let changed = engine::changed_subjects(&current.view, &next);
    let updated = save_records(store, &current.student.id, &changed)?;
    let ignored = ignored_fields(state.caps, &changed);
    let fresh = load_student_marks(state, store, current.student)?;
    Ok(with_count(count_key, updated, ignored, &fresh))
}

fn apply_bulk(
    state: &AppState,
    req: &Request,
    flag: &str,
    make_patch: fn(&[crate::catalog::Subject], bool) -> MarkPatch,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let current = load_by_student_id(state, &store, req)?;
    let value = required_bool(&req.params, flag)?;
    let patch = make_patch(&current.subjects, value);
    let next = current.view.apply_patch(&patch);
    write_changes(state, &store, current, next, "updated")
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.save" => marks_save(state, req),
        "marks.edit" => marks_edit(state, req),
        "marks.bulkFees" => apply_bulk(state, req, "paid", engine::apply_bulk_fee_update),
        "marks.bulkAssignments" => apply_bulk(
            state,
            req,
            "submitted",
            engine::apply_bulk_assignment_update,
        ),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
