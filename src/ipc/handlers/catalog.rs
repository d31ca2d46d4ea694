use crate::ipc::helpers::{
    optional_i64, required_i64, respond, validate_semester, validate_year, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn catalog_subjects(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let year = validate_year(required_i64(&req.params, "year")?)?;
    let semester = optional_i64(&req.params, "semester")?
        .map(validate_semester)
        .transpose()?;
    let subjects = state.catalog.subjects_for(year, semester);
    Ok(json!({
        "year": year,
        "semester": semester,
        "subjectCount": subjects.len(),
        "subjects": subjects,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.subjects" => Some(respond(&req.id, catalog_subjects(state, req))),
        _ => None,
    }
}
