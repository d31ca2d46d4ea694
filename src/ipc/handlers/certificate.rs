use crate::ipc::helpers::{
    load_student_marks, required_str, respond, store, student_by_register_number, view_json,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

pub const CERTIFICATE_TITLE: &str = "NO DUE CERTIFICATE";

pub fn certificate_file_name(register_number: &str) -> String {
    let safe: String = register_number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("no-due-certificate-{safe}.pdf")
}

/// Everything the print/PDF layer needs, in certificate row order.
fn certificate_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let reg = required_str(&req.params, "registerNumber")?;
    let student = student_by_register_number(&store, &reg)?;
    let marks = load_student_marks(state, &store, student)?;

    let mut certificate = view_json(&marks.subjects, &marks.view);
    certificate["institution"] = json!(state.config.institution);
    certificate["title"] = json!(CERTIFICATE_TITLE);
    certificate["issuedOn"] = json!(chrono::Utc::now().format("%Y-%m-%d").to_string());
    certificate["fileName"] = json!(certificate_file_name(&marks.student.register_number));
    certificate["student"] = json!(marks.student);
    Ok(json!({ "certificate": certificate }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "certificate.get" => Some(respond(&req.id, certificate_get(state, req))),
        _ => None,
    }
}
