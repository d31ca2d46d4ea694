use crate::ipc::helpers::{
    load_student_marks, optional_i64, optional_str, required_i64, required_str, respond, store,
    student_by_id, student_by_register_number, student_marks_json, validate_semester,
    validate_year, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{NewStudent, Store, StudentFilter, StudentPatch};
use serde_json::json;

fn students_register(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let new = NewStudent {
        name: required_str(&req.params, "name")?,
        register_number: required_str(&req.params, "registerNumber")?,
        department: optional_str(&req.params, "department"),
        year: validate_year(required_i64(&req.params, "year")?)?,
        semester: optional_i64(&req.params, "semester")?
            .map(validate_semester)
            .transpose()?,
    };
    let student = store.insert_student(&new)?;
    tracing::info!(register_number = %student.register_number, "student registered");
    Ok(json!({ "student": student }))
}

fn students_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let filter = StudentFilter {
        year: optional_i64(&req.params, "year")?,
        semester: optional_i64(&req.params, "semester")?,
    };
    let students = store.list_students(&filter)?;
    Ok(json!({ "students": students }))
}

fn students_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let reg = required_str(&req.params, "registerNumber")?;
    let student = student_by_register_number(&store, &reg)?;
    let marks = load_student_marks(state, &store, student)?;
    Ok(student_marks_json(&marks))
}

fn parse_patch(patch: &serde_json::Value) -> Result<StudentPatch, HandlerErr> {
    let Some(obj) = patch.as_object() else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    let mut out = StudentPatch::default();
    if obj.contains_key("name") {
        out.name = Some(required_str(patch, "name")?);
    }
    if let Some(v) = obj.get("department") {
        if !v.is_null() && !v.is_string() {
            return Err(HandlerErr::bad_params("department must be a string or null"));
        }
        out.department = Some(optional_str(patch, "department"));
    }
    if obj.contains_key("year") {
        out.year = Some(validate_year(required_i64(patch, "year")?)?);
    }
    if obj.contains_key("semester") {
        out.semester = Some(
            optional_i64(patch, "semester")?
                .map(validate_semester)
                .transpose()?,
        );
    }
    if out.is_empty() {
        return Err(HandlerErr::bad_params("patch must change at least one field"));
    }
    Ok(out)
}

fn students_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let patch = parse_patch(req.params.get("patch").unwrap_or(&serde_json::Value::Null))?;
    store.update_student(&student_id, &patch)?;
    let student = student_by_id(&store, &student_id)?;
    Ok(json!({ "student": student }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.register" => students_register(state, req),
        "students.list" => students_list(state, req),
        "students.get" => students_get(state, req),
        "students.update" => students_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
