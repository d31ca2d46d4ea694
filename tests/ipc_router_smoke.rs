mod common;

use common::{spawn_sidecar, spawn_sidecar_with};
use serde_json::json;

#[test]
fn health_and_unknown_method() {
    let mut sc = spawn_sidecar();
    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert!(health["workspacePath"].is_null());

    assert_eq!(sc.request_err("classes.list", json!({})), "not_implemented");
}

#[test]
fn data_methods_require_a_workspace() {
    let mut sc = spawn_sidecar();
    for method in [
        "schema.status",
        "students.list",
        "students.get",
        "marks.save",
        "sheet.get",
        "certificate.get",
    ] {
        let code = sc.request_err(method, json!({ "registerNumber": "1", "semester": 3 }));
        assert!(
            code == "no_workspace",
            "{} returned {} instead of no_workspace",
            method,
            code
        );
    }
}

#[test]
fn bad_json_line_gets_an_error_without_id() {
    let mut sc = spawn_sidecar();
    let resp = sc.send_line("{not json");
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");
    assert!(resp.get("id").is_none());

    // The loop keeps serving afterwards.
    sc.request_ok("health", json!({}));
}

#[test]
fn catalog_subjects_without_workspace_uses_built_in_lists() {
    let mut sc = spawn_sidecar();
    let res = sc.request_ok("catalog.subjects", json!({ "year": 3, "semester": 5 }));
    assert_eq!(res["subjectCount"], 8);
    assert_eq!(res["subjects"][0]["name"], "Computer Network");
    assert_eq!(res["subjects"][7]["category"], "administrative");

    let gap = sc.request_ok("catalog.subjects", json!({ "year": 4, "semester": 7 }));
    assert_eq!(gap["subjectCount"], 0);

    assert_eq!(
        sc.request_err("catalog.subjects", json!({ "year": 9 })),
        "bad_params"
    );
}

#[test]
fn startup_workspace_flag_opens_the_database() {
    let ws = tempfile::tempdir().expect("tempdir");
    let path = ws.path().to_string_lossy().to_string();
    let mut sc = spawn_sidecar_with(&["--workspace", &path]);
    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["workspacePath"], path.as_str());
    let status = sc.request_ok("schema.status", json!({}));
    assert_eq!(status["complete"], true);
    assert!(ws.path().join("nodues.sqlite3").is_file());
}

#[test]
fn invalid_catalog_file_rejects_workspace() {
    let ws = tempfile::tempdir().expect("tempdir");
    std::fs::write(ws.path().join("catalog.json"), "{ \"entries\": 3 }").expect("write");
    let mut sc = spawn_sidecar();
    assert_eq!(
        sc.request_err(
            "workspace.select",
            json!({ "path": ws.path().to_string_lossy() })
        ),
        "catalog_invalid"
    );
    assert_eq!(
        sc.request_err("students.list", json!({})),
        "no_workspace"
    );
}
