mod common;

use common::{spawn_sidecar, subject, write_catalog};
use rusqlite::Connection;
use serde_json::json;

fn scenario_workspace() -> tempfile::TempDir {
    let ws = tempfile::tempdir().expect("tempdir");
    write_catalog(ws.path(), 2, 3, &["DM", "DPCO", "Office", "Library"]);
    ws
}

#[test]
fn second_year_scenario_reconciles_and_rolls_up() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    let selected = sc.select_workspace(ws.path());
    assert!(selected["catalog"]
        .as_str()
        .map(|s| s.ends_with("catalog.json"))
        .unwrap_or(false));
    let student_id = sc.register("Devi", "2001", 2, 3);

    let saved = sc.request_ok(
        "marks.save",
        json!({
            "studentId": student_id,
            "marks": [
                { "subject": "DM", "assignmentSubmitted": true, "departmentFine": 0 },
                { "subject": "Office", "signed": true }
            ]
        }),
    );
    assert_eq!(saved["saved"], 2);

    let view = sc.request_ok("students.get", json!({ "registerNumber": "2001" }));
    let order: Vec<&str> = view["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .map(|s| s["subject"].as_str().unwrap_or(""))
        .collect();
    assert_eq!(order, ["DM", "DPCO", "Office", "Library"]);
    assert_eq!(subject(&view, "DM")["dueStatus"], "Completed");
    assert_eq!(subject(&view, "DPCO")["dueStatus"], "Pending");
    assert_eq!(subject(&view, "DPCO")["assignmentSubmitted"], false);
    assert_eq!(subject(&view, "Office")["dueStatus"], "Completed");
    assert_eq!(subject(&view, "Office")["category"], "administrative");
    assert_eq!(subject(&view, "Library")["dueStatus"], "Pending");
    assert_eq!(view["overallStatus"], "Pending");
}

#[test]
fn bulk_fees_fan_out_to_academic_subjects_only() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    sc.select_workspace(ws.path());
    let student_id = sc.register("Ezhil", "2002", 2, 3);

    let pending = sc.request_ok(
        "marks.bulkFees",
        json!({ "studentId": student_id, "paid": false }),
    );
    assert_eq!(pending["updated"], 2);
    assert_eq!(subject(&pending, "DM")["departmentFine"], 1);
    assert_eq!(subject(&pending, "DPCO")["feesPaid"], false);
    assert_eq!(subject(&pending, "Office")["departmentFine"], 0);

    let paid = sc.request_ok(
        "marks.bulkFees",
        json!({ "studentId": student_id, "paid": true }),
    );
    assert_eq!(paid["updated"], 2);
    assert_eq!(subject(&paid, "DM")["departmentFine"], 0);

    let again = sc.request_ok(
        "marks.bulkFees",
        json!({ "studentId": student_id, "paid": true }),
    );
    assert_eq!(again["updated"], 0);
    assert_eq!(again["subjects"], paid["subjects"]);
}

#[test]
fn edits_and_bulk_assignments_clear_the_student() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    sc.select_workspace(ws.path());
    let student_id = sc.register("Farah", "2003", 2, 3);

    let edited = sc.request_ok(
        "marks.edit",
        json!({
            "studentId": student_id,
            "edits": [
                { "subject": "DM", "field": "iat1", "value": 78 },
                { "subject": "DM", "field": "model", "value": 91 },
                { "subject": "Office", "field": "signed", "value": true },
                { "subject": "Library", "field": "signed", "value": true }
            ]
        }),
    );
    assert_eq!(edited["updated"], 3);
    assert_eq!(subject(&edited, "DM")["iat1"], 78);
    // Scores alone do not clear a subject.
    assert_eq!(subject(&edited, "DM")["dueStatus"], "Pending");

    let cleared = sc.request_ok(
        "marks.bulkAssignments",
        json!({ "studentId": student_id, "submitted": true }),
    );
    assert_eq!(cleared["updated"], 2);
    assert_eq!(cleared["overallStatus"], "Completed");
    assert_eq!(subject(&cleared, "Office")["assignmentSubmitted"], false);

    let reopened = sc.request_ok(
        "marks.edit",
        json!({
            "studentId": student_id,
            "edits": [{ "subject": "DPCO", "field": "departmentFees", "value": false }]
        }),
    );
    assert_eq!(subject(&reopened, "DPCO")["departmentFine"], 1);
    assert_eq!(reopened["overallStatus"], "Pending");

    let cert = sc.request_ok("certificate.get", json!({ "registerNumber": "2003" }));
    let cert = &cert["certificate"];
    assert_eq!(cert["title"], "NO DUE CERTIFICATE");
    assert_eq!(cert["fileName"], "no-due-certificate-2003.pdf");
    assert_eq!(cert["student"]["name"], "Farah");
    assert_eq!(cert["overallStatus"], "Pending");
    assert_eq!(cert["subjects"][0]["model"], 91);
}

#[test]
fn invalid_marks_are_rejected_before_any_write() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    sc.select_workspace(ws.path());
    let student_id = sc.register("Gokul", "2004", 2, 3);

    for marks in [
        json!([{ "subject": "DM", "iat1": 101 }]),
        json!([{ "subject": "DM", "iat2": -1 }]),
        json!([{ "subject": "DM", "departmentFine": -3 }]),
        json!([{ "subject": "Physics" }]),
        json!([{ "subject": "DM" }, { "subject": "DM" }]),
        json!([{ "subject": "DM", "signed": "yes" }]),
        json!([{ "subject": "DPCO", "assignmentSubmitted": true }, { "subject": "Chemistry" }]),
    ] {
        assert_eq!(
            sc.request_err(
                "marks.save",
                json!({ "studentId": student_id, "marks": marks.clone() })
            ),
            "bad_params",
            "marks {} should be rejected",
            marks
        );
    }
    assert_eq!(
        sc.request_err(
            "marks.edit",
            json!({
                "studentId": student_id,
                "edits": [{ "subject": "DM", "field": "grade", "value": 1 }]
            })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "marks.save",
            json!({ "studentId": "nobody", "marks": [] })
        ),
        "not_found"
    );

    let view = sc.request_ok("students.get", json!({ "registerNumber": "2004" }));
    assert_eq!(subject(&view, "DPCO")["assignmentSubmitted"], false);
}

#[test]
fn administrative_subjects_reject_academic_fields() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    sc.select_workspace(ws.path());
    let student_id = sc.register("Indu", "2006", 2, 3);

    for marks in [
        json!([{ "subject": "Office", "iat1": 40 }]),
        json!([{ "subject": "Library", "assignmentSubmitted": true }]),
        json!([{ "subject": "Library", "departmentFine": 250 }]),
    ] {
        assert_eq!(
            sc.request_err(
                "marks.save",
                json!({ "studentId": student_id, "marks": marks.clone() })
            ),
            "bad_params",
            "marks {} should be rejected",
            marks
        );
    }
    for (field, value) in [
        ("model", json!(55)),
        ("assignmentSubmitted", json!(true)),
        ("departmentFees", json!(false)),
    ] {
        assert_eq!(
            sc.request_err(
                "marks.edit",
                json!({
                    "studentId": student_id,
                    "edits": [{ "subject": "Office", "field": field, "value": value }]
                })
            ),
            "bad_params",
            "edit of {} on Office should be rejected",
            field
        );
    }

    // Default values round-trip, so a full row read back can be saved as is.
    let saved = sc.request_ok(
        "marks.save",
        json!({
            "studentId": student_id,
            "marks": [{
                "subject": "Office",
                "iat1": null,
                "signed": true,
                "assignmentSubmitted": false,
                "departmentFine": 0
            }]
        }),
    );
    assert_eq!(subject(&saved, "Office")["dueStatus"], "Completed");
}

#[test]
fn store_failure_stops_the_save_and_keeps_earlier_rows() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    sc.select_workspace(ws.path());
    let student_id = sc.register("Janani", "2007", 2, 3);

    let conn = Connection::open(ws.path().join("nodues.sqlite3")).expect("open db");
    conn.execute_batch(
        "CREATE TRIGGER reject_dpco BEFORE INSERT ON marks
         WHEN NEW.subject = 'DPCO'
         BEGIN SELECT RAISE(ABORT, 'dpco locked'); END;",
    )
    .expect("create trigger");

    let resp = sc.request(
        "marks.save",
        json!({
            "studentId": student_id,
            "marks": [
                { "subject": "DM", "assignmentSubmitted": true },
                { "subject": "DPCO", "assignmentSubmitted": true },
                { "subject": "Office", "signed": true }
            ]
        }),
    );
    assert_eq!(resp["ok"], false, "{}", resp);
    let error = &resp["error"];
    assert_eq!(error["code"], "db_insert_failed");
    assert_eq!(error["details"]["saved"], 1);
    assert_eq!(error["details"]["subject"], "DPCO");
    assert_eq!(error["details"]["table"], "marks");
    assert!(error["message"]
        .as_str()
        .map(|m| m.contains("dpco locked"))
        .unwrap_or(false));

    let view = sc.request_ok("students.get", json!({ "registerNumber": "2007" }));
    assert_eq!(subject(&view, "DM")["assignmentSubmitted"], true);
    assert_eq!(subject(&view, "DPCO")["assignmentSubmitted"], false);
    assert_eq!(subject(&view, "Office")["signed"], false);
}

#[test]
fn empty_catalog_reports_zero_subjects() {
    let ws = scenario_workspace();
    let mut sc = spawn_sidecar();
    sc.select_workspace(ws.path());
    sc.register("Hari", "2005", 4, 7);

    let view = sc.request_ok("students.get", json!({ "registerNumber": "2005" }));
    assert_eq!(view["subjectCount"], 0);
    assert_eq!(view["overallStatus"], "Completed");
}
