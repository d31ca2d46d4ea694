#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

pub fn spawn_sidecar() -> Sidecar {
    spawn_sidecar_with(&[])
}

pub fn spawn_sidecar_with(args: &[&str]) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_noduesd");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("NODUESD_WORKSPACE")
        .env_remove("NODUESD_SCHEMA_MODE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn noduesd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        _child: child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Returns the error code of a request that is expected to fail.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    pub fn select_workspace(&mut self, path: &Path) -> serde_json::Value {
        self.request_ok("workspace.select", json!({ "path": path.to_string_lossy() }))
    }

    pub fn register(&mut self, name: &str, reg: &str, year: i64, semester: i64) -> String {
        let result = self.request_ok(
            "students.register",
            json!({
                "name": name,
                "registerNumber": reg,
                "year": year,
                "semester": semester,
                "department": "Information Technology"
            }),
        );
        result["student"]["id"]
            .as_str()
            .expect("student id")
            .to_string()
    }
}

/// Writes a workspace catalog with a single (year, semester) entry.
pub fn write_catalog(workspace: &Path, year: i64, semester: i64, subjects: &[&str]) {
    let body = json!({
        "administrative": ["Office", "Library"],
        "entries": [{ "year": year, "semester": semester, "subjects": subjects }]
    });
    std::fs::write(workspace.join("catalog.json"), body.to_string()).expect("write catalog");
}

pub fn subject<'a>(result: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
    result["subjects"]
        .as_array()
        .and_then(|arr| arr.iter().find(|s| s["subject"] == name))
        .unwrap_or_else(|| panic!("subject {} missing in {}", name, result))
}
