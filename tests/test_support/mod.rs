#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp dir")
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
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
        let value = self.send_raw(&payload.to_string());
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

    /// Asserts failure and returns the error code.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> (String, serde_json::Value) {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let error = value.get("error").cloned().unwrap_or_else(|| json!({}));
        let code = error
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        (code, error)
    }

    pub fn open_session(&mut self, workspace: &std::path::Path) {
        let _ = self.request_ok("session.open", json!({ "path": workspace.to_string_lossy() }));
    }

    /// Two students, two courses, three enrollments.
    pub fn seed(&mut self) {
        for (id, name) in [("S001", "Alice"), ("S002", "Bob")] {
            let _ = self.request_ok("students.create", json!({ "studentId": id, "name": name }));
        }
        for (code, name, credit) in [("C001", "Math", 3.0), ("C002", "Physics", 4.0)] {
            let _ = self.request_ok(
                "courses.create",
                json!({ "courseCode": code, "courseName": name, "credit": credit }),
            );
        }
        for (sid, cno, grade) in [("S001", "C001", 88.0), ("S001", "C002", 75.5), ("S002", "C001", 92.0)] {
            let _ = self.request_ok(
                "enrollments.create",
                json!({ "studentId": sid, "courseCode": cno, "grade": grade }),
            );
        }
    }

    pub fn enrollments(&mut self) -> Vec<(String, String, f64)> {
        let res = self.request_ok("search.enrollments", json!({}));
        res["rows"]
            .as_array()
            .expect("rows")
            .iter()
            .map(|r| {
                (
                    r["studentId"].as_str().expect("sid").to_string(),
                    r["courseCode"].as_str().expect("cno").to_string(),
                    r["grade"].as_f64().expect("grade"),
                )
            })
            .collect()
    }
}
