use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::repo;
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let query = optional_str(req, "query");
    match repo::list_students(conn, query.as_deref()) {
        Ok(rows) => ok(&req.id, json!({ "students": rows })),
        Err(e) => store_err(req, e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::add_student(conn, &student_id, &name) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => store_err(req, e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let new_id = optional_str(req, "newStudentId").unwrap_or_else(|| student_id.clone());
    match repo::rename_student(conn, &student_id, &new_id, &name) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => store_err(req, e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::delete_student(conn, &student_id) {
        Ok(removed) => ok(&req.id, json!({ "enrollmentsRemoved": removed })),
        Err(e) => store_err(req, e),
    }
}

fn handle_transcript(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::student_transcript(conn, &student_id) {
        Ok(rows) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "stats": repo::transcript_stats(&rows),
                "courses": rows,
            }),
        ),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        "students.transcript" => Some(handle_transcript(state, req)),
        _ => None,
    }
}
