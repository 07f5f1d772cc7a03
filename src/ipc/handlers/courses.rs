use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, required_f64, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::repo;
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let query = optional_str(req, "query");
    match repo::list_courses(conn, query.as_deref()) {
        Ok(rows) => ok(&req.id, json!({ "courses": rows })),
        Err(e) => store_err(req, e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (course_code, course_name, credit) = match (
        required_str(req, "courseCode"),
        required_str(req, "courseName"),
        required_f64(req, "credit"),
    ) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e,
    };
    match repo::add_course(conn, &course_code, &course_name, credit) {
        Ok(course) => ok(&req.id, json!({ "course": course })),
        Err(e) => store_err(req, e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (course_code, course_name, credit) = match (
        required_str(req, "courseCode"),
        required_str(req, "courseName"),
        required_f64(req, "credit"),
    ) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e,
    };
    let new_code = optional_str(req, "newCourseCode").unwrap_or_else(|| course_code.clone());
    match repo::rename_course(conn, &course_code, &new_code, &course_name, credit) {
        Ok(course) => ok(&req.id, json!({ "course": course })),
        Err(e) => store_err(req, e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::delete_course(conn, &course_code) {
        Ok(removed) => ok(&req.id, json!({ "enrollmentsRemoved": removed })),
        Err(e) => store_err(req, e),
    }
}

fn handle_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::course_roster(conn, &course_code) {
        Ok(rows) => ok(
            &req.id,
            json!({
                "courseCode": course_code,
                "stats": repo::roster_stats(&rows),
                "students": rows,
            }),
        ),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_list(state, req)),
        "courses.create" => Some(handle_create(state, req)),
        "courses.update" => Some(handle_update(state, req)),
        "courses.delete" => Some(handle_delete(state, req)),
        "courses.roster" => Some(handle_roster(state, req)),
        _ => None,
    }
}
