use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_bool, required_f64, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::repo::{self, GradeChange};
use serde_json::json;

fn pair(req: &Request) -> Result<(String, String), serde_json::Value> {
    Ok((required_str(req, "studentId")?, required_str(req, "courseCode")?))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (student_id, course_code) = match pair(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::get_enrollment(conn, &student_id, &course_code) {
        Ok(Some(enrollment)) => ok(&req.id, json!({ "enrollment": enrollment })),
        Ok(None) => err(
            &req.id,
            "not_found",
            format!("enrollment {student_id}/{course_code} not found"),
            Some(json!({ "entity": "enrollment", "key": format!("{student_id}/{course_code}") })),
        ),
        Err(e) => store_err(req, e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (student_id, course_code) = match pair(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match required_f64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::add_enrollment(conn, &student_id, &course_code, grade) {
        Ok(enrollment) => ok(&req.id, json!({ "enrollment": enrollment })),
        Err(e) => store_err(req, e),
    }
}

fn handle_update_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (student_id, course_code) = match pair(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match required_f64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::update_enrollment_grade(conn, &student_id, &course_code, grade) {
        Ok(enrollment) => ok(&req.id, json!({ "enrollment": enrollment })),
        Err(e) => store_err(req, e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (student_id, course_code) = match pair(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo::delete_enrollment(conn, &student_id, &course_code) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => store_err(req, e),
    }
}

fn handle_batch_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("changes") else {
        return err(&req.id, "bad_params", "missing changes", None);
    };
    let changes: Vec<GradeChange> = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("changes must be a list of {{studentId, courseCode, grade}}: {e}"),
                None,
            )
        }
    };
    let partial_commit = match optional_bool(req, "partialCommit") {
        Ok(v) => v.unwrap_or(false),
        Err(e) => return e,
    };
    match repo::batch_update_grades(conn, &changes, partial_commit) {
        Ok(outcome) => ok(&req.id, json!(outcome)),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.get" => Some(handle_get(state, req)),
        "enrollments.create" => Some(handle_create(state, req)),
        "enrollments.updateGrade" => Some(handle_update_grade(state, req)),
        "enrollments.delete" => Some(handle_delete(state, req)),
        "enrollments.batchUpdateGrades" => Some(handle_batch_update(state, req)),
        _ => None,
    }
}
