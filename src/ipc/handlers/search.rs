use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, store_err};
use crate::ipc::types::{AppState, Request};
use crate::query::{search_enrollments, SearchSpec};
use serde_json::json;

fn handle_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = if req.params.is_null() {
        json!({})
    } else {
        req.params.clone()
    };
    let spec: SearchSpec = match serde_json::from_value(params) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid search params: {e}"), None),
    };
    match search_enrollments(conn, &spec) {
        Ok(rows) => ok(&req.id, json!({ "count": rows.len(), "rows": rows })),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "search.enrollments" => Some(handle_search(state, req)),
        _ => None,
    }
}
