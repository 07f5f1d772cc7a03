use crate::error::StoreError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .session
        .as_ref()
        .map(|s| s.conn())
        .ok_or_else(|| err(&req.id, "no_workspace", "open a session first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

/// Accepts a JSON number or a numeric string. Text that does not parse is a
/// `validation_failed` on `key`; a missing key or another JSON type is
/// `bad_params`.
pub fn required_f64(req: &Request, key: &str) -> Result<f64, Value> {
    let details = Some(json!({ "field": key }));
    match req.params.get(key) {
        None | Some(Value::Null) => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            err(&req.id, "bad_params", format!("{} must be a number", key), details.clone())
        }),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            err(
                &req.id,
                "validation_failed",
                format!("{} must be a number, got '{}'", key, s),
                details.clone(),
            )
        }),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a number", key),
            details,
        )),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be boolean", key),
            Some(json!({ "field": key })),
        )),
    }
}

pub fn store_err(req: &Request, e: StoreError) -> Value {
    err(&req.id, e.code(), e.to_string(), e.details())
}
