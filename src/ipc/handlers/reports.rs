use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::reports::{build_report, export_report, ReportKind};
use serde_json::json;
use std::path::PathBuf;

fn parse_kind(req: &Request) -> Result<ReportKind, serde_json::Value> {
    let raw = required_str(req, "kind")?;
    ReportKind::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "kind must be one of: enrollments, students, courses",
            Some(json!({ "kind": raw })),
        )
    })
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match parse_kind(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match build_report(conn, kind) {
        Ok(report) => ok(
            &req.id,
            json!({ "columns": report.kind().headers(), "report": report }),
        ),
        Err(e) => store_err(req, e),
    }
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match parse_kind(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(p) => PathBuf::from(p),
        Err(e) => return e,
    };
    match export_report(conn, kind, &out_path) {
        Ok(rows) => ok(
            &req.id,
            json!({ "path": out_path.to_string_lossy(), "rowsExported": rows }),
        ),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.get" => Some(handle_get(state, req)),
        "reports.export" => Some(handle_export(state, req)),
        _ => None,
    }
}
