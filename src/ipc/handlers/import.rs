use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_import_settings;
use crate::ipc::helpers::{db_conn, optional_bool, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, ImportPlan};
use crate::sheet::read_sheet;
use serde_json::json;
use std::path::PathBuf;

const PREVIEW_ROWS: usize = 10;

fn load_plan(req: &Request) -> Result<(PathBuf, ImportPlan), serde_json::Value> {
    let in_path = PathBuf::from(required_str(req, "inPath")?);
    let sheet = read_sheet(&in_path).map_err(|e| store_err(req, e))?;
    let plan = reconcile::plan_import(&sheet).map_err(|missing| {
        err(
            &req.id,
            "validation_failed",
            missing.to_string(),
            Some(json!({
                "field": "headers",
                "missing": missing.0.iter().map(|f| f.label()).collect::<Vec<_>>(),
                "found": sheet.headers,
            })),
        )
    })?;
    Ok((in_path, plan))
}

fn handle_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = match load_import_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (in_path, plan) = match load_plan(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let shown = plan
        .issues
        .iter()
        .take(settings.max_reported_errors)
        .collect::<Vec<_>>();
    ok(
        &req.id,
        json!({
            "path": in_path.to_string_lossy(),
            "columns": plan.headers.matches(),
            "rowCount": plan.rows.len(),
            "previewRows": plan.rows.iter().take(PREVIEW_ROWS).collect::<Vec<_>>(),
            "valid": plan.is_valid(),
            "errors": shown,
            "errorCount": plan.issues.len(),
        }),
    )
}

fn handle_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = match load_import_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut options = settings.options;
    for (key, slot) in [
        ("updateExisting", &mut options.update_existing),
        ("autoAddStudents", &mut options.auto_add_students),
        ("autoAddCourses", &mut options.auto_add_courses),
    ] {
        match optional_bool(req, key) {
            Ok(Some(v)) => *slot = v,
            Ok(None) => {}
            Err(e) => return e,
        }
    }

    let (in_path, plan) = match load_plan(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !plan.is_valid() {
        let shown = plan
            .issues
            .iter()
            .take(settings.max_reported_errors)
            .collect::<Vec<_>>();
        let first = shown.first().map(|i| i.to_string()).unwrap_or_default();
        log::warn!(
            "import of {} rejected: {} validation errors",
            in_path.to_string_lossy(),
            plan.issues.len()
        );
        return err(
            &req.id,
            "validation_failed",
            format!("{} validation errors; first: {}", plan.issues.len(), first),
            Some(json!({ "errorCount": plan.issues.len(), "errors": shown })),
        );
    }

    log::info!(
        "importing {} rows from {}",
        plan.rows.len(),
        in_path.to_string_lossy()
    );
    let summary = reconcile::reconcile(conn, &plan.rows, &options, |done, total| {
        log::debug!("import progress {done}/{total}");
    });
    match summary {
        Ok(s) => ok(&req.id, json!(s)),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.preview" => Some(handle_preview(state, req)),
        "import.apply" => Some(handle_apply(state, req)),
        _ => None,
    }
}
