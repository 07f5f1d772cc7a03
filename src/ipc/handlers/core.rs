use crate::db::Session;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.session.as_ref().map(|s| s.workspace().to_string_lossy().to_string()),
            "user": state.session.as_ref().and_then(|s| s.user()),
        }),
    )
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let user = req
        .params
        .get("username")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    match Session::open(&path, user) {
        Ok(session) => {
            log::info!("session opened at {}", path.to_string_lossy());
            let user = session.user().map(str::to_string);
            state.session = Some(session);
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "user": user }),
            )
        }
        Err(e) => {
            log::error!("failed to open session: {e:#}");
            err(&req.id, "io_failed", format!("{e:#}"), None)
        }
    }
}

fn handle_session_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was_open = state.session.take().is_some();
    if was_open {
        log::info!("session closed");
    }
    ok(&req.id, json!({ "closed": was_open }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "session.open" => Some(handle_session_open(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        _ => None,
    }
}
