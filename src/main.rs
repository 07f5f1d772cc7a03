mod db;
mod error;
mod ipc;
mod model;
mod query;
mod reconcile;
mod repo;
mod reports;
mod sheet;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gradebookd")]
#[command(version)]
#[command(about = "Student grade manager sidecar speaking JSON lines on stdin/stdout", long_about = None)]
struct Args {
    /// Open a session on this workspace directory at start-up
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// User recorded by the login bookkeeping update
    #[arg(long)]
    user: Option<String>,

    /// Log filter (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut state = ipc::AppState::default();
    if let Some(workspace) = args.workspace.as_deref() {
        match db::Session::open(workspace, args.user.clone()) {
            Ok(session) => {
                log::info!("session opened at {}", workspace.to_string_lossy());
                state.session = Some(session);
            }
            Err(e) => log::error!("could not open workspace at start-up: {e:#}"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                log::warn!("unparseable request line: {e}");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        log::debug!("request {} {}", req.id, req.method);
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
