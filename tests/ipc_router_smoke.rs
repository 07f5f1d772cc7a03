mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir();
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("health", json!({}));
    assert!(health["workspacePath"].is_null());

    let (code, _) = sc.request_err("students.list", json!({}));
    assert_eq!(code, "no_workspace");

    sc.open_session(workspace.path());
    assert!(workspace.path().join("gradebook.sqlite3").is_file());
    sc.seed();

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let students = sc.request_ok("students.list", json!({}));
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(2));
    let courses = sc.request_ok("courses.list", json!({ "query": "phys" }));
    assert_eq!(courses["courses"][0]["courseCode"], "C002");
    let _ = sc.request_ok("search.enrollments", json!({ "text": "Alice" }));
    let _ = sc.request_ok("reports.get", json!({ "kind": "courses" }));
    let _ = sc.request_ok("setup.get", json!({}));

    let (code, _) = sc.request_err("grades.explode", json!({}));
    assert_eq!(code, "not_implemented");

    let bad = sc.send_raw("{ not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    // The sidecar keeps serving after a bad line.
    let _ = sc.request_ok("health", json!({}));

    let closed = sc.request_ok("session.close", json!({}));
    assert_eq!(closed["closed"], true);
    let (code, _) = sc.request_err("courses.list", json!({}));
    assert_eq!(code, "no_workspace");
}

#[test]
fn session_records_last_login_for_known_users() {
    let workspace = temp_dir();
    {
        let mut sc = spawn_sidecar();
        sc.open_session(workspace.path());
    }
    let db_path = workspace.path().join("gradebook.sqlite3");
    {
        let conn = rusqlite::Connection::open(&db_path).expect("open db");
        conn.execute("INSERT INTO users(username) VALUES('registrar')", [])
            .expect("seed user");
    }

    let mut sc = spawn_sidecar();
    let opened = sc.request_ok(
        "session.open",
        json!({ "path": workspace.path().to_string_lossy(), "username": "registrar" }),
    );
    assert_eq!(opened["user"], "registrar");
    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["user"], "registrar");
    drop(sc);

    let conn = rusqlite::Connection::open(&db_path).expect("reopen db");
    let last: Option<String> = conn
        .query_row(
            "SELECT last_login FROM users WHERE username = 'registrar'",
            [],
            |r| r.get(0),
        )
        .expect("query");
    assert!(last.is_some());

    // Unknown users still open a session.
    let mut sc = spawn_sidecar();
    let opened = sc.request_ok(
        "session.open",
        json!({ "path": workspace.path().to_string_lossy(), "username": "nobody" }),
    );
    assert_eq!(opened["user"], "nobody");
}
