use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

/// An open workspace database plus the user that opened it.
///
/// Every repository call borrows the connection from here; there is no
/// module-level handle.
pub struct Session {
    conn: Connection,
    workspace: PathBuf,
    user: Option<String>,
}

impl Session {
    pub fn open(workspace: &Path, user: Option<String>) -> anyhow::Result<Self> {
        let conn = open_db(workspace)?;
        let session = Self {
            conn,
            workspace: workspace.to_path_buf(),
            user,
        };
        session.record_login();
        Ok(session)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    // Best-effort: a missing users row or a failing update must not block the session.
    fn record_login(&self) {
        let Some(user) = self.user.as_deref() else {
            return;
        };
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        match self.conn.execute(
            "UPDATE users SET last_login = ? WHERE username = ?",
            (&now, user),
        ) {
            Ok(0) => log::debug!("no users row for {user}; last_login not recorded"),
            Ok(_) => log::info!("user {user} logged in"),
            Err(e) => log::warn!("failed to record last_login for {user}: {e}"),
        }
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace directory {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Keys compare case-insensitively, so `c001` and `C001` are the same course.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Student(
            Sno TEXT PRIMARY KEY COLLATE NOCASE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Course(
            Cno TEXT PRIMARY KEY COLLATE NOCASE,
            course_name TEXT NOT NULL,
            Credit REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // No ON DELETE/UPDATE CASCADE: the repository orders child and parent writes itself.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Student_Score(
            Sno TEXT NOT NULL COLLATE NOCASE,
            Cno TEXT NOT NULL COLLATE NOCASE,
            Grade REAL NOT NULL,
            PRIMARY KEY(Sno, Cno),
            FOREIGN KEY(Sno) REFERENCES Student(Sno),
            FOREIGN KEY(Cno) REFERENCES Course(Cno)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_score_cno ON Student_Score(Cno)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            username TEXT PRIMARY KEY
        )",
        [],
    )?;
    // Older workspaces were created before login bookkeeping existed.
    ensure_users_last_login(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_users_last_login(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "last_login")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN last_login TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => {
            let v = serde_json::from_str(&s)
                .with_context(|| format!("settings entry {key} is not valid json"))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_adds_last_login() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE users(username TEXT PRIMARY KEY)", [])
            .expect("legacy users table");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "users", "last_login").expect("pragma"));
        assert!(table_has_column(&conn, "Student_Score", "Grade").expect("pragma"));
    }

    #[test]
    fn login_bookkeeping_updates_existing_user_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = open_db(dir.path()).expect("open");
            conn.execute("INSERT INTO users(username) VALUES('admin')", [])
                .expect("seed user");
        }
        let session = Session::open(dir.path(), Some("admin".to_string())).expect("session");
        let last: Option<String> = session
            .conn()
            .query_row(
                "SELECT last_login FROM users WHERE username = 'admin'",
                [],
                |r| r.get(0),
            )
            .expect("query");
        assert!(last.is_some());

        // Unknown users still get a session.
        let other = Session::open(dir.path(), Some("ghost".to_string())).expect("session");
        assert_eq!(other.user(), Some("ghost"));
    }

    #[test]
    fn settings_roundtrip_overwrites() {
        let conn = open_in_memory().expect("open");
        assert!(settings_get_json(&conn, "setup.import").expect("get").is_none());
        settings_set_json(&conn, "setup.import", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "setup.import", &serde_json::json!({ "a": 2 })).expect("set");
        let v = settings_get_json(&conn, "setup.import").expect("get").expect("present");
        assert_eq!(v["a"], 2);
    }
}
