//! Spreadsheet import: header matching, a write-free validation pass, and
//! the reconciliation pass that upserts rows inside one transaction.

use crate::error::{StoreError, StoreResult};
use crate::model::{validate_course_number, GRADE_MAX, GRADE_MIN};
use crate::repo::{course_exists, enrollment_exists, student_exists};
use crate::sheet::{Sheet, SheetRow};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    StudentId,
    Name,
    CourseCode,
    CourseName,
    Credit,
    Grade,
}

impl CanonicalField {
    pub const ALL: [Self; 6] = [
        Self::StudentId,
        Self::Name,
        Self::CourseCode,
        Self::CourseName,
        Self::Credit,
        Self::Grade,
    ];

    /// Accepted header spellings, lowercase.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::StudentId => &["学号", "学生学号", "学生号", "sno", "student_id", "学生id", "studentid"],
            Self::Name => &["姓名", "学生姓名", "name", "student_name"],
            Self::CourseCode => &["课程号", "课号", "课程编号", "cno", "course_id", "course_code", "coursecode"],
            Self::CourseName => &["课程名称", "课程名", "课程", "course_name", "course", "coursename"],
            Self::Credit => &["学分", "分值", "学分值", "credit"],
            Self::Grade => &["成绩", "得分", "分数", "grade", "score"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::StudentId => "StudentId",
            Self::Name => "Name",
            Self::CourseCode => "CourseCode",
            Self::CourseName => "CourseName",
            Self::Credit => "Credit",
            Self::Grade => "Grade",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMatch {
    pub field: CanonicalField,
    pub column: usize,
    pub header: String,
}

#[derive(Debug, Clone)]
pub struct HeaderMap {
    matches: Vec<ColumnMatch>,
}

impl HeaderMap {
    pub fn matches(&self) -> &[ColumnMatch] {
        &self.matches
    }

    fn column(&self, field: CanonicalField) -> Option<usize> {
        self.matches
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingColumns(pub Vec<CanonicalField>);

impl fmt::Display for MissingColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .0
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "missing required columns: {names}")
    }
}

impl From<MissingColumns> for StoreError {
    fn from(m: MissingColumns) -> Self {
        StoreError::validation("headers", m.to_string())
    }
}

/// Resolves each canonical field to the first header that is one of its
/// synonyms (case-insensitive). Fails with every field left unmatched.
pub fn match_headers(headers: &[String]) -> Result<HeaderMap, MissingColumns> {
    let lowered = headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect::<Vec<_>>();
    let mut matches = Vec::new();
    let mut missing = Vec::new();
    for field in CanonicalField::ALL {
        let synonyms = field.synonyms();
        match lowered.iter().position(|h| synonyms.contains(&h.as_str())) {
            Some(column) => matches.push(ColumnMatch {
                field,
                column,
                header: headers[column].trim().to_string(),
            }),
            None => missing.push(field),
        }
    }
    if missing.is_empty() {
        Ok(HeaderMap { matches })
    } else {
        Err(MissingColumns(missing))
    }
}

/// A data row rewritten onto the canonical fields, cells trimmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardRow {
    /// 1-based position among data rows.
    pub row: usize,
    pub line: usize,
    pub student_id: String,
    pub name: String,
    pub course_code: String,
    pub course_name: String,
    pub credit: String,
    pub grade: String,
}

pub fn standardize(sheet: &Sheet, map: &HeaderMap) -> Vec<StandardRow> {
    let get = |r: &SheetRow, f: CanonicalField| -> String {
        map.column(f)
            .map(|c| r.cell(c).trim().to_string())
            .unwrap_or_default()
    };
    sheet
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| StandardRow {
            row: i + 1,
            line: r.line,
            student_id: get(r, CanonicalField::StudentId),
            name: get(r, CanonicalField::Name),
            course_code: get(r, CanonicalField::CourseCode),
            course_name: get(r, CanonicalField::CourseName),
            credit: get(r, CanonicalField::Credit),
            grade: get(r, CanonicalField::Grade),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub row: usize,
    pub line: usize,
    pub field: CanonicalField,
    pub message: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} (line {}): {}", self.row, self.line, self.message)
    }
}

/// Collects every problem in every row. Performs no writes.
pub fn validate_rows(rows: &[StandardRow]) -> Vec<RowIssue> {
    let mut issues = Vec::new();
    for r in rows {
        let mut push = |field: CanonicalField, message: String| {
            issues.push(RowIssue {
                row: r.row,
                line: r.line,
                field,
                message,
            });
        };
        if r.student_id.is_empty() {
            push(CanonicalField::StudentId, "student id must not be empty".into());
        }
        if r.name.is_empty() {
            push(CanonicalField::Name, "name must not be empty".into());
        }
        if r.course_code.is_empty() {
            push(CanonicalField::CourseCode, "course code must not be empty".into());
        }
        if !r.credit.is_empty() {
            match r.credit.parse::<f64>() {
                Ok(c) if c.is_finite() && c > 0.0 => {}
                Ok(_) => push(CanonicalField::Credit, "credit must be greater than 0".into()),
                Err(_) => push(CanonicalField::Credit, "credit must be a number".into()),
            }
        }
        if !r.grade.is_empty() {
            match r.grade.parse::<f64>() {
                Ok(g) if g.is_finite() && (GRADE_MIN..=GRADE_MAX).contains(&g) => {}
                Ok(_) => push(
                    CanonicalField::Grade,
                    format!("grade must be within {GRADE_MIN}-{GRADE_MAX}"),
                ),
                Err(_) => push(CanonicalField::Grade, "grade must be a number".into()),
            }
        }
    }
    issues
}

#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub headers: HeaderMap,
    pub rows: Vec<StandardRow>,
    pub issues: Vec<RowIssue>,
}

impl ImportPlan {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn plan_import(sheet: &Sheet) -> Result<ImportPlan, MissingColumns> {
    let headers = match_headers(&sheet.headers)?;
    let rows = standardize(sheet, &headers);
    let issues = validate_rows(&rows);
    Ok(ImportPlan {
        headers,
        rows,
        issues,
    })
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub update_existing: bool,
    pub auto_add_students: bool,
    pub auto_add_courses: bool,
    pub course_name_prefix: String,
    pub progress_every: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            update_existing: true,
            auto_add_students: true,
            auto_add_courses: true,
            course_name_prefix: "[imported]Course".to_string(),
            progress_every: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InvalidCourseCode(String),
    MissingStudent(String),
    MissingCourse(String),
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCourseCode(m) => write!(f, "{m}"),
            Self::MissingStudent(id) => {
                write!(f, "student {id} does not exist and auto-add is off")
            }
            Self::MissingCourse(code) => {
                write!(f, "course {code} does not exist and auto-add is off")
            }
            Self::Failed(m) => write!(f, "{m}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Updated,
    /// Enrollment already present and updates are off.
    Unchanged,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub row: usize,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub skipped: Vec<SkippedRow>,
}

fn parse_or_zero(s: &str) -> f64 {
    s.parse::<f64>().unwrap_or(0.0)
}

fn reconcile_row(
    conn: &Connection,
    row: &StandardRow,
    options: &ImportOptions,
) -> StoreResult<RowOutcome> {
    if let Err(e) = validate_course_number(&row.course_code) {
        let message = match e {
            StoreError::Validation { message, .. } => message,
            other => other.to_string(),
        };
        return Ok(RowOutcome::Skipped(SkipReason::InvalidCourseCode(message)));
    }
    let credit = parse_or_zero(&row.credit);
    let grade = parse_or_zero(&row.grade);

    if !student_exists(conn, &row.student_id)? {
        if !options.auto_add_students {
            return Ok(RowOutcome::Skipped(SkipReason::MissingStudent(
                row.student_id.clone(),
            )));
        }
        conn.execute(
            "INSERT INTO Student(Sno, name) VALUES(?, ?)",
            (&row.student_id, &row.name),
        )?;
    }

    if !course_exists(conn, &row.course_code)? {
        if !options.auto_add_courses {
            return Ok(RowOutcome::Skipped(SkipReason::MissingCourse(
                row.course_code.clone(),
            )));
        }
        let course_name = if row.course_name.is_empty() {
            format!("{}{}", options.course_name_prefix, row.course_code)
        } else {
            row.course_name.clone()
        };
        conn.execute(
            "INSERT INTO Course(Cno, course_name, Credit) VALUES(?, ?, ?)",
            (&row.course_code, &course_name, credit),
        )?;
    }

    if enrollment_exists(conn, &row.student_id, &row.course_code)? {
        if !options.update_existing {
            return Ok(RowOutcome::Unchanged);
        }
        conn.execute(
            "UPDATE Student_Score SET Grade = ? WHERE Sno = ? AND Cno = ?",
            (grade, &row.student_id, &row.course_code),
        )?;
        return Ok(RowOutcome::Updated);
    }

    conn.execute(
        "INSERT INTO Student_Score(Sno, Cno, Grade) VALUES(?, ?, ?)",
        (&row.student_id, &row.course_code, grade),
    )?;
    Ok(RowOutcome::Inserted)
}

/// Writes validated rows in one transaction.
///
/// Each row runs in its own savepoint: a skipped or failed row leaves no
/// trace and only bumps the error count. A failure of the enclosing
/// transaction itself rolls back everything staged so far.
pub fn reconcile(
    conn: &Connection,
    rows: &[StandardRow],
    options: &ImportOptions,
    mut on_progress: impl FnMut(usize, usize),
) -> StoreResult<ImportSummary> {
    let operation = "spreadsheet import";

    let mut tx = conn
        .unchecked_transaction()
        .map_err(|source| StoreError::Transaction { operation, source })?;
    let summary = match stage_rows(&mut tx, rows, options, &mut on_progress) {
        Ok(summary) => summary,
        Err(source) => {
            if let Err(rb) = tx.rollback() {
                log::error!("{operation}: rollback failed: {rb}");
            }
            log::error!("{operation} rolled back: {source}");
            return Err(StoreError::Transaction { operation, source });
        }
    };
    // A failed COMMIT leaves the transaction open; dropping it rolls back.
    tx.commit().map_err(|source| {
        log::error!("{operation} rolled back, commit failed: {source}");
        StoreError::Transaction { operation, source }
    })?;
    log::info!(
        "import finished: {} imported, {} updated, {} errors",
        summary.imported,
        summary.updated,
        summary.errors
    );
    Ok(summary)
}

fn stage_rows(
    tx: &mut Transaction<'_>,
    rows: &[StandardRow],
    options: &ImportOptions,
    on_progress: &mut impl FnMut(usize, usize),
) -> rusqlite::Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let every = options.progress_every.max(1);
    let total = rows.len();

    for (i, row) in rows.iter().enumerate() {
        if i % every == 0 {
            on_progress(i + 1, total);
        }

        let sp = tx.savepoint()?;
        let outcome = match reconcile_row(&sp, row, options) {
            Ok(o) => o,
            Err(e) => RowOutcome::Skipped(SkipReason::Failed(e.to_string())),
        };
        match outcome {
            RowOutcome::Skipped(reason) => {
                drop(sp);
                log::warn!("import row {} (line {}) skipped: {reason}", row.row, row.line);
                summary.errors += 1;
                summary.skipped.push(SkippedRow {
                    row: row.row,
                    line: row.line,
                    reason: reason.to_string(),
                });
            }
            outcome => {
                sp.commit()?;
                match outcome {
                    RowOutcome::Inserted => summary.imported += 1,
                    RowOutcome::Updated => summary.updated += 1,
                    _ => summary.unchanged += 1,
                }
            }
        }
    }
    Ok(summary)
}
