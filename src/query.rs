//! Filtered, sorted enrollment search.
//!
//! User text only ever reaches SQLite as a bound parameter; column names and
//! sort directions come from closed enums.

use crate::error::{StoreError, StoreResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchField {
    #[default]
    All,
    StudentId,
    Name,
    CourseCode,
    Credit,
    Grade,
}

impl SearchField {
    fn column(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::StudentId => Some("s.Sno"),
            Self::Name => Some("s.name"),
            Self::CourseCode => Some("sc.Cno"),
            Self::Credit => Some("c.Credit"),
            Self::Grade => Some("sc.Grade"),
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Credit | Self::Grade)
    }

    fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::StudentId => "studentId",
            Self::Name => "name",
            Self::CourseCode => "courseCode",
            Self::Credit => "credit",
            Self::Grade => "grade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    NotEqual,
}

impl Operator {
    fn is_text(self) -> bool {
        matches!(
            self,
            Self::Contains | Self::Equals | Self::StartsWith | Self::EndsWith
        )
    }

    fn is_numeric(self) -> bool {
        !matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }

    fn comparison(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::NotEqual => "<>",
            _ => "=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    StudentId,
    Name,
    CourseCode,
    Credit,
    Grade,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            Self::StudentId => "s.Sno",
            Self::Name => "s.name",
            Self::CourseCode => "sc.Cno",
            Self::Credit => "c.Credit",
            Self::Grade => "sc.Grade",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GradePreset {
    Excellent,
    Good,
    Fair,
    Pass,
    Fail,
}

impl GradePreset {
    pub fn range(self) -> (f64, f64) {
        match self {
            Self::Excellent => (90.0, 100.0),
            Self::Good => (80.0, 89.0),
            Self::Fair => (70.0, 79.0),
            Self::Pass => (60.0, 69.0),
            Self::Fail => (0.0, 59.0),
        }
    }
}

/// A number typed into a form field; may arrive as JSON text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
}

impl NumberInput {
    /// Blank text resolves to `None`; other non-numeric text is a
    /// validation failure naming `field`.
    pub(crate) fn resolve(&self, field: &str) -> StoreResult<Option<f64>> {
        match self {
            Self::Number(n) => Ok(Some(*n)),
            Self::Text(s) if s.trim().is_empty() => Ok(None),
            Self::Text(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                StoreError::validation(field, format!("{field} must be a number, got '{s}'"))
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSpec {
    pub text: Option<String>,
    pub field: SearchField,
    pub operator: Option<Operator>,
    pub course_filter: Option<String>,
    pub grade_min: Option<NumberInput>,
    pub grade_max: Option<NumberInput>,
    pub grade_preset: Option<GradePreset>,
    pub sort_field: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRow {
    pub student_id: String,
    pub name: String,
    pub course_code: String,
    pub course_name: String,
    pub credit: f64,
    pub grade: f64,
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '%' || ch == '_' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// `%text%` with LIKE wildcards in `text` escaped (use with `ESCAPE '\'`).
pub fn like_contains(s: &str) -> String {
    format!("%{}%", escape_like(s))
}

pub fn build_search(spec: &SearchSpec) -> StoreResult<BuiltQuery> {
    let mut sql = String::from(
        "SELECT s.Sno, s.name, sc.Cno, c.course_name, c.Credit, sc.Grade
         FROM Student_Score sc
         JOIN Student s ON sc.Sno = s.Sno
         JOIN Course c ON sc.Cno = c.Cno
         WHERE 1=1",
    );
    let mut params: Vec<Value> = Vec::new();

    let text = spec
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(text) = text {
        match spec.field.column() {
            None => {
                sql.push_str(
                    " AND (s.Sno LIKE ? ESCAPE '\\' OR s.name LIKE ? ESCAPE '\\'
                      OR sc.Cno LIKE ? ESCAPE '\\' OR c.course_name LIKE ? ESCAPE '\\')",
                );
                let pattern = like_contains(text);
                for _ in 0..4 {
                    params.push(Value::Text(pattern.clone()));
                }
            }
            Some(column) if spec.field.is_numeric() => {
                let op = spec.operator.unwrap_or(Operator::Equals);
                if !op.is_numeric() {
                    return Err(StoreError::validation(
                        "operator",
                        format!("{:?} cannot be used with numeric field {}", op, spec.field.label()),
                    ));
                }
                let value = text.parse::<f64>().map_err(|_| {
                    StoreError::validation(
                        spec.field.label(),
                        format!("{} must be a number, got '{}'", spec.field.label(), text),
                    )
                })?;
                sql.push_str(&format!(" AND {} {} ?", column, op.comparison()));
                params.push(Value::Real(value));
            }
            Some(column) => {
                let op = spec.operator.unwrap_or(Operator::Contains);
                if !op.is_text() {
                    return Err(StoreError::validation(
                        "operator",
                        format!("{:?} cannot be used with text field {}", op, spec.field.label()),
                    ));
                }
                let escaped = escape_like(text);
                let (clause, value) = match op {
                    Operator::Equals => (format!(" AND {column} = ?"), text.to_string()),
                    Operator::StartsWith => (
                        format!(" AND {column} LIKE ? ESCAPE '\\'"),
                        format!("{escaped}%"),
                    ),
                    Operator::EndsWith => (
                        format!(" AND {column} LIKE ? ESCAPE '\\'"),
                        format!("%{escaped}"),
                    ),
                    _ => (
                        format!(" AND {column} LIKE ? ESCAPE '\\'"),
                        format!("%{escaped}%"),
                    ),
                };
                sql.push_str(&clause);
                params.push(Value::Text(value));
            }
        }
    }

    if let Some(code) = spec
        .course_filter
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        sql.push_str(" AND sc.Cno = ?");
        params.push(Value::Text(code.to_string()));
    }

    let preset = spec.grade_preset.map(GradePreset::range);
    let grade_min = match &spec.grade_min {
        Some(v) => v.resolve("gradeMin")?,
        None => None,
    }
    .or(preset.map(|p| p.0));
    let grade_max = match &spec.grade_max {
        Some(v) => v.resolve("gradeMax")?,
        None => None,
    }
    .or(preset.map(|p| p.1));
    if let Some(min) = grade_min {
        sql.push_str(" AND sc.Grade >= ?");
        params.push(Value::Real(min));
    }
    if let Some(max) = grade_max {
        sql.push_str(" AND sc.Grade <= ?");
        params.push(Value::Real(max));
    }

    match spec.sort_field {
        Some(field) => {
            let dir = match spec.sort_order.unwrap_or_default() {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY {} {}, s.Sno, sc.Cno",
                field.column(),
                dir
            ));
        }
        None => sql.push_str(" ORDER BY s.Sno, sc.Cno"),
    }

    Ok(BuiltQuery { sql, params })
}

pub fn search_enrollments(conn: &Connection, spec: &SearchSpec) -> StoreResult<Vec<EnrollmentRow>> {
    let built = build_search(spec)?;
    let mut stmt = conn.prepare(&built.sql)?;
    let rows = stmt
        .query_map(params_from_iter(built.params.iter()), |r| {
            Ok(EnrollmentRow {
                student_id: r.get::<_, String>(0)?.trim().to_string(),
                name: r.get::<_, String>(1)?.trim().to_string(),
                course_code: r.get::<_, String>(2)?.trim().to_string(),
                course_name: r.get::<_, String>(3)?.trim().to_string(),
                credit: r.get(4)?,
                grade: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!("search matched {} rows", rows.len());
    Ok(rows)
}
