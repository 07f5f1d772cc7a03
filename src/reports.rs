use crate::error::{StoreError, StoreResult};
use crate::model::round2;
use crate::query::{search_enrollments, EnrollmentRow, SearchSpec};
use crate::sheet::{check_writable, write_sheet, Cell};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportKind {
    Enrollments,
    Students,
    Courses,
}

impl ReportKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enrollments" => Some(Self::Enrollments),
            "students" => Some(Self::Students),
            "courses" => Some(Self::Courses),
            _ => None,
        }
    }

    pub fn headers(self) -> &'static [&'static str] {
        match self {
            Self::Enrollments => &[
                "student_id",
                "name",
                "course_code",
                "course_name",
                "credit",
                "grade",
            ],
            Self::Students => &["student_id", "name", "course_count", "average_grade"],
            Self::Courses => &[
                "course_code",
                "course_name",
                "credit",
                "enrolled",
                "average_grade",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportRow {
    pub student_id: String,
    pub name: String,
    pub course_count: i64,
    pub average_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReportRow {
    pub course_code: String,
    pub course_name: String,
    pub credit: f64,
    pub enrolled: i64,
    pub average_grade: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "camelCase")]
pub enum Report {
    Enrollments(Vec<EnrollmentRow>),
    Students(Vec<StudentReportRow>),
    Courses(Vec<CourseReportRow>),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Enrollments(_) => ReportKind::Enrollments,
            Self::Students(_) => ReportKind::Students,
            Self::Courses(_) => ReportKind::Courses,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Enrollments(r) => r.len(),
            Self::Students(r) => r.len(),
            Self::Courses(r) => r.len(),
        }
    }

    pub fn cells(&self) -> Vec<Vec<Cell>> {
        match self {
            Self::Enrollments(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Cell::Text(r.student_id.clone()),
                        Cell::Text(r.name.clone()),
                        Cell::Text(r.course_code.clone()),
                        Cell::Text(r.course_name.clone()),
                        Cell::Number(r.credit),
                        Cell::Number(r.grade),
                    ]
                })
                .collect(),
            Self::Students(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Cell::Text(r.student_id.clone()),
                        Cell::Text(r.name.clone()),
                        Cell::Number(r.course_count as f64),
                        Cell::Number(r.average_grade),
                    ]
                })
                .collect(),
            Self::Courses(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Cell::Text(r.course_code.clone()),
                        Cell::Text(r.course_name.clone()),
                        Cell::Number(r.credit),
                        Cell::Number(r.enrolled as f64),
                        Cell::Number(r.average_grade),
                    ]
                })
                .collect(),
        }
    }
}

fn student_summaries(conn: &Connection) -> StoreResult<Vec<StudentReportRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.Sno, s.name, COUNT(sc.Cno), AVG(sc.Grade)
         FROM Student s
         LEFT JOIN Student_Score sc ON sc.Sno = s.Sno
         GROUP BY s.Sno, s.name
         ORDER BY s.Sno",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let avg: Option<f64> = r.get(3)?;
            Ok(StudentReportRow {
                student_id: r.get::<_, String>(0)?.trim().to_string(),
                name: r.get::<_, String>(1)?.trim().to_string(),
                course_count: r.get(2)?,
                average_grade: avg.map(round2).unwrap_or(0.0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn course_summaries(conn: &Connection) -> StoreResult<Vec<CourseReportRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.Cno, c.course_name, c.Credit, COUNT(sc.Sno), AVG(sc.Grade)
         FROM Course c
         LEFT JOIN Student_Score sc ON sc.Cno = c.Cno
         GROUP BY c.Cno, c.course_name, c.Credit
         ORDER BY c.Cno",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let avg: Option<f64> = r.get(4)?;
            Ok(CourseReportRow {
                course_code: r.get::<_, String>(0)?.trim().to_string(),
                course_name: r.get::<_, String>(1)?.trim().to_string(),
                credit: r.get(2)?,
                enrolled: r.get(3)?,
                average_grade: avg.map(round2).unwrap_or(0.0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn build_report(conn: &Connection, kind: ReportKind) -> StoreResult<Report> {
    Ok(match kind {
        ReportKind::Enrollments => Report::Enrollments(search_enrollments(conn, &SearchSpec::default())?),
        ReportKind::Students => Report::Students(student_summaries(conn)?),
        ReportKind::Courses => Report::Courses(course_summaries(conn)?),
    })
}

/// Writes the report as CSV or `.xlsx` and returns the number of data rows.
pub fn export_report(conn: &Connection, kind: ReportKind, out_path: &Path) -> StoreResult<usize> {
    if out_path.as_os_str().is_empty() {
        return Err(StoreError::validation("outPath", "outPath must not be empty"));
    }
    check_writable(out_path)?;
    let report = build_report(conn, kind)?;
    write_sheet(out_path, kind.headers(), &report.cells())?;
    log::info!(
        "exported {} {:?} rows to {}",
        report.len(),
        kind,
        out_path.to_string_lossy()
    );
    Ok(report.len())
}
