//! Validated mutations and listings for students, courses and enrollments.
//!
//! Every function borrows the session connection and keeps no state of its
//! own; callers re-read listings after a mutation. Multi-statement changes
//! (key renames, cascading deletes, batched grade saves) run inside one
//! transaction and leave the database untouched on failure.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    required_text, round2, validate_course_number, validate_credit, validate_grade, Course, Enrollment,
    Student,
};
use crate::query::{like_contains, NumberInput};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

/// Runs `f` inside one transaction, committing on `Ok` and rolling back on
/// every `Err` path.
pub fn with_transaction<T>(
    conn: &Connection,
    operation: &'static str,
    f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
) -> StoreResult<T> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|source| StoreError::Transaction { operation, source })?;
    match f(&tx) {
        Ok(v) => {
            tx.commit().map_err(|source| {
                log::error!("{operation}: commit failed: {source}");
                StoreError::Transaction { operation, source }
            })?;
            Ok(v)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback() {
                log::error!("{operation}: rollback failed: {rb}");
            }
            log::error!("{operation} rolled back: {e}");
            Err(match e {
                StoreError::Db(source) => StoreError::Transaction { operation, source },
                other => other,
            })
        }
    }
}

pub(crate) fn student_exists(conn: &Connection, student_id: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM Student WHERE Sno = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn course_exists(conn: &Connection, course_code: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM Course WHERE Cno = ?", [course_code], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn enrollment_exists(
    conn: &Connection,
    student_id: &str,
    course_code: &str,
) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM Student_Score WHERE Sno = ? AND Cno = ?",
            (student_id, course_code),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Returns the key as stored, which may differ in case from `student_id`.
fn require_student(conn: &Connection, student_id: &str) -> StoreResult<String> {
    conn.query_row("SELECT Sno FROM Student WHERE Sno = ?", [student_id], |r| {
        r.get(0)
    })
    .optional()?
    .ok_or_else(|| StoreError::NotFound {
        entity: "student",
        key: student_id.to_string(),
    })
}

fn require_course(conn: &Connection, course_code: &str) -> StoreResult<String> {
    conn.query_row("SELECT Cno FROM Course WHERE Cno = ?", [course_code], |r| {
        r.get(0)
    })
    .optional()?
    .ok_or_else(|| StoreError::NotFound {
        entity: "course",
        key: course_code.to_string(),
    })
}

// ---------------------------------------------------------------- students

pub fn add_student(conn: &Connection, student_id: &str, name: &str) -> StoreResult<Student> {
    let student_id = required_text("studentId", student_id)?;
    let name = required_text("name", name)?;
    if student_exists(conn, &student_id)? {
        return Err(StoreError::DuplicateKey {
            entity: "student",
            key: student_id,
        });
    }
    conn.execute(
        "INSERT INTO Student(Sno, name) VALUES(?, ?)",
        (&student_id, &name),
    )?;
    log::info!("added student {student_id}");
    Ok(Student { student_id, name })
}

/// Changes a student's name and, when `new_id` differs, its key.
///
/// A key change inserts the new row, repoints every enrollment and then
/// deletes the old row, all in one transaction.
pub fn rename_student(
    conn: &Connection,
    old_id: &str,
    new_id: &str,
    name: &str,
) -> StoreResult<Student> {
    let old_id = required_text("studentId", old_id)?;
    let new_id = required_text("newStudentId", new_id)?;
    let name = required_text("name", name)?;
    let old_id = require_student(conn, &old_id)?;

    if new_id == old_id {
        conn.execute("UPDATE Student SET name = ? WHERE Sno = ?", (&name, &old_id))?;
        log::info!("updated student {old_id}");
        return Ok(Student {
            student_id: old_id,
            name,
        });
    }

    if new_id.eq_ignore_ascii_case(&old_id) {
        with_transaction(conn, "respell student", |tx| {
            tx.execute(
                "UPDATE Student_Score SET Sno = ? WHERE Sno = ?",
                (&new_id, &old_id),
            )?;
            tx.execute(
                "UPDATE Student SET Sno = ?, name = ? WHERE Sno = ?",
                (&new_id, &name, &old_id),
            )?;
            Ok(())
        })?;
        log::info!("respelled student {old_id} -> {new_id}");
        return Ok(Student {
            student_id: new_id,
            name,
        });
    }

    if student_exists(conn, &new_id)? {
        return Err(StoreError::DuplicateKey {
            entity: "student",
            key: new_id,
        });
    }

    let moved = with_transaction(conn, "rename student", |tx| {
        tx.execute(
            "INSERT INTO Student(Sno, name) VALUES(?, ?)",
            (&new_id, &name),
        )?;
        let moved = tx.execute(
            "UPDATE Student_Score SET Sno = ? WHERE Sno = ?",
            (&new_id, &old_id),
        )?;
        tx.execute("DELETE FROM Student WHERE Sno = ?", [&old_id])?;
        Ok(moved)
    })?;
    log::info!("renamed student {old_id} -> {new_id} ({moved} enrollments repointed)");
    Ok(Student {
        student_id: new_id,
        name,
    })
}

/// Deletes a student and all of its enrollments. Returns the number of
/// enrollments removed.
pub fn delete_student(conn: &Connection, student_id: &str) -> StoreResult<usize> {
    let student_id = required_text("studentId", student_id)?;
    require_student(conn, &student_id)?;
    let removed = with_transaction(conn, "delete student", |tx| {
        let removed = tx.execute("DELETE FROM Student_Score WHERE Sno = ?", [&student_id])?;
        tx.execute("DELETE FROM Student WHERE Sno = ?", [&student_id])?;
        Ok(removed)
    })?;
    log::info!("deleted student {student_id} ({removed} enrollments)");
    Ok(removed)
}

// ----------------------------------------------------------------- courses

pub fn add_course(
    conn: &Connection,
    course_code: &str,
    course_name: &str,
    credit: f64,
) -> StoreResult<Course> {
    let course_code = required_text("courseCode", course_code)?;
    validate_course_number(&course_code)?;
    let course_name = required_text("courseName", course_name)?;
    validate_credit(credit)?;
    if course_exists(conn, &course_code)? {
        return Err(StoreError::DuplicateKey {
            entity: "course",
            key: course_code,
        });
    }
    conn.execute(
        "INSERT INTO Course(Cno, course_name, Credit) VALUES(?, ?, ?)",
        (&course_code, &course_name, credit),
    )?;
    log::info!("added course {course_code}");
    Ok(Course {
        course_code,
        course_name,
        credit,
    })
}

/// Changes a course's name and credit and, when `new_code` differs, its key
/// (insert new, repoint enrollments, delete old; one transaction).
pub fn rename_course(
    conn: &Connection,
    old_code: &str,
    new_code: &str,
    course_name: &str,
    credit: f64,
) -> StoreResult<Course> {
    let old_code = required_text("courseCode", old_code)?;
    let new_code = required_text("newCourseCode", new_code)?;
    let course_name = required_text("courseName", course_name)?;
    validate_credit(credit)?;
    let old_code = require_course(conn, &old_code)?;

    if new_code == old_code {
        conn.execute(
            "UPDATE Course SET course_name = ?, Credit = ? WHERE Cno = ?",
            (&course_name, credit, &old_code),
        )?;
        log::info!("updated course {old_code}");
        return Ok(Course {
            course_code: old_code,
            course_name,
            credit,
        });
    }

    validate_course_number(&new_code)?;
    if new_code.eq_ignore_ascii_case(&old_code) {
        with_transaction(conn, "respell course", |tx| {
            tx.execute(
                "UPDATE Student_Score SET Cno = ? WHERE Cno = ?",
                (&new_code, &old_code),
            )?;
            tx.execute(
                "UPDATE Course SET Cno = ?, course_name = ?, Credit = ? WHERE Cno = ?",
                (&new_code, &course_name, credit, &old_code),
            )?;
            Ok(())
        })?;
        log::info!("respelled course {old_code} -> {new_code}");
        return Ok(Course {
            course_code: new_code,
            course_name,
            credit,
        });
    }

    if course_exists(conn, &new_code)? {
        return Err(StoreError::DuplicateKey {
            entity: "course",
            key: new_code,
        });
    }

    let moved = with_transaction(conn, "rename course", |tx| {
        tx.execute(
            "INSERT INTO Course(Cno, course_name, Credit) VALUES(?, ?, ?)",
            (&new_code, &course_name, credit),
        )?;
        let moved = tx.execute(
            "UPDATE Student_Score SET Cno = ? WHERE Cno = ?",
            (&new_code, &old_code),
        )?;
        tx.execute("DELETE FROM Course WHERE Cno = ?", [&old_code])?;
        Ok(moved)
    })?;
    log::info!("renamed course {old_code} -> {new_code} ({moved} enrollments repointed)");
    Ok(Course {
        course_code: new_code,
        course_name,
        credit,
    })
}

pub fn delete_course(conn: &Connection, course_code: &str) -> StoreResult<usize> {
    let course_code = required_text("courseCode", course_code)?;
    require_course(conn, &course_code)?;
    let removed = with_transaction(conn, "delete course", |tx| {
        let removed = tx.execute("DELETE FROM Student_Score WHERE Cno = ?", [&course_code])?;
        tx.execute("DELETE FROM Course WHERE Cno = ?", [&course_code])?;
        Ok(removed)
    })?;
    log::info!("deleted course {course_code} ({removed} enrollments)");
    Ok(removed)
}

// ------------------------------------------------------------- enrollments

pub fn add_enrollment(
    conn: &Connection,
    student_id: &str,
    course_code: &str,
    grade: f64,
) -> StoreResult<Enrollment> {
    let student_id = required_text("studentId", student_id)?;
    let course_code = required_text("courseCode", course_code)?;
    validate_grade(grade)?;
    let student_id = require_student(conn, &student_id)?;
    let course_code = require_course(conn, &course_code)?;
    if enrollment_exists(conn, &student_id, &course_code)? {
        return Err(StoreError::DuplicateKey {
            entity: "enrollment",
            key: format!("{student_id}/{course_code}"),
        });
    }
    conn.execute(
        "INSERT INTO Student_Score(Sno, Cno, Grade) VALUES(?, ?, ?)",
        (&student_id, &course_code, grade),
    )?;
    log::info!("added grade {grade} for {student_id}/{course_code}");
    Ok(Enrollment {
        student_id,
        course_code,
        grade,
    })
}

pub fn update_enrollment_grade(
    conn: &Connection,
    student_id: &str,
    course_code: &str,
    grade: f64,
) -> StoreResult<Enrollment> {
    let student_id = required_text("studentId", student_id)?;
    let course_code = required_text("courseCode", course_code)?;
    validate_grade(grade)?;
    let changed = conn.execute(
        "UPDATE Student_Score SET Grade = ? WHERE Sno = ? AND Cno = ?",
        (grade, &student_id, &course_code),
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "enrollment",
            key: format!("{student_id}/{course_code}"),
        });
    }
    log::info!("updated grade {grade} for {student_id}/{course_code}");
    Ok(Enrollment {
        student_id,
        course_code,
        grade,
    })
}

pub fn delete_enrollment(conn: &Connection, student_id: &str, course_code: &str) -> StoreResult<()> {
    let student_id = required_text("studentId", student_id)?;
    let course_code = required_text("courseCode", course_code)?;
    let removed = conn.execute(
        "DELETE FROM Student_Score WHERE Sno = ? AND Cno = ?",
        (&student_id, &course_code),
    )?;
    if removed == 0 {
        return Err(StoreError::NotFound {
            entity: "enrollment",
            key: format!("{student_id}/{course_code}"),
        });
    }
    log::info!("deleted grade for {student_id}/{course_code}");
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeChange {
    pub student_id: String,
    pub course_code: String,
    /// A JSON number or numeric text; resolved per row.
    pub grade: NumberInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRowError {
    pub index: usize,
    pub student_id: String,
    pub course_code: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub updated: usize,
    pub committed: bool,
    pub errors: Vec<BatchRowError>,
}

fn resolve_batch_grade(input: &NumberInput) -> StoreResult<f64> {
    let grade = input
        .resolve("grade")?
        .ok_or_else(|| StoreError::validation("grade", "grade must not be empty"))?;
    validate_grade(grade)?;
    Ok(grade)
}

/// Saves several edited grades in one transaction.
///
/// Unless `partial_commit` is set, a single bad row (a grade that is not a
/// number or out of range, or no enrollment for the pair) rolls back the
/// whole batch.
pub fn batch_update_grades(
    conn: &Connection,
    changes: &[GradeChange],
    partial_commit: bool,
) -> StoreResult<BatchOutcome> {
    let mut errors = Vec::new();
    let mut updated = 0usize;

    let tx = conn
        .unchecked_transaction()
        .map_err(|source| StoreError::Transaction {
            operation: "batch grade update",
            source,
        })?;

    for (index, change) in changes.iter().enumerate() {
        let student_id = change.student_id.trim();
        let course_code = change.course_code.trim();
        let grade = match resolve_batch_grade(&change.grade) {
            Ok(grade) => grade,
            Err(e) => {
                errors.push(BatchRowError {
                    index,
                    student_id: student_id.to_string(),
                    course_code: course_code.to_string(),
                    code: e.code(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        let changed = match tx.execute(
            "UPDATE Student_Score SET Grade = ? WHERE Sno = ? AND Cno = ?",
            (grade, student_id, course_code),
        ) {
            Ok(n) => n,
            Err(source) => {
                if let Err(rb) = tx.rollback() {
                    log::error!("batch grade update: rollback failed: {rb}");
                }
                log::error!("batch grade update rolled back at row {index}: {source}");
                return Err(StoreError::Transaction {
                    operation: "batch grade update",
                    source,
                });
            }
        };
        if changed == 0 {
            let e = StoreError::Integrity(format!("no enrollment for {student_id}/{course_code}"));
            errors.push(BatchRowError {
                index,
                student_id: student_id.to_string(),
                course_code: course_code.to_string(),
                code: e.code(),
                message: e.to_string(),
            });
            continue;
        }
        updated += 1;
    }

    if !errors.is_empty() && !partial_commit {
        tx.rollback().map_err(|source| StoreError::Transaction {
            operation: "batch grade update",
            source,
        })?;
        log::warn!(
            "batch grade update rejected: {} of {} rows failed",
            errors.len(),
            changes.len()
        );
        return Ok(BatchOutcome {
            updated: 0,
            committed: false,
            errors,
        });
    }

    tx.commit().map_err(|source| StoreError::Transaction {
        operation: "batch grade update",
        source,
    })?;
    log::info!("batch grade update saved {updated} rows");
    Ok(BatchOutcome {
        updated,
        committed: true,
        errors,
    })
}

// ---------------------------------------------------------------- listings

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub course_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRow {
    pub course_code: String,
    pub course_name: String,
    pub credit: f64,
    pub grade: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub student_id: String,
    pub name: String,
    pub grade: f64,
}

/// Grade spread of one course roster. Empty rosters have no extremes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStats {
    pub enrolled: usize,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
    pub average: Option<f64>,
}

/// Credit totals of one transcript. The weighted average is `None` when the
/// student's courses carry no credit at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptStats {
    pub course_count: usize,
    pub total_credit: f64,
    pub weighted_average: Option<f64>,
}

pub fn roster_stats(rows: &[RosterRow]) -> RosterStats {
    let grades = rows.iter().map(|r| r.grade);
    let highest = grades.clone().reduce(f64::max);
    let lowest = grades.clone().reduce(f64::min);
    let average = (!rows.is_empty()).then(|| round2(grades.sum::<f64>() / rows.len() as f64));
    RosterStats {
        enrolled: rows.len(),
        highest,
        lowest,
        average,
    }
}

pub fn transcript_stats(rows: &[TranscriptRow]) -> TranscriptStats {
    let total_credit: f64 = rows.iter().map(|r| r.credit).sum();
    let weighted: f64 = rows.iter().map(|r| r.credit * r.grade).sum();
    TranscriptStats {
        course_count: rows.len(),
        total_credit,
        weighted_average: (total_credit > 0.0).then(|| round2(weighted / total_credit)),
    }
}

pub fn list_students(conn: &Connection, query: Option<&str>) -> StoreResult<Vec<StudentSummary>> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_contains);
    let mut stmt = conn.prepare(
        "SELECT s.Sno, s.name, COUNT(sc.Cno)
         FROM Student s
         LEFT JOIN Student_Score sc ON s.Sno = sc.Sno
         WHERE ?1 IS NULL OR s.Sno LIKE ?1 ESCAPE '\\' OR s.name LIKE ?1 ESCAPE '\\'
         GROUP BY s.Sno, s.name
         ORDER BY s.Sno",
    )?;
    let rows = stmt
        .query_map([&pattern], |r| {
            Ok(StudentSummary {
                student_id: r.get::<_, String>(0)?.trim().to_string(),
                name: r.get::<_, String>(1)?.trim().to_string(),
                course_count: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_courses(conn: &Connection, query: Option<&str>) -> StoreResult<Vec<Course>> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_contains);
    let mut stmt = conn.prepare(
        "SELECT Cno, course_name, Credit
         FROM Course
         WHERE ?1 IS NULL OR Cno LIKE ?1 ESCAPE '\\' OR course_name LIKE ?1 ESCAPE '\\'
         ORDER BY Cno",
    )?;
    let rows = stmt
        .query_map([&pattern], |r| {
            Ok(Course {
                course_code: r.get::<_, String>(0)?.trim().to_string(),
                course_name: r.get::<_, String>(1)?.trim().to_string(),
                credit: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_enrollment(
    conn: &Connection,
    student_id: &str,
    course_code: &str,
) -> StoreResult<Option<Enrollment>> {
    let row = conn
        .query_row(
            "SELECT Sno, Cno, Grade FROM Student_Score WHERE Sno = ? AND Cno = ?",
            (student_id.trim(), course_code.trim()),
            |r| {
                Ok(Enrollment {
                    student_id: r.get::<_, String>(0)?.trim().to_string(),
                    course_code: r.get::<_, String>(1)?.trim().to_string(),
                    grade: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn student_transcript(conn: &Connection, student_id: &str) -> StoreResult<Vec<TranscriptRow>> {
    let student_id = required_text("studentId", student_id)?;
    require_student(conn, &student_id)?;
    let mut stmt = conn.prepare(
        "SELECT sc.Cno, c.course_name, c.Credit, sc.Grade
         FROM Student_Score sc
         JOIN Course c ON sc.Cno = c.Cno
         WHERE sc.Sno = ?
         ORDER BY sc.Cno",
    )?;
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(TranscriptRow {
                course_code: r.get::<_, String>(0)?.trim().to_string(),
                course_name: r.get::<_, String>(1)?.trim().to_string(),
                credit: r.get(2)?,
                grade: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn course_roster(conn: &Connection, course_code: &str) -> StoreResult<Vec<RosterRow>> {
    let course_code = required_text("courseCode", course_code)?;
    require_course(conn, &course_code)?;
    let mut stmt = conn.prepare(
        "SELECT s.Sno, s.name, sc.Grade
         FROM Student_Score sc
         JOIN Student s ON sc.Sno = s.Sno
         WHERE sc.Cno = ?
         ORDER BY sc.Grade DESC, s.Sno",
    )?;
    let rows = stmt
        .query_map([&course_code], |r| {
            Ok(RosterRow {
                student_id: r.get::<_, String>(0)?.trim().to_string(),
                name: r.get::<_, String>(1)?.trim().to_string(),
                grade: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) fn all_enrollments(conn: &Connection) -> Vec<Enrollment> {
    let mut stmt = conn
        .prepare("SELECT Sno, Cno, Grade FROM Student_Score ORDER BY Sno, Cno")
        .expect("prepare");
    stmt.query_map([], |r| {
        Ok(Enrollment {
            student_id: r.get(0)?,
            course_code: r.get(1)?,
            grade: r.get(2)?,
        })
    })
    .expect("query")
    .collect::<Result<Vec<_>, _>>()
    .expect("rows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seeded() -> Connection {
        let conn = open_in_memory().expect("db");
        add_student(&conn, "S001", "Alice").expect("alice");
        add_student(&conn, "S002", "Bob").expect("bob");
        add_course(&conn, "C001", "Math", 3.0).expect("math");
        add_course(&conn, "C002", "Physics", 4.0).expect("physics");
        add_enrollment(&conn, "S001", "C001", 88.0).expect("e1");
        add_enrollment(&conn, "S001", "C002", 75.0).expect("e2");
        add_enrollment(&conn, "S002", "C001", 91.5).expect("e3");
        conn
    }

    #[test]
    fn add_student_rejects_duplicate_and_trims_key() {
        let conn = seeded();
        let e = add_student(&conn, " S001 ", "Again").expect_err("dup");
        assert_eq!(e.code(), "duplicate_key");
        let s = add_student(&conn, "  S003\t", "Carol").expect("carol");
        assert_eq!(s.student_id, "S003");
    }

    #[test]
    fn course_rename_moves_every_enrollment() {
        let conn = seeded();
        let before = all_enrollments(&conn);

        rename_course(&conn, "C001", "M101", "Math", 3.0).expect("rename");

        assert!(!course_exists(&conn, "C001").expect("q"));
        let courses = list_courses(&conn, None).expect("courses");
        let m101 = courses
            .iter()
            .find(|c| c.course_code == "M101")
            .expect("new course");
        assert_eq!(m101.course_name, "Math");
        assert_eq!(m101.credit, 3.0);

        let mut expected: Vec<Enrollment> = before
            .into_iter()
            .map(|mut e| {
                if e.course_code == "C001" {
                    e.course_code = "M101".into();
                }
                e
            })
            .collect();
        expected.sort_by(|a, b| {
            (a.student_id.as_str(), a.course_code.as_str())
                .cmp(&(b.student_id.as_str(), b.course_code.as_str()))
        });
        assert_eq!(all_enrollments(&conn), expected);
    }

    #[test]
    fn course_rename_checks_pattern_uniqueness_and_old_key() {
        let conn = seeded();
        assert_eq!(
            rename_course(&conn, "C001", "CC01", "Math", 3.0)
                .expect_err("pattern")
                .code(),
            "validation_failed"
        );
        assert_eq!(
            rename_course(&conn, "C001", "C002", "Math", 3.0)
                .expect_err("dup")
                .code(),
            "duplicate_key"
        );
        assert_eq!(
            rename_course(&conn, "X999", "X998", "Ghost", 1.0)
                .expect_err("missing")
                .code(),
            "not_found"
        );
        // Same code only touches name/credit.
        let c = rename_course(&conn, "C001", "C001", "Calculus", 5.0).expect("edit");
        assert_eq!(c.course_name, "Calculus");
        assert_eq!(all_enrollments(&conn).len(), 3);
    }

    #[test]
    fn student_rename_moves_enrollments_and_rejects_taken_id() {
        let conn = seeded();
        assert_eq!(
            rename_student(&conn, "S001", "S002", "Alice")
                .expect_err("taken")
                .code(),
            "duplicate_key"
        );
        rename_student(&conn, "S001", "S100", "Alice B").expect("rename");
        assert!(!student_exists(&conn, "S001").expect("q"));
        let transcript = student_transcript(&conn, "S100").expect("transcript");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].grade, 88.0);
    }

    #[test]
    fn failed_rename_leaves_database_unchanged() {
        let conn = seeded();
        // Make the final DELETE fail so the insert and repoint must roll back.
        conn.execute_batch(
            "CREATE TRIGGER block_student_delete BEFORE DELETE ON Student
             BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
        )
        .expect("trigger");
        let before = all_enrollments(&conn);
        let e = rename_student(&conn, "S001", "S100", "Alice").expect_err("blocked");
        assert_eq!(e.code(), "db_tx_failed");
        assert!(student_exists(&conn, "S001").expect("q"));
        assert!(!student_exists(&conn, "S100").expect("q"));
        assert_eq!(all_enrollments(&conn), before);
    }

    #[test]
    fn delete_student_cascades_only_its_rows() {
        let conn = seeded();
        let removed = delete_student(&conn, "S001").expect("delete");
        assert_eq!(removed, 2);
        assert!(!student_exists(&conn, "S001").expect("q"));
        assert_eq!(
            all_enrollments(&conn),
            vec![Enrollment {
                student_id: "S002".into(),
                course_code: "C001".into(),
                grade: 91.5
            }]
        );
        assert_eq!(list_courses(&conn, None).expect("courses").len(), 2);
    }

    #[test]
    fn delete_course_cascades() {
        let conn = seeded();
        assert_eq!(delete_course(&conn, "C001").expect("delete"), 2);
        assert_eq!(all_enrollments(&conn).len(), 1);
        assert_eq!(
            delete_course(&conn, "C001").expect_err("gone").code(),
            "not_found"
        );
    }

    #[test]
    fn duplicate_enrollment_keeps_existing_grade() {
        let conn = seeded();
        let e = add_enrollment(&conn, "S001", "C001", 10.0).expect_err("dup");
        assert_eq!(e.code(), "duplicate_key");
        let row = get_enrollment(&conn, "S001", "C001").expect("q").expect("row");
        assert_eq!(row.grade, 88.0);
    }

    #[test]
    fn grade_bounds_apply_to_add_and_update() {
        let conn = seeded();
        add_student(&conn, "S003", "Carol").expect("carol");
        add_enrollment(&conn, "S003", "C001", 0.0).expect("zero");
        add_enrollment(&conn, "S003", "C002", 100.0).expect("hundred");
        assert!(update_enrollment_grade(&conn, "S003", "C001", -0.01).is_err());
        assert!(update_enrollment_grade(&conn, "S003", "C001", 100.01).is_err());
        assert!(add_enrollment(&conn, "S002", "C002", 100.01).is_err());
        update_enrollment_grade(&conn, "S003", "C001", 100.0).expect("update");
        assert_eq!(
            update_enrollment_grade(&conn, "S002", "C002", 50.0)
                .expect_err("missing")
                .code(),
            "not_found"
        );
    }

    #[test]
    fn add_enrollment_requires_existing_parents() {
        let conn = seeded();
        assert_eq!(
            add_enrollment(&conn, "S404", "C001", 50.0)
                .expect_err("student")
                .code(),
            "not_found"
        );
        assert_eq!(
            add_enrollment(&conn, "S001", "C404", 50.0)
                .expect_err("course")
                .code(),
            "not_found"
        );
    }

    #[test]
    fn batch_update_rolls_back_when_a_pair_is_missing() {
        let conn = open_in_memory().expect("db");
        add_student(&conn, "S001", "Alice").expect("alice");
        add_course(&conn, "C001", "Math", 3.0).expect("math");
        add_course(&conn, "C002", "Physics", 4.0).expect("physics");
        add_enrollment(&conn, "S001", "C001", 60.0).expect("e1");

        let changes = vec![
            GradeChange {
                student_id: "S001".into(),
                course_code: "C001".into(),
                grade: NumberInput::Number(95.0),
            },
            GradeChange {
                student_id: "S001".into(),
                course_code: "C002".into(),
                grade: NumberInput::Number(70.0),
            },
        ];
        let outcome = batch_update_grades(&conn, &changes, false).expect("batch");
        assert!(!outcome.committed);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 1);
        assert_eq!(outcome.errors[0].code, "integrity_violation");
        let row = get_enrollment(&conn, "S001", "C001").expect("q").expect("row");
        assert_eq!(row.grade, 60.0);

        let outcome = batch_update_grades(&conn, &changes, true).expect("partial");
        assert!(outcome.committed);
        assert_eq!(outcome.updated, 1);
        let row = get_enrollment(&conn, "S001", "C001").expect("q").expect("row");
        assert_eq!(row.grade, 95.0);
    }

    #[test]
    fn listings_filter_literally_and_count_courses() {
        let conn = seeded();
        add_student(&conn, "S_X", "Under_score").expect("odd");
        let all = list_students(&conn, None).expect("all");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].course_count, 2);
        let hits = list_students(&conn, Some("_")).expect("filtered");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].student_id, "S_X");
        assert_eq!(list_courses(&conn, Some("phys")).expect("c").len(), 1);

        let roster = course_roster(&conn, "C001").expect("roster");
        assert_eq!(roster[0].student_id, "S002");
        assert_eq!(roster[1].student_id, "S001");
    }

    #[test]
    fn batch_reports_non_numeric_grade_by_row() {
        let conn = seeded();
        let changes: Vec<GradeChange> = serde_json::from_value(serde_json::json!([
            { "studentId": "S001", "courseCode": "C001", "grade": 95 },
            { "studentId": "S001", "courseCode": "C002", "grade": "abc" },
            { "studentId": "S002", "courseCode": "C001", "grade": "93.5" },
        ]))
        .expect("changes");

        let outcome = batch_update_grades(&conn, &changes, false).expect("batch");
        assert!(!outcome.committed);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 1);
        assert_eq!(outcome.errors[0].code, "validation_failed");
        let row = get_enrollment(&conn, "S001", "C001").expect("q").expect("row");
        assert_eq!(row.grade, 88.0);

        let outcome = batch_update_grades(&conn, &changes, true).expect("partial");
        assert!(outcome.committed);
        assert_eq!(outcome.updated, 2);
        let row = get_enrollment(&conn, "S002", "C001").expect("q").expect("row");
        assert_eq!(row.grade, 93.5);
    }

    #[test]
    fn batch_failure_mid_write_rolls_back_earlier_rows() {
        let conn = seeded();
        conn.execute_batch(
            "CREATE TRIGGER block_c002_grades BEFORE UPDATE ON Student_Score
             WHEN NEW.Cno = 'C002'
             BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
        )
        .expect("trigger");
        let changes = vec![
            GradeChange {
                student_id: "S001".into(),
                course_code: "C001".into(),
                grade: NumberInput::Number(99.0),
            },
            GradeChange {
                student_id: "S001".into(),
                course_code: "C002".into(),
                grade: NumberInput::Number(50.0),
            },
        ];
        let e = batch_update_grades(&conn, &changes, true).expect_err("blocked");
        assert_eq!(e.code(), "db_tx_failed");
        let row = get_enrollment(&conn, "S001", "C001").expect("q").expect("row");
        assert_eq!(row.grade, 88.0);
    }

    #[test]
    fn roster_stats_cover_spread_and_empty_course() {
        let conn = seeded();
        let stats = roster_stats(&course_roster(&conn, "C001").expect("roster"));
        assert_eq!(
            stats,
            RosterStats {
                enrolled: 2,
                highest: Some(91.5),
                lowest: Some(88.0),
                average: Some(89.75),
            }
        );
        add_course(&conn, "C003", "Art", 1.0).expect("art");
        let empty = roster_stats(&course_roster(&conn, "C003").expect("roster"));
        assert_eq!(empty.enrolled, 0);
        assert_eq!(empty.highest, None);
        assert_eq!(empty.average, None);
    }

    #[test]
    fn transcript_stats_weight_by_credit() {
        let conn = seeded();
        let stats = transcript_stats(&student_transcript(&conn, "S001").expect("t"));
        assert_eq!(stats.course_count, 2);
        assert_eq!(stats.total_credit, 7.0);
        // (88 * 3 + 75 * 4) / 7 = 80.571...
        assert_eq!(stats.weighted_average, Some(80.57));

        add_student(&conn, "S003", "Carol").expect("carol");
        add_course(&conn, "C003", "Seminar", 0.0).expect("seminar");
        add_enrollment(&conn, "S003", "C003", 70.0).expect("e4");
        let stats = transcript_stats(&student_transcript(&conn, "S003").expect("t"));
        assert_eq!(stats.course_count, 1);
        assert_eq!(stats.total_credit, 0.0);
        assert_eq!(stats.weighted_average, None);
    }

    #[test]
    fn keys_compare_case_insensitively() {
        let conn = seeded();
        assert_eq!(
            add_course(&conn, "c001", "Again", 1.0).expect_err("dup").code(),
            "duplicate_key"
        );
        assert_eq!(
            add_student(&conn, "s001", "Again").expect_err("dup").code(),
            "duplicate_key"
        );
        assert_eq!(
            rename_course(&conn, "C002", "c001", "Physics", 4.0)
                .expect_err("taken")
                .code(),
            "duplicate_key"
        );

        add_student(&conn, "S003", "Carol").expect("carol");
        let e = add_enrollment(&conn, "s003", "c002", 64.0).expect("lower-case keys");
        assert_eq!((e.student_id.as_str(), e.course_code.as_str()), ("S003", "C002"));

        // A case-only rename respells the key and keeps its enrollments.
        let c = rename_course(&conn, "C001", "c001", "Math", 3.0).expect("respell");
        assert_eq!(c.course_code, "c001");
        assert_eq!(course_roster(&conn, "c001").expect("roster").len(), 2);
        assert!(all_enrollments(&conn)
            .iter()
            .all(|e| e.course_code != "C001"));
    }
}
