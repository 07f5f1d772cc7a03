use crate::error::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const GRADE_MIN: f64 = 0.0;
pub const GRADE_MAX: f64 = 100.0;

static COURSE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][0-9]{3}$").expect("course code regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_code: String,
    pub course_name: String,
    pub credit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: String,
    pub course_code: String,
    pub grade: f64,
}

/// One letter followed by exactly three ASCII digits, e.g. `C001`.
pub fn validate_course_number(code: &str) -> StoreResult<()> {
    if COURSE_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(StoreError::validation(
            "courseCode",
            format!("course code must be one letter followed by three digits (e.g. C001), got '{code}'"),
        ))
    }
}

pub fn validate_grade(grade: f64) -> StoreResult<()> {
    if grade.is_finite() && (GRADE_MIN..=GRADE_MAX).contains(&grade) {
        Ok(())
    } else {
        Err(StoreError::validation(
            "grade",
            format!("grade must be within {GRADE_MIN}-{GRADE_MAX}, got {grade}"),
        ))
    }
}

pub fn validate_credit(credit: f64) -> StoreResult<()> {
    if credit.is_finite() && credit >= 0.0 {
        Ok(())
    } else {
        Err(StoreError::validation(
            "credit",
            format!("credit must be >= 0, got {credit}"),
        ))
    }
}

/// Trims and rejects blank keys and names.
pub fn required_text(field: &str, value: &str) -> StoreResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(StoreError::validation(field, format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

/// Rounds to two decimal places, the precision averages are reported at.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
