use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Feature vector scored by [`crate::risk::RiskScorer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskInput {
    pub attendance: f64,
    pub grade: f64,
    pub assignments: f64,
    pub difficulty: i32,
    pub workload: i32,
    pub financial: i32,
    pub grade_drop: i32,
}

impl RiskInput {
    /// Rejects any field outside its declared range. The scorer assumes this has passed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("attendance", self.attendance, 0.0, 100.0)?;
        check_range("grade", self.grade, 0.0, 100.0)?;
        check_range("assignments", self.assignments, 0.0, 100.0)?;
        check_range("difficulty", f64::from(self.difficulty), 1.0, 4.0)?;
        check_range("workload", f64::from(self.workload), 0.0, 2.0)?;
        check_range("financial", f64::from(self.financial), 0.0, 2.0)?;
        check_range("grade_drop", f64::from(self.grade_drop), 0.0, 1.0)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "LOW",
            RiskLabel::Medium => "MEDIUM",
            RiskLabel::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk_percent: u8,
    pub risk_label: RiskLabel,
    pub reasons: Vec<&'static str>,
}

/// Cached summary fields of one enrollment. Always derived from the full entry history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnrollmentAggregate {
    pub current_grade: f64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeEntry {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub exam_name: String,
    pub score: f64,
    pub weight: f64,
    pub date_recorded: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(ValidationError::Unknown {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEntry {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            other => Err(ValidationError::Unknown {
                field: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Option<Role>,
    pub theme_preference: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// One enrollment joined with its student and course, as read by the dashboards.
#[derive(Debug, Clone)]
pub struct EnrollmentRow {
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    pub student_name: String,
    pub email: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub course_code: String,
    pub attendance_rate: Option<f64>,
    pub current_grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invite {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub student_email: String,
    pub course_id: Option<Uuid>,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(rename = "date")]
    pub event_date: NaiveDate,
    #[serde(rename = "type")]
    pub event_type: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EnrollOutcome {
    pub enrollment_id: Uuid,
    pub course_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeChange {
    pub grade: GradeEntry,
    pub aggregate: EnrollmentAggregate,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceChange {
    pub attendance: AttendanceEntry,
    pub aggregate: EnrollmentAggregate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    pub course_name: String,
    pub course_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGrade {
    pub exam_name: String,
    pub score: f64,
    pub weight: f64,
    #[serde(alias = "date")]
    pub date_recorded: NaiveDate,
}

impl NewGrade {
    /// Scores are not clamped; only non-finite values and negative weights are refused.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.exam_name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "exam_name" });
        }
        if !self.score.is_finite() {
            return Err(ValidationError::NotFinite { field: "score" });
        }
        if !self.weight.is_finite() {
            return Err(ValidationError::NotFinite { field: "weight" });
        }
        if self.weight < 0.0 {
            return Err(ValidationError::Negative { field: "weight" });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendance {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvite {
    pub instructor_id: Uuid,
    pub student_email: String,
    #[serde(default)]
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptInvite {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub event_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> RiskInput {
        RiskInput {
            attendance: 80.0,
            grade: 70.0,
            assignments: 90.0,
            difficulty: 2,
            workload: 1,
            financial: 0,
            grade_drop: 0,
        }
    }

    #[test]
    fn accepts_inclusive_bounds() {
        let input = RiskInput {
            attendance: 0.0,
            grade: 100.0,
            assignments: 100.0,
            difficulty: 4,
            workload: 2,
            financial: 2,
            grade_drop: 1,
        };
        assert!(input.validate().is_ok());
        assert!(valid_input().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut input = valid_input();
        input.difficulty = 0;
        match input.validate() {
            Err(ValidationError::OutOfRange { field, .. }) => assert_eq!(field, "difficulty"),
            other => panic!("expected difficulty rejection, got {other:?}"),
        }

        let mut input = valid_input();
        input.attendance = 100.5;
        assert!(input.validate().is_err());

        let mut input = valid_input();
        input.grade_drop = 2;
        assert!(input.validate().is_err());
    }

    #[test]
    fn rejects_nan_percentages() {
        let mut input = valid_input();
        input.grade = f64::NAN;
        assert!(input.validate().is_err());
    }

    #[test]
    fn risk_input_deserializes_from_json() {
        let input: RiskInput = serde_json::from_str(
            r#"{"attendance":90,"grade":82.5,"assignments":100,"difficulty":3,"workload":0,"financial":1,"grade_drop":1}"#,
        )
        .unwrap();
        assert_eq!(input.difficulty, 3);
        assert!((input.grade - 82.5).abs() < 1e-9);
    }

    #[test]
    fn status_and_role_parse_case_insensitively() {
        assert_eq!("Present".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Present);
        assert_eq!(" absent ".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Absent);
        assert!("late".parse::<AttendanceStatus>().is_err());
        assert_eq!("INSTRUCTOR".parse::<Role>().unwrap(), Role::Instructor);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn grade_validation_allows_unclamped_scores() {
        let grade = NewGrade {
            exam_name: "Bonus quiz".to_string(),
            score: 104.0,
            weight: 5.0,
            date_recorded: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        };
        assert!(grade.validate().is_ok());

        let negative = NewGrade {
            weight: -1.0,
            ..grade.clone()
        };
        assert!(negative.validate().is_err());

        let unnamed = NewGrade {
            exam_name: "  ".to_string(),
            ..grade
        };
        assert!(unnamed.validate().is_err());
    }
}
