use std::{cmp::Ordering, collections::HashMap, collections::HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{CalendarEvent, EnrollmentRow};
use crate::risk::{RiskBucket, INSTRUCTOR_BUCKETS, STUDENT_STANDING};

pub const OVERVIEW_LIMIT: usize = 12;
pub const CRITICAL_LIMIT: usize = 8;
pub const UPCOMING_EVENTS_LIMIT: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct CourseCard {
    pub enrollment_id: Uuid,
    pub course_name: String,
    pub course_code: String,
    pub attendance: f64,
    pub grade: f64,
    pub icon: String,
    pub target_class: &'static str,
    pub target_text: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub total_courses: usize,
    pub overall_attendance: f64,
    pub courses: Vec<CourseCard>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskTotals {
    pub total_students: usize,
    pub at_risk: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterRow {
    pub student_name: String,
    pub email: String,
    pub course_name: String,
    pub attendance_rate: f64,
    pub current_grade: f64,
    pub risk_label: &'static str,
    pub risk_class: RiskBucket,
}

#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    pub totals: RiskTotals,
    pub rows: Vec<RosterRow>,
}

#[derive(Debug, Clone, Default)]
pub struct RosterQuery {
    pub q: Option<String>,
    pub risk: Option<RiskBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseRiskSummary {
    pub course_name: String,
    pub total: usize,
    pub high: usize,
    pub high_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriticalStudent {
    pub student_name: String,
    pub course_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseReport {
    pub courses: Vec<CourseRiskSummary>,
    pub critical_list: Vec<CriticalStudent>,
    pub events: Vec<CalendarEvent>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

fn course_icon(course_code: &str, course_name: &str) -> String {
    let source = if course_code.is_empty() {
        course_name
    } else {
        course_code
    };
    source.chars().take(2).collect::<String>().to_uppercase()
}

pub fn student_dashboard(rows: &[EnrollmentRow]) -> StudentDashboard {
    let total_courses = rows.len();
    let overall_attendance = if total_courses == 0 {
        0.0
    } else {
        rows.iter()
            .map(|r| r.attendance_rate.unwrap_or(0.0))
            .sum::<f64>()
            / total_courses as f64
    };

    let courses = rows
        .iter()
        .map(|row| {
            let standing = STUDENT_STANDING.classify(row.attendance_rate, row.current_grade);
            CourseCard {
                enrollment_id: row.enrollment_id,
                course_name: row.course_name.clone(),
                course_code: row.course_code.clone(),
                attendance: round1(row.attendance_rate.unwrap_or(0.0)),
                grade: round1(row.current_grade.unwrap_or(0.0)),
                icon: course_icon(&row.course_code, &row.course_name),
                target_class: standing.standing_class(),
                target_text: standing.standing_text(),
            }
        })
        .collect();

    StudentDashboard {
        total_courses,
        overall_attendance: round1(overall_attendance),
        courses,
    }
}

fn roster_row(row: &EnrollmentRow) -> RosterRow {
    let bucket = INSTRUCTOR_BUCKETS.classify(row.attendance_rate, row.current_grade);
    RosterRow {
        student_name: row.student_name.trim().to_string(),
        email: row.email.clone(),
        course_name: row.course_name.clone(),
        attendance_rate: row.attendance_rate.unwrap_or(0.0),
        current_grade: row.current_grade.unwrap_or(0.0),
        risk_label: bucket.instructor_label(),
        risk_class: bucket,
    }
}

/// Totals span every enrollment: distinct students, medium-bucket count, high-bucket count.
pub fn risk_totals(rows: &[EnrollmentRow]) -> RiskTotals {
    let mut students = HashSet::new();
    let mut totals = RiskTotals::default();

    for row in rows {
        students.insert(row.user_id);
        match INSTRUCTOR_BUCKETS.classify(row.attendance_rate, row.current_grade) {
            RiskBucket::Medium => totals.at_risk += 1,
            RiskBucket::High => totals.critical += 1,
            RiskBucket::Low => {}
        }
    }

    totals.total_students = students.len();
    totals
}

/// Riskiest enrollments first, then lowest attendance, then lowest grade.
pub fn instructor_overview(rows: &[EnrollmentRow]) -> Roster {
    let mut overview: Vec<RosterRow> = rows.iter().map(roster_row).collect();
    overview.sort_by(|a, b| {
        a.risk_class
            .rank()
            .cmp(&b.risk_class.rank())
            .then_with(|| {
                a.attendance_rate
                    .partial_cmp(&b.attendance_rate)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                a.current_grade
                    .partial_cmp(&b.current_grade)
                    .unwrap_or(Ordering::Equal)
            })
    });
    overview.truncate(OVERVIEW_LIMIT);

    Roster {
        totals: risk_totals(rows),
        rows: overview,
    }
}

pub fn instructor_roster(rows: &[EnrollmentRow], query: &RosterQuery) -> Roster {
    let needle = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    let mut filtered: Vec<RosterRow> = rows
        .iter()
        .map(roster_row)
        .filter(|row| match &needle {
            Some(needle) => format!("{} {}", row.student_name, row.email)
                .to_lowercase()
                .contains(needle.as_str()),
            None => true,
        })
        .filter(|row| query.risk.map_or(true, |risk| risk == row.risk_class))
        .collect();

    filtered.sort_by(|a, b| {
        a.risk_class
            .rank()
            .cmp(&b.risk_class.rank())
            .then_with(|| a.student_name.cmp(&b.student_name))
    });

    Roster {
        totals: risk_totals(rows),
        rows: filtered,
    }
}

pub fn course_report(rows: &[EnrollmentRow], events: &[CalendarEvent]) -> CourseReport {
    let mut by_course: HashMap<Uuid, CourseRiskSummary> = HashMap::new();
    let mut critical_list = Vec::new();

    for row in rows {
        let bucket = INSTRUCTOR_BUCKETS.classify(row.attendance_rate, row.current_grade);
        let entry = by_course
            .entry(row.course_id)
            .or_insert_with(|| CourseRiskSummary {
                course_name: row.course_name.clone(),
                total: 0,
                high: 0,
                high_pct: 0.0,
            });
        entry.total += 1;

        if bucket == RiskBucket::High {
            entry.high += 1;
            critical_list.push(CriticalStudent {
                student_name: row.student_name.trim().to_string(),
                course_name: row.course_name.clone(),
            });
        }
    }

    let mut courses: Vec<CourseRiskSummary> = by_course
        .into_values()
        .map(|mut summary| {
            summary.high_pct = summary.high as f64 / summary.total.max(1) as f64 * 100.0;
            summary
        })
        .collect();
    courses.sort_by(|a, b| {
        b.high_pct
            .partial_cmp(&a.high_pct)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.high.cmp(&a.high))
            .then_with(|| a.course_name.cmp(&b.course_name))
    });
    critical_list.truncate(CRITICAL_LIMIT);

    let mut events = events.to_vec();
    events.sort_by(|a, b| a.event_date.cmp(&b.event_date));
    events.truncate(UPCOMING_EVENTS_LIMIT);

    CourseReport {
        courses,
        critical_list,
        events,
    }
}
