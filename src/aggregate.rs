use crate::models::{AttendanceEntry, AttendanceStatus, EnrollmentAggregate, GradeEntry};

/// Weighted grade normalized to a 100-point scale, even when weights do not sum to 100.
///
/// Returns 0 when there are no entries or every weight is zero.
pub fn recompute_grade(entries: &[GradeEntry]) -> f64 {
    let total_weight: f64 = entries.iter().map(|g| g.weight).sum();
    if total_weight == 0.0 {
        return 0.0;
    }

    let weighted_sum: f64 = entries.iter().map(|g| g.score * (g.weight / 100.0)).sum();
    weighted_sum / (total_weight / 100.0)
}

/// Share of sessions marked present, as a percentage. 0 for an empty history.
pub fn recompute_attendance(entries: &[AttendanceEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }

    let present = entries
        .iter()
        .filter(|a| a.status == AttendanceStatus::Present)
        .count();
    present as f64 / entries.len() as f64 * 100.0
}

impl EnrollmentAggregate {
    pub fn refresh_grade(&mut self, entries: &[GradeEntry]) {
        self.current_grade = recompute_grade(entries);
    }

    pub fn refresh_attendance(&mut self, entries: &[AttendanceEntry]) {
        self.attendance_rate = recompute_attendance(entries);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;

    fn grade(score: f64, weight: f64) -> GradeEntry {
        GradeEntry {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::nil(),
            exam_name: "Midterm".to_string(),
            score,
            weight,
            date_recorded: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
        }
    }

    fn session(day: u32, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            status,
        }
    }

    #[test]
    fn empty_histories_yield_zero() {
        assert_eq!(recompute_grade(&[]), 0.0);
        assert_eq!(recompute_attendance(&[]), 0.0);
    }

    #[test]
    fn equal_weights_average_scores() {
        let grades = vec![grade(80.0, 50.0), grade(90.0, 50.0)];
        assert!((recompute_grade(&grades) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn partial_weights_normalize_to_hundred() {
        // only 30 of 100 points recorded so far
        let grades = vec![grade(70.0, 10.0), grade(90.0, 20.0)];
        let expected = (70.0 * 10.0 + 90.0 * 20.0) / 30.0;
        assert!((recompute_grade(&grades) - expected).abs() < 1e-9);
    }

    #[test]
    fn zero_total_weight_yields_zero() {
        let grades = vec![grade(95.0, 0.0), grade(40.0, 0.0)];
        assert_eq!(recompute_grade(&grades), 0.0);
    }

    #[test]
    fn scores_above_hundred_are_not_clamped() {
        let grades = vec![grade(110.0, 100.0)];
        assert!((recompute_grade(&grades) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn attendance_counts_present_sessions() {
        let sessions = vec![
            session(2, AttendanceStatus::Present),
            session(4, AttendanceStatus::Present),
            session(9, AttendanceStatus::Absent),
            session(11, AttendanceStatus::Present),
        ];
        assert!((recompute_attendance(&sessions) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let grades = vec![grade(62.5, 15.0), grade(88.0, 35.0), grade(71.0, 25.0)];
        let sessions = vec![
            session(3, AttendanceStatus::Absent),
            session(5, AttendanceStatus::Present),
            session(10, AttendanceStatus::Present),
        ];
        assert_eq!(recompute_grade(&grades), recompute_grade(&grades));
        assert_eq!(recompute_attendance(&sessions), recompute_attendance(&sessions));
    }

    #[test]
    fn refresh_tracks_edits_and_deletes() {
        let mut aggregate = EnrollmentAggregate::default();
        let mut grades = vec![grade(80.0, 50.0), grade(90.0, 50.0)];
        aggregate.refresh_grade(&grades);
        assert!((aggregate.current_grade - 85.0).abs() < 1e-9);

        grades[1].score = 60.0;
        aggregate.refresh_grade(&grades);
        assert!((aggregate.current_grade - 70.0).abs() < 1e-9);

        grades.clear();
        aggregate.refresh_grade(&grades);
        assert_eq!(aggregate.current_grade, 0.0);

        let mut sessions = vec![session(1, AttendanceStatus::Absent)];
        aggregate.refresh_attendance(&sessions);
        assert_eq!(aggregate.attendance_rate, 0.0);

        sessions.push(session(2, AttendanceStatus::Present));
        aggregate.refresh_attendance(&sessions);
        assert!((aggregate.attendance_rate - 50.0).abs() < 1e-9);
    }
}
