use std::fmt::Write;

use crate::dashboard::{CourseReport, Roster};

pub fn build_report(generated_at: &str, report: &CourseReport, overview: &Roster) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Course Risk Report");
    let _ = writeln!(output, "Generated {generated_at}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");
    let _ = writeln!(
        output,
        "- {} students, {} at risk, {} critical",
        overview.totals.total_students, overview.totals.at_risk, overview.totals.critical
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Courses by High-Risk Share");

    if report.courses.is_empty() {
        let _ = writeln!(output, "No enrollments recorded.");
    } else {
        for course in report.courses.iter() {
            let _ = writeln!(
                output,
                "- {}: {} of {} high risk ({:.1}%)",
                course.course_name, course.high, course.total, course.high_pct
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Critical Students");

    if report.critical_list.is_empty() {
        let _ = writeln!(output, "No students in the high-risk bucket.");
    } else {
        for student in report.critical_list.iter() {
            let _ = writeln!(output, "- {} ({})", student.student_name, student.course_name);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Watch List");

    if overview.rows.is_empty() {
        let _ = writeln!(output, "No enrollments recorded.");
    } else {
        for row in overview.rows.iter() {
            let _ = writeln!(
                output,
                "- {} in {}: {} (attendance {:.1}%, grade {:.1})",
                row.student_name, row.course_name, row.risk_label, row.attendance_rate, row.current_grade
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Upcoming Events");

    if report.events.is_empty() {
        let _ = writeln!(output, "No events scheduled.");
    } else {
        for event in report.events.iter() {
            let _ = writeln!(
                output,
                "- {} on {} ({})",
                event.title, event.event_date, event.event_type
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dashboard::{course_report, instructor_overview};
    use crate::models::EnrollmentRow;

    fn enrollment(student: &str, course: &str, attendance: f64, grade: f64) -> EnrollmentRow {
        EnrollmentRow {
            enrollment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            student_name: student.to_string(),
            email: "student@example.edu".to_string(),
            course_id: Uuid::nil(),
            course_name: course.to_string(),
            course_code: "GEO1".to_string(),
            attendance_rate: Some(attendance),
            current_grade: Some(grade),
        }
    }

    #[test]
    fn report_lists_courses_and_critical_students() {
        let rows = vec![
            enrollment("Tarek Ayoub", "Geology", 40.0, 52.0),
            enrollment("Mira Chidiac", "Geology", 91.0, 84.0),
        ];
        let report = build_report(
            "2026-04-01 09:00",
            &course_report(&rows, &[]),
            &instructor_overview(&rows),
        );

        assert!(report.starts_with("# Course Risk Report"));
        assert!(report.contains("- 2 students, 0 at risk, 1 critical"));
        assert!(report.contains("- Geology: 1 of 2 high risk (50.0%)"));
        assert!(report.contains("- Tarek Ayoub (Geology)"));
        assert!(report.contains("- Tarek Ayoub in Geology: High (attendance 40.0%, grade 52.0)"));
        assert!(report.contains("No events scheduled."));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let report = build_report("2026-04-01 09:00", &course_report(&[], &[]), &instructor_overview(&[]));
        assert!(report.contains("No enrollments recorded."));
        assert!(report.contains("No students in the high-risk bucket."));
    }
}
