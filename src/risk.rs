use std::{cmp::Ordering, fs, path::Path};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{RiskAssessment, RiskInput, RiskLabel};

pub const MAX_REASONS: usize = 3;

/// Scored factors, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    Attendance,
    Grade,
    Assignments,
    Difficulty,
    Workload,
    Financial,
    GradeDrop,
}

impl Factor {
    pub const ALL: [Factor; 7] = [
        Factor::Attendance,
        Factor::Grade,
        Factor::Assignments,
        Factor::Difficulty,
        Factor::Workload,
        Factor::Financial,
        Factor::GradeDrop,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Factor::Attendance => "Low attendance",
            Factor::Grade => "Low grade",
            Factor::Assignments => "Missing assignments",
            Factor::Difficulty => "High course difficulty",
            Factor::Workload => "Workload shock",
            Factor::Financial => "Financial pressure",
            Factor::GradeDrop => "Recent grade drop",
        }
    }

    /// Normalized badness in [0, 1] for validated input. 0 is ideal.
    pub fn badness(&self, input: &RiskInput) -> f64 {
        match self {
            Factor::Attendance => shortfall(input.attendance),
            Factor::Grade => shortfall(input.grade),
            Factor::Assignments => shortfall(input.assignments),
            Factor::Difficulty => f64::from(input.difficulty - 1) / 3.0,
            Factor::Workload => f64::from(input.workload) / 2.0,
            Factor::Financial => f64::from(input.financial) / 2.0,
            Factor::GradeDrop => f64::from(input.grade_drop),
        }
    }
}

fn shortfall(percent: f64) -> f64 {
    ((100.0 - percent) / 100.0).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskWeights {
    pub attendance: f64,
    pub grade: f64,
    pub assignments: f64,
    pub difficulty: f64,
    pub workload: f64,
    pub financial: f64,
    pub grade_drop: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            attendance: 0.25,
            grade: 0.30,
            assignments: 0.20,
            difficulty: 0.10,
            workload: 0.07,
            financial: 0.06,
            grade_drop: 0.02,
        }
    }
}

impl RiskWeights {
    pub fn weight(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Attendance => self.attendance,
            Factor::Grade => self.grade,
            Factor::Assignments => self.assignments,
            Factor::Difficulty => self.difficulty,
            Factor::Workload => self.workload,
            Factor::Financial => self.financial,
            Factor::GradeDrop => self.grade_drop,
        }
    }

    pub fn total(&self) -> f64 {
        Factor::ALL.iter().map(|f| self.weight(*f)).sum()
    }

    /// Loads an alternate weighting from a JSON object with one key per factor.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read weights file {}", path.display()))?;
        let weights: RiskWeights = serde_json::from_str(&raw)
            .with_context(|| format!("invalid weights file {}", path.display()))?;

        for factor in Factor::ALL {
            let value = weights.weight(factor);
            if !value.is_finite() || value < 0.0 {
                bail!(
                    "weight for {} must be a non-negative number, got {value}",
                    factor.display_name()
                );
            }
        }

        let total = weights.total();
        if (total - 1.0).abs() > 1e-6 {
            warn!("Risk weights sum to {total:.3}, scores may not span 0-100");
        }

        Ok(weights)
    }
}

/// Percent cut-offs for the scorer's labels. Each bound is inclusive-low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelBands {
    pub medium_from: u8,
    pub high_from: u8,
}

impl Default for LabelBands {
    fn default() -> Self {
        Self {
            medium_from: 35,
            high_from: 70,
        }
    }
}

impl LabelBands {
    pub fn label(&self, risk_percent: u8) -> RiskLabel {
        if risk_percent < self.medium_from {
            RiskLabel::Low
        } else if risk_percent < self.high_from {
            RiskLabel::Medium
        } else {
            RiskLabel::High
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: RiskWeights,
    bands: LabelBands,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights, bands: LabelBands) -> Self {
        Self { weights, bands }
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    /// Weighted contribution of every factor, in declaration order.
    pub fn contributions(&self, input: &RiskInput) -> [(Factor, f64); 7] {
        Factor::ALL.map(|factor| (factor, self.weights.weight(factor) * factor.badness(input)))
    }

    /// Scores validated input.
    ///
    /// The percent is rounded half to even, so an exact 0.5 becomes 0 and 1.5 becomes 2.
    pub fn score(&self, input: &RiskInput) -> RiskAssessment {
        let contributions = self.contributions(input);
        let total: f64 = contributions.iter().map(|(_, c)| c).sum();
        let risk_percent = (total * 100.0).clamp(0.0, 100.0).round_ties_even() as u8;

        let mut drivers = contributions.to_vec();
        // stable: equal contributions keep declaration order
        drivers.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        let reasons = drivers
            .iter()
            .take(MAX_REASONS)
            .map(|(factor, _)| factor.display_name())
            .collect();

        RiskAssessment {
            risk_percent,
            risk_label: self.bands.label(risk_percent),
            reasons,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskBucket {
    #[serde(rename = "high")]
    High,
    #[serde(rename = "med")]
    Medium,
    #[serde(rename = "low")]
    Low,
}

impl RiskBucket {
    /// Sort key for dashboards: high first.
    pub fn rank(&self) -> u8 {
        match self {
            RiskBucket::High => 0,
            RiskBucket::Medium => 1,
            RiskBucket::Low => 2,
        }
    }

    pub fn class_key(&self) -> &'static str {
        match self {
            RiskBucket::High => "high",
            RiskBucket::Medium => "med",
            RiskBucket::Low => "low",
        }
    }

    pub fn from_class_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        [RiskBucket::High, RiskBucket::Medium, RiskBucket::Low]
            .into_iter()
            .find(|bucket| bucket.class_key() == key)
    }

    pub fn instructor_label(&self) -> &'static str {
        match self {
            RiskBucket::High => "High",
            RiskBucket::Medium => "Medium",
            RiskBucket::Low => "Low",
        }
    }

    pub fn standing_text(&self) -> &'static str {
        match self {
            RiskBucket::High => "High Risk",
            RiskBucket::Medium => "Moderate",
            RiskBucket::Low => "Low Risk",
        }
    }

    pub fn standing_class(&self) -> &'static str {
        match self {
            RiskBucket::High => "danger",
            RiskBucket::Medium => "warn",
            RiskBucket::Low => "good",
        }
    }
}

/// Strict lower bounds: a value below either one trips the tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketThresholds {
    pub attendance: f64,
    pub grade: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    pub high: BucketThresholds,
    pub medium: BucketThresholds,
}

impl BucketPolicy {
    /// Missing aggregates read as 0.0.
    pub fn classify(&self, attendance_rate: Option<f64>, current_grade: Option<f64>) -> RiskBucket {
        let attendance = attendance_rate.unwrap_or(0.0);
        let grade = current_grade.unwrap_or(0.0);

        if attendance < self.high.attendance || grade < self.high.grade {
            RiskBucket::High
        } else if attendance < self.medium.attendance || grade < self.medium.grade {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }
}

pub const INSTRUCTOR_BUCKETS: BucketPolicy = BucketPolicy {
    high: BucketThresholds {
        attendance: 60.0,
        grade: 55.0,
    },
    medium: BucketThresholds {
        attendance: 75.0,
        grade: 70.0,
    },
};

pub const STUDENT_STANDING: BucketPolicy = BucketPolicy {
    high: BucketThresholds {
        attendance: 70.0,
        grade: 65.0,
    },
    medium: BucketThresholds {
        attendance: 85.0,
        grade: 75.0,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(attendance: Option<f64>, grade: Option<f64>) -> (&'static str, &'static str) {
        let bucket = INSTRUCTOR_BUCKETS.classify(attendance, grade);
        (bucket.instructor_label(), bucket.class_key())
    }

    fn standing(attendance: Option<f64>, grade: Option<f64>) -> (&'static str, &'static str) {
        let bucket = STUDENT_STANDING.classify(attendance, grade);
        (bucket.standing_text(), bucket.standing_class())
    }

    fn best() -> RiskInput {
        RiskInput {
            attendance: 100.0,
            grade: 100.0,
            assignments: 100.0,
            difficulty: 1,
            workload: 0,
            financial: 0,
            grade_drop: 0,
        }
    }

    fn worst() -> RiskInput {
        RiskInput {
            attendance: 0.0,
            grade: 0.0,
            assignments: 0.0,
            difficulty: 4,
            workload: 2,
            financial: 2,
            grade_drop: 1,
        }
    }

    #[test]
    fn best_input_scores_zero() {
        let result = RiskScorer::default().score(&best());
        assert_eq!(result.risk_percent, 0);
        assert_eq!(result.risk_label, RiskLabel::Low);
    }

    #[test]
    fn worst_input_scores_hundred() {
        let result = RiskScorer::default().score(&worst());
        assert_eq!(result.risk_percent, 100);
        assert_eq!(result.risk_label, RiskLabel::High);
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!((RiskWeights::default().total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn typical_student_scores_medium() {
        let input = RiskInput {
            attendance: 60.0,
            grade: 50.0,
            assignments: 70.0,
            difficulty: 3,
            workload: 1,
            financial: 1,
            grade_drop: 1,
        };
        // .25*.4 + .30*.5 + .20*.3 + .10*(2/3) + .07*.5 + .06*.5 + .02 = 0.4617
        let result = RiskScorer::default().score(&input);
        assert_eq!(result.risk_percent, 46);
        assert_eq!(result.risk_label, RiskLabel::Medium);
        // difficulty (0.067) outranks missing assignments (0.06)
        assert_eq!(
            result.reasons,
            vec!["Low grade", "Low attendance", "High course difficulty"]
        );
    }

    #[test]
    fn exact_half_rounds_to_even() {
        // attendance 98 alone contributes exactly 0.5 percent
        let input = RiskInput {
            attendance: 98.0,
            ..best()
        };
        let result = RiskScorer::default().score(&input);
        assert_eq!(result.risk_percent, 0);
    }

    #[test]
    fn exact_halves_round_to_nearest_even() {
        let only_grade_drop = |weight: f64| RiskWeights {
            attendance: 0.0,
            grade: 0.0,
            assignments: 0.0,
            difficulty: 0.0,
            workload: 0.0,
            financial: 0.0,
            grade_drop: weight,
        };
        let input = RiskInput {
            grade_drop: 1,
            ..best()
        };

        // 1.5 rounds up, 2.5 rounds down
        let up = RiskScorer::new(only_grade_drop(0.015), LabelBands::default()).score(&input);
        assert_eq!(up.risk_percent, 2);
        let down = RiskScorer::new(only_grade_drop(0.025), LabelBands::default()).score(&input);
        assert_eq!(down.risk_percent, 2);
    }

    #[test]
    fn label_boundaries_are_inclusive_low() {
        let bands = LabelBands::default();
        assert_eq!(bands.label(0), RiskLabel::Low);
        assert_eq!(bands.label(34), RiskLabel::Low);
        assert_eq!(bands.label(35), RiskLabel::Medium);
        assert_eq!(bands.label(69), RiskLabel::Medium);
        assert_eq!(bands.label(70), RiskLabel::High);
        assert_eq!(bands.label(100), RiskLabel::High);
    }

    #[test]
    fn risk_never_drops_as_attendance_falls() {
        let scorer = RiskScorer::default();
        let mut previous = 0u8;
        for attendance in (0..=100).rev() {
            let input = RiskInput {
                attendance: f64::from(attendance),
                grade: 72.0,
                assignments: 85.0,
                difficulty: 2,
                workload: 1,
                financial: 0,
                grade_drop: 0,
            };
            let percent = scorer.score(&input).risk_percent;
            assert!(percent >= previous, "attendance {attendance}: {percent} < {previous}");
            previous = percent;
        }
    }

    #[test]
    fn reasons_are_ranked_and_bounded() {
        let scorer = RiskScorer::default();
        let names: Vec<&str> = Factor::ALL.iter().map(|f| f.display_name()).collect();
        let inputs = [
            best(),
            worst(),
            RiskInput {
                attendance: 90.0,
                grade: 95.0,
                assignments: 40.0,
                difficulty: 4,
                workload: 2,
                financial: 0,
                grade_drop: 1,
            },
        ];

        for input in inputs {
            let result = scorer.score(&input);
            assert!(result.reasons.len() <= MAX_REASONS);
            assert!(result.reasons.iter().all(|r| names.contains(r)));

            let contributions = scorer.contributions(&input);
            let weight_of = |reason: &str| {
                contributions
                    .iter()
                    .find(|(f, _)| f.display_name() == reason)
                    .map(|(_, c)| *c)
                    .unwrap()
            };
            for pair in result.reasons.windows(2) {
                assert!(weight_of(pair[0]) >= weight_of(pair[1]));
            }
        }
    }

    #[test]
    fn ties_keep_declaration_order() {
        let result = RiskScorer::default().score(&best());
        assert_eq!(
            result.reasons,
            vec!["Low attendance", "Low grade", "Missing assignments"]
        );
    }

    #[test]
    fn assignments_lead_when_only_assignments_are_missing() {
        let input = RiskInput {
            assignments: 0.0,
            workload: 2,
            ..best()
        };
        let result = RiskScorer::default().score(&input);
        assert_eq!(result.risk_percent, 27);
        assert_eq!(result.reasons[0], "Missing assignments");
        assert_eq!(result.reasons[1], "Workload shock");
    }

    #[test]
    fn injected_weights_replace_defaults() {
        let weights = RiskWeights {
            attendance: 1.0,
            grade: 0.0,
            assignments: 0.0,
            difficulty: 0.0,
            workload: 0.0,
            financial: 0.0,
            grade_drop: 0.0,
        };
        let scorer = RiskScorer::new(weights, LabelBands::default());
        let input = RiskInput {
            attendance: 25.0,
            ..worst()
        };
        let result = scorer.score(&input);
        assert_eq!(result.risk_percent, 75);
        assert_eq!(result.risk_label, RiskLabel::High);
        assert_eq!(result.reasons[0], "Low attendance");
    }

    #[test]
    fn weights_file_round_trips_and_rejects_negatives() {
        let dir = std::env::temp_dir().join(format!("risk-weights-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.json");
        fs::write(&good, serde_json::to_string(&RiskWeights::default()).unwrap()).unwrap();
        assert_eq!(RiskWeights::from_json_file(&good).unwrap(), RiskWeights::default());

        let bad = dir.join("bad.json");
        fs::write(
            &bad,
            r#"{"attendance":-0.1,"grade":0.3,"assignments":0.2,"difficulty":0.1,"workload":0.07,"financial":0.06,"grade_drop":0.02}"#,
        )
        .unwrap();
        assert!(RiskWeights::from_json_file(&bad).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn instructor_bucket_thresholds() {
        assert_eq!(bucket(Some(50.0), Some(90.0)), ("High", "high"));
        assert_eq!(bucket(Some(90.0), Some(54.9)), ("High", "high"));
        assert_eq!(bucket(Some(60.0), Some(55.0)), ("Medium", "med"));
        assert_eq!(bucket(Some(74.9), Some(95.0)), ("Medium", "med"));
        assert_eq!(bucket(Some(75.0), Some(70.0)), ("Low", "low"));
    }

    #[test]
    fn missing_aggregates_read_as_zero() {
        assert_eq!(bucket(None, None), ("High", "high"));
        assert_eq!(bucket(Some(95.0), None), ("High", "high"));
        assert_eq!(standing(None, Some(99.0)), ("High Risk", "danger"));
    }

    #[test]
    fn student_standing_thresholds() {
        assert_eq!(standing(Some(69.9), Some(90.0)), ("High Risk", "danger"));
        assert_eq!(standing(Some(90.0), Some(64.0)), ("High Risk", "danger"));
        assert_eq!(standing(Some(84.0), Some(90.0)), ("Moderate", "warn"));
        assert_eq!(standing(Some(85.0), Some(75.0)), ("Low Risk", "good"));
    }

    // instructor and student policies disagree on these
    #[test]
    fn instructor_and_student_policies_diverge() {
        let cases = [
            (Some(65.0), Some(90.0)),
            (Some(80.0), Some(90.0)),
            (Some(90.0), Some(60.0)),
        ];
        for (attendance, grade) in cases {
            let instructor = INSTRUCTOR_BUCKETS.classify(attendance, grade);
            let student = STUDENT_STANDING.classify(attendance, grade);
            assert_ne!(instructor, student, "{attendance:?}/{grade:?}");
        }
        assert_ne!(INSTRUCTOR_BUCKETS, STUDENT_STANDING);
    }

    #[test]
    fn class_keys_round_trip() {
        for bucket in [RiskBucket::High, RiskBucket::Medium, RiskBucket::Low] {
            assert_eq!(RiskBucket::from_class_key(bucket.class_key()), Some(bucket));
        }
        assert_eq!(RiskBucket::from_class_key("MED"), Some(RiskBucket::Medium));
        assert_eq!(RiskBucket::from_class_key("critical"), None);
    }
}
