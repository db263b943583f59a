use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::{Assignment, AssignmentStatus, CompletionEvent};

const COMPLETION_WEIGHT: f64 = 0.30;
const LATE_WEIGHT: f64 = 0.20;
const GRADE_WEIGHT: f64 = 0.25;
const ENGAGEMENT_WEIGHT: f64 = 0.15;
const RECOVERY_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskBand {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskBand {
    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::Low => "Low Risk",
            RiskBand::Moderate => "Moderate Risk",
            RiskBand::High => "High Risk",
            RiskBand::Critical => "Critical Risk",
        }
    }
}

pub fn risk_band(score: i32) -> RiskBand {
    if score >= 80 {
        RiskBand::Low
    } else if score >= 60 {
        RiskBand::Moderate
    } else if score >= 40 {
        RiskBand::High
    } else {
        RiskBand::Critical
    }
}

/// Progress against the student's active recovery plan, if one exists.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryProgress {
    pub required: i32,
    pub achieved: i32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskBreakdown {
    pub completion: f64,
    pub late: f64,
    pub grade: f64,
    pub engagement: f64,
    pub recovery: f64,
}

impl RiskBreakdown {
    pub fn total(&self) -> i32 {
        let raw = self.completion * COMPLETION_WEIGHT
            + self.late * LATE_WEIGHT
            + self.grade * GRADE_WEIGHT
            + self.engagement * ENGAGEMENT_WEIGHT
            + self.recovery * RECOVERY_WEIGHT;
        raw.clamp(0.0, 100.0).round() as i32
    }
}

pub fn compute_risk_score(
    assignments: &[Assignment],
    streak: i64,
    recovery: Option<RecoveryProgress>,
    today: NaiveDate,
) -> i32 {
    risk_breakdown(assignments, streak, recovery, today).total()
}

pub fn risk_breakdown(
    assignments: &[Assignment],
    streak: i64,
    recovery: Option<RecoveryProgress>,
    today: NaiveDate,
) -> RiskBreakdown {
    let total = assignments.len();
    let completed = assignments.iter().filter(|a| a.status.is_done()).count();
    let completion = if total > 0 {
        (completed as f64 / total as f64 * 100.0).round()
    } else {
        100.0
    };

    // An unsubmitted Completed assignment is treated as submitted today.
    let submitted_late = assignments
        .iter()
        .filter(|a| {
            let submitted = a.submitted_at.or(match a.status {
                AssignmentStatus::Completed => Some(today),
                _ => None,
            });
            submitted.is_some_and(|s| s > a.due_date)
        })
        .count();
    let late_pct = if total > 0 {
        submitted_late as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let late = (100.0 - late_pct).max(0.0);

    let grades: Vec<i64> = assignments.iter().filter_map(|a| a.numeric_grade()).collect();
    let grade = match grades.len() {
        0 => 100.0,
        1 => (grades[0] as f64).min(100.0),
        _ => {
            // Overlapping windows: "older" is all-but-last sliced to its
            // last five, so short histories compare against themselves.
            let recent = &grades[grades.len().saturating_sub(5)..];
            let older_all = &grades[..grades.len() - 1];
            let older = &older_all[older_all.len().saturating_sub(5)..];
            let avg_recent = mean(recent);
            let avg_older = if older.is_empty() { avg_recent } else { mean(older) };
            (70.0 + (avg_recent - avg_older) * 2.0).clamp(0.0, 100.0)
        }
    };

    let engagement = (50.0 + streak as f64 * 5.0).min(100.0);

    let recovery_score = match recovery {
        Some(progress) if progress.required > 0 => {
            (progress.achieved as f64 / progress.required as f64 * 100.0)
                .round()
                .min(100.0)
        }
        _ => 100.0,
    };

    RiskBreakdown {
        completion,
        late,
        grade,
        engagement,
        recovery: recovery_score,
    }
}

/// Consecutive days ending today with at least one completion event.
pub fn current_streak(history: &[CompletionEvent], today: NaiveDate) -> i64 {
    let days: HashSet<NaiveDate> = history.iter().map(|event| event.date).collect();
    let mut streak = 0;
    let mut day = today;
    while days.contains(&day) {
        streak += 1;
        day = day - Duration::days(1);
    }
    streak
}

fn mean(values: &[i64]) -> f64 {
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn assignment(
        status: AssignmentStatus,
        due_offset: i64,
        submitted_offset: Option<i64>,
        grade: Option<&str>,
    ) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            user_key: "maya.chen@school.edu".to_string(),
            title: "Worksheet".to_string(),
            subject: "Math".to_string(),
            due_date: today() + Duration::days(due_offset),
            status,
            submitted_at: submitted_offset.map(|offset| today() + Duration::days(offset)),
            grade: grade.map(|g| g.to_string()),
            progress: None,
        }
    }

    fn event(day_offset: i64) -> CompletionEvent {
        CompletionEvent {
            user_key: "maya.chen@school.edu".to_string(),
            date: today() + Duration::days(day_offset),
            subject: "Math".to_string(),
            title: "Worksheet".to_string(),
        }
    }

    #[test]
    fn empty_inputs_assume_healthy() {
        let breakdown = risk_breakdown(&[], 0, None, today());
        assert_eq!(breakdown.completion, 100.0);
        assert_eq!(breakdown.late, 100.0);
        assert_eq!(breakdown.grade, 100.0);
        assert_eq!(breakdown.engagement, 50.0);
        assert_eq!(breakdown.recovery, 100.0);
        assert_eq!(breakdown.total(), 93);
    }

    #[test]
    fn single_overdue_pending_assignment_lands_in_moderate() {
        let assignments = vec![assignment(AssignmentStatus::Pending, -1, None, None)];
        let breakdown = risk_breakdown(&assignments, 0, None, today());
        assert_eq!(breakdown.completion, 0.0);
        assert_eq!(breakdown.late, 100.0);
        let score = breakdown.total();
        assert_eq!(score, 63);
        assert_eq!(risk_band(score), RiskBand::Moderate);
    }

    #[test]
    fn grade_slope_uses_overlapping_windows() {
        // Recent window [40, 70] vs older window [40]: slope 15, clamped at 100.
        let assignments = vec![
            assignment(AssignmentStatus::Completed, -5, Some(-5), Some("40")),
            assignment(AssignmentStatus::Completed, -2, Some(-2), Some("70")),
        ];
        let breakdown = risk_breakdown(&assignments, 0, None, today());
        assert_eq!(breakdown.grade, 100.0);
    }

    #[test]
    fn single_grade_caps_grade_factor() {
        let assignments = vec![assignment(AssignmentStatus::Completed, -2, Some(-2), Some("45"))];
        let breakdown = risk_breakdown(&assignments, 0, None, today());
        assert_eq!(breakdown.grade, 45.0);
    }

    #[test]
    fn malformed_grades_are_excluded() {
        let assignments = vec![
            assignment(AssignmentStatus::Completed, -4, Some(-4), Some("A+")),
            assignment(AssignmentStatus::Completed, -2, Some(-2), Some("85.5")),
        ];
        let breakdown = risk_breakdown(&assignments, 0, None, today());
        assert_eq!(breakdown.grade, 100.0);
    }

    #[test]
    fn late_submissions_lower_the_late_factor() {
        let assignments = vec![
            assignment(AssignmentStatus::Submitted, -5, Some(-3), None),
            assignment(AssignmentStatus::Submitted, -5, Some(-5), None),
        ];
        let breakdown = risk_breakdown(&assignments, 0, None, today());
        assert_eq!(breakdown.late, 50.0);
    }

    #[test]
    fn completed_without_submission_date_falls_back_to_today() {
        let assignments = vec![assignment(AssignmentStatus::Completed, -3, None, None)];
        let breakdown = risk_breakdown(&assignments, 0, None, today());
        assert_eq!(breakdown.late, 0.0);
    }

    #[test]
    fn engagement_grows_with_streak_and_caps() {
        let quiet = risk_breakdown(&[], 0, None, today());
        assert_eq!(quiet.engagement, 50.0);
        let steady = risk_breakdown(&[], 4, None, today());
        assert_eq!(steady.engagement, 70.0);
        let relentless = risk_breakdown(&[], 20, None, today());
        assert_eq!(relentless.engagement, 100.0);
    }

    #[test]
    fn recovery_factor_tracks_achieved_ratio() {
        let partial = risk_breakdown(
            &[],
            0,
            Some(RecoveryProgress { required: 7, achieved: 3 }),
            today(),
        );
        assert_eq!(partial.recovery, 43.0);
        let over = risk_breakdown(
            &[],
            0,
            Some(RecoveryProgress { required: 7, achieved: 10 }),
            today(),
        );
        assert_eq!(over.recovery, 100.0);
    }

    #[test]
    fn score_stays_in_range_across_input_grid() {
        let grades = ["0", "12", "55", "100"];
        for streak in [0, 3, 17, 60] {
            for count in 0..=grades.len() {
                let assignments: Vec<Assignment> = grades[..count]
                    .iter()
                    .enumerate()
                    .map(|(i, g)| {
                        assignment(AssignmentStatus::Completed, -(i as i64) - 1, Some(1), Some(g))
                    })
                    .collect();
                for recovery in [None, Some(RecoveryProgress { required: 7, achieved: 0 })] {
                    let score = compute_risk_score(&assignments, streak, recovery, today());
                    assert!((0..=100).contains(&score), "score {score} out of range");
                }
            }
        }
    }

    #[test]
    fn bands_partition_the_whole_range() {
        for score in 0..=100 {
            let band = risk_band(score);
            let expected = if score >= 80 {
                RiskBand::Low
            } else if score >= 60 {
                RiskBand::Moderate
            } else if score >= 40 {
                RiskBand::High
            } else {
                RiskBand::Critical
            };
            assert_eq!(band, expected, "score {score}");
        }
        assert_eq!(risk_band(80), RiskBand::Low);
        assert_eq!(risk_band(79), RiskBand::Moderate);
        assert_eq!(risk_band(60), RiskBand::Moderate);
        assert_eq!(risk_band(59), RiskBand::High);
        assert_eq!(risk_band(40), RiskBand::High);
        assert_eq!(risk_band(39), RiskBand::Critical);
    }

    #[test]
    fn streak_walks_back_from_today() {
        let history = vec![event(0), event(-1), event(-3)];
        assert_eq!(current_streak(&history, today()), 2);
    }

    #[test]
    fn streak_is_zero_without_a_completion_today() {
        let history = vec![event(-1), event(-2)];
        assert_eq!(current_streak(&history, today()), 0);
    }
}
