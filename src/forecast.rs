use std::fmt;

use serde::Serialize;

use crate::models::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Upward,
    Downward,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Upward => "Upward",
            Trend::Downward => "Downward",
            Trend::Stable => "Stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub projected_grade: Option<i32>,
    pub fail_risk_pct: i32,
    /// Late ratio across the whole submission record. The field name keeps
    /// the 14-day label its consumers already rely on, but no trailing
    /// window is applied.
    pub late_probability_14_days: i32,
    pub trend_direction: Trend,
}

pub fn compute_forecast(assignments: &[Assignment]) -> Forecast {
    let grades: Vec<i64> = assignments
        .iter()
        .filter(|a| a.status.is_done())
        .filter_map(|a| a.numeric_grade())
        .collect();

    let mut projected_grade = None;
    let mut fail_risk = 0.0;
    if !grades.is_empty() {
        let recent = &grades[grades.len().saturating_sub(5)..];
        let avg = recent.iter().sum::<i64>() as f64 / recent.len() as f64;
        projected_grade = Some(avg.round() as i32);
        fail_risk = if avg < 50.0 {
            (50.0 + (50.0 - avg)).min(90.0)
        } else {
            (30.0 - avg).max(0.0)
        };
    }

    let trend_direction = if grades.len() >= 2 {
        let slope = grades[grades.len() - 1] - grades[grades.len() - 2];
        if slope > 2 {
            Trend::Upward
        } else if slope < -2 {
            Trend::Downward
        } else {
            Trend::Stable
        }
    } else {
        Trend::Stable
    };

    let done: Vec<&Assignment> = assignments.iter().filter(|a| a.status.is_done()).collect();
    let late = done
        .iter()
        .filter(|a| a.submitted_at.unwrap_or(a.due_date) > a.due_date)
        .count();
    let late_probability_14_days = if done.is_empty() {
        0
    } else {
        (late as f64 / done.len() as f64 * 100.0).round() as i32
    };

    Forecast {
        projected_grade,
        fail_risk_pct: fail_risk.round() as i32,
        late_probability_14_days,
        trend_direction,
    }
}
