use std::fmt::Write;

use chrono::NaiveDate;

use crate::forecast::Forecast;
use crate::models::{Alert, CompletionEvent, InterventionLogEntry, RecoveryTarget};
use crate::risk::{risk_band, RiskBreakdown};

pub fn build_report(
    student_email: &str,
    today: NaiveDate,
    breakdown: &RiskBreakdown,
    streak: i64,
    forecast: &Forecast,
    alerts: &[Alert],
    recovery: Option<&RecoveryTarget>,
    interventions: &[InterventionLogEntry],
    history: &[CompletionEvent],
) -> String {
    let mut output = String::new();
    let score = breakdown.total();
    let band = risk_band(score);

    let _ = writeln!(output, "# Student Early Warning Report");
    let _ = writeln!(output, "Generated for {} on {}", student_email, today);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk");
    let _ = writeln!(output, "- Score: {} ({})", score, band.label());
    let _ = writeln!(
        output,
        "- Factors: completion {:.0}, late {:.0}, grade {:.0}, engagement {:.0}, recovery {:.0}",
        breakdown.completion,
        breakdown.late,
        breakdown.grade,
        breakdown.engagement,
        breakdown.recovery
    );
    let _ = writeln!(output, "- Current streak: {} days", streak);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecast");
    match forecast.projected_grade {
        Some(grade) => {
            let _ = writeln!(output, "- Projected grade: {}", grade);
        }
        None => {
            let _ = writeln!(output, "- Projected grade: no graded work yet");
        }
    }
    let _ = writeln!(output, "- Fail risk: {}%", forecast.fail_risk_pct);
    let _ = writeln!(
        output,
        "- Late submission probability: {}%",
        forecast.late_probability_14_days
    );
    let _ = writeln!(output, "- Trend: {}", forecast.trend_direction);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recovery Plan");
    match recovery {
        None => {
            let _ = writeln!(output, "No active recovery plan.");
        }
        Some(target) => {
            let _ = writeln!(
                output,
                "Active {} to {}: {} of {} completion days achieved (target {}%).",
                target.start_date,
                target.end_date,
                target.achieved_completions,
                target.required_completions,
                target.target_completion_pct
            );
            for entry in &target.checklist {
                let _ = writeln!(
                    output,
                    "- [{}] day {} ({})",
                    if entry.done { "x" } else { " " },
                    entry.day,
                    entry.date
                );
            }
        }
    }

    let mut recent_alerts = alerts.to_vec();
    recent_alerts.sort_by(|a, b| b.date.cmp(&a.date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Alerts");

    if recent_alerts.is_empty() {
        let _ = writeln!(output, "No alerts on record.");
    } else {
        for alert in recent_alerts.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} [{}] {}",
                alert.date,
                alert.severity.as_str(),
                alert.message
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Teacher Interventions");

    if interventions.is_empty() {
        let _ = writeln!(output, "No interventions logged.");
    } else {
        for entry in interventions.iter().rev().take(5) {
            let _ = writeln!(
                output,
                "- {} {}: {}{}",
                entry.date,
                entry.teacher_email,
                entry.action,
                if entry.notes.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", entry.notes)
                }
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Completions");

    if history.is_empty() {
        let _ = writeln!(output, "No completions recorded.");
    } else {
        for event in history.iter().rev().take(5) {
            let _ = writeln!(output, "- {} {}: {}", event.date, event.subject, event.title);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::Trend;
    use crate::risk;

    #[test]
    fn report_covers_every_section() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let breakdown = risk::risk_breakdown(&[], 2, None, today);
        let forecast = Forecast {
            projected_grade: None,
            fail_risk_pct: 0,
            late_probability_14_days: 0,
            trend_direction: Trend::Stable,
        };
        let report = build_report(
            "sofia.novak@school.edu",
            today,
            &breakdown,
            2,
            &forecast,
            &[],
            None,
            &[],
            &[],
        );

        assert!(report.starts_with("# Student Early Warning Report"));
        assert!(report.contains("## Risk"));
        assert!(report.contains("Low Risk"));
        assert!(report.contains("## Forecast"));
        assert!(report.contains("no graded work yet"));
        assert!(report.contains("## Recovery Plan"));
        assert!(report.contains("No active recovery plan."));
        assert!(report.contains("## Recent Alerts"));
        assert!(report.contains("## Teacher Interventions"));
        assert!(report.contains("## Recent Completions"));
    }
}
