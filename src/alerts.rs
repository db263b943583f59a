use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Alert, AlertType, Assignment, Severity};
use crate::risk::{risk_band, RiskBand};

/// One evaluation's worth of signals for a single student.
pub struct TriggerContext<'a> {
    pub student_email: &'a str,
    pub current_risk: i32,
    pub previous_risk: Option<i32>,
    pub assignments: &'a [Assignment],
    pub grade_slope: Option<i64>,
}

/// Evaluates every trigger rule against `existing` and returns only the
/// alerts that are new today. The caller appends them to the store in one
/// persist step.
pub fn check_alert_triggers(
    existing: &[Alert],
    ctx: &TriggerContext,
    today: NaiveDate,
) -> Vec<Alert> {
    let mut new_alerts = Vec::new();

    if let Some(previous) = ctx.previous_risk {
        let drop = previous - ctx.current_risk;
        if drop >= 10 && !already_raised(existing, ctx.student_email, AlertType::RiskShift, today) {
            new_alerts.push(alert(
                AlertType::RiskShift,
                ctx.student_email,
                today,
                format!("Risk score dropped {drop} points"),
                Severity::High,
            ));
        }

        let prev_band = risk_band(previous);
        let curr_band = risk_band(ctx.current_risk);
        if prev_band != curr_band
            && !already_raised(existing, ctx.student_email, AlertType::RiskBandChange, today)
        {
            let severity = match curr_band {
                RiskBand::High | RiskBand::Critical => Severity::High,
                _ => Severity::Medium,
            };
            new_alerts.push(alert(
                AlertType::RiskBandChange,
                ctx.student_email,
                today,
                format!("Risk band changed: {} → {}", prev_band.label(), curr_band.label()),
                severity,
            ));
        }
    }

    if let Some(slope) = ctx.grade_slope {
        if slope <= -10
            && !already_raised(existing, ctx.student_email, AlertType::GradeDecline, today)
        {
            new_alerts.push(alert(
                AlertType::GradeDecline,
                ctx.student_email,
                today,
                format!("Grade trend declined {}%", slope.abs()),
                Severity::High,
            ));
        }
    }

    let streak = late_streak(ctx.assignments);
    if streak >= 3 && !already_raised(existing, ctx.student_email, AlertType::LateStreak, today) {
        new_alerts.push(alert(
            AlertType::LateStreak,
            ctx.student_email,
            today,
            format!("{streak} assignments submitted late in a row"),
            Severity::High,
        ));
    }

    new_alerts
}

/// Counts how many of the most recently completed assignments were handed
/// in late, scanning backward until the first on-time submission.
pub fn late_streak(assignments: &[Assignment]) -> usize {
    let mut done: Vec<&Assignment> = assignments.iter().filter(|a| a.status.is_done()).collect();
    done.sort_by_key(|a| a.submitted_at.unwrap_or(a.due_date));
    done.iter()
        .rev()
        .take_while(|a| a.submitted_at.unwrap_or(a.due_date) > a.due_date)
        .count()
}

pub fn alerts_for_student<'a>(alerts: &'a [Alert], student_email: &str) -> Vec<&'a Alert> {
    alerts
        .iter()
        .filter(|a| a.student_email == student_email)
        .collect()
}

pub fn alerts_for_linked_students<'a>(alerts: &'a [Alert], linked: &[String]) -> Vec<&'a Alert> {
    alerts
        .iter()
        .filter(|a| linked.contains(&a.student_email))
        .collect()
}

/// Unread alerts for a user: a student sees their own, a parent passes the
/// students linked to them.
pub fn unread_alerts_for_user<'a>(
    alerts: &'a [Alert],
    user: &str,
    linked: &[String],
) -> Vec<&'a Alert> {
    let scoped = if linked.is_empty() {
        alerts_for_student(alerts, user)
    } else {
        alerts_for_linked_students(alerts, linked)
    };
    scoped
        .into_iter()
        .filter(|a| !a.read_by.iter().any(|reader| reader == user))
        .collect()
}

fn alert(
    alert_type: AlertType,
    student_email: &str,
    date: NaiveDate,
    message: String,
    severity: Severity,
) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        alert_type,
        student_email: student_email.to_string(),
        date,
        message,
        severity,
        read_by: Vec::new(),
    }
}

fn already_raised(alerts: &[Alert], student: &str, kind: AlertType, date: NaiveDate) -> bool {
    alerts
        .iter()
        .any(|a| a.student_email == student && a.alert_type == kind && a.date == date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentStatus;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn ctx<'a>(current: i32, previous: Option<i32>, assignments: &'a [Assignment]) -> TriggerContext<'a> {
        TriggerContext {
            student_email: "liam.ortiz@school.edu",
            current_risk: current,
            previous_risk: previous,
            assignments,
            grade_slope: None,
        }
    }

    fn completed(due_offset: i64, submitted_offset: i64) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            user_key: "liam.ortiz@school.edu".to_string(),
            title: "Problem set".to_string(),
            subject: "Math".to_string(),
            due_date: today() + Duration::days(due_offset),
            status: AssignmentStatus::Completed,
            submitted_at: Some(today() + Duration::days(submitted_offset)),
            grade: None,
            progress: None,
        }
    }

    #[test]
    fn nine_point_drop_stays_quiet() {
        let raised = check_alert_triggers(&[], &ctx(61, Some(70), &[]), today());
        assert!(raised.is_empty());
    }

    #[test]
    fn ten_point_drop_fires_shift_but_not_band_change() {
        // 70 and 60 are both Moderate, so only the shift trigger fires.
        let raised = check_alert_triggers(&[], &ctx(60, Some(70), &[]), today());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::RiskShift);
        assert_eq!(raised[0].severity, Severity::High);
        assert_eq!(raised[0].message, "Risk score dropped 10 points");
    }

    #[test]
    fn band_change_alone_is_medium_when_landing_in_moderate() {
        let raised = check_alert_triggers(&[], &ctx(75, Some(82), &[]), today());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::RiskBandChange);
        assert_eq!(raised[0].severity, Severity::Medium);
        assert_eq!(raised[0].message, "Risk band changed: Low Risk → Moderate Risk");
    }

    #[test]
    fn falling_into_high_band_raises_both_alerts() {
        let raised = check_alert_triggers(&[], &ctx(55, Some(68), &[]), today());
        assert_eq!(raised.len(), 2);
        assert_eq!(raised[0].alert_type, AlertType::RiskShift);
        assert_eq!(raised[1].alert_type, AlertType::RiskBandChange);
        assert_eq!(raised[1].severity, Severity::High);
    }

    #[test]
    fn second_evaluation_same_day_is_deduplicated() {
        let context = ctx(55, Some(68), &[]);
        let first = check_alert_triggers(&[], &context, today());
        assert_eq!(first.len(), 2);
        let second = check_alert_triggers(&first, &context, today());
        assert!(second.is_empty());
    }

    #[test]
    fn grade_decline_threshold_is_minus_ten() {
        let assignments = [];
        let mut context = ctx(70, None, &assignments);
        context.grade_slope = Some(-9);
        assert!(check_alert_triggers(&[], &context, today()).is_empty());
        context.grade_slope = Some(-10);
        let raised = check_alert_triggers(&[], &context, today());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::GradeDecline);
        assert_eq!(raised[0].message, "Grade trend declined 10%");
    }

    #[test]
    fn late_streak_counts_trailing_late_submissions() {
        let assignments = vec![
            completed(-20, -20),
            completed(-15, -13),
            completed(-10, -8),
            completed(-5, -3),
        ];
        assert_eq!(late_streak(&assignments), 3);
        let raised = check_alert_triggers(&[], &ctx(70, None, &assignments), today());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::LateStreak);
        assert_eq!(raised[0].message, "3 assignments submitted late in a row");
    }

    #[test]
    fn on_time_submission_breaks_the_late_streak() {
        let assignments = vec![completed(-15, -13), completed(-10, -8), completed(-5, -5)];
        assert_eq!(late_streak(&assignments), 0);
    }

    #[test]
    fn two_late_submissions_are_not_enough() {
        let assignments = vec![completed(-10, -8), completed(-5, -3)];
        assert!(check_alert_triggers(&[], &ctx(70, None, &assignments), today()).is_empty());
    }

    #[test]
    fn unread_filtering_respects_read_by_and_parent_links() {
        let mut own = alert(
            AlertType::LateStreak,
            "liam.ortiz@school.edu",
            today(),
            "3 assignments submitted late in a row".to_string(),
            Severity::High,
        );
        let other = alert(
            AlertType::RiskShift,
            "maya.chen@school.edu",
            today(),
            "Risk score dropped 12 points".to_string(),
            Severity::High,
        );
        let store = vec![own.clone(), other.clone()];

        let student_view = unread_alerts_for_user(&store, "liam.ortiz@school.edu", &[]);
        assert_eq!(student_view.len(), 1);

        let linked = vec![
            "liam.ortiz@school.edu".to_string(),
            "maya.chen@school.edu".to_string(),
        ];
        let parent_view = unread_alerts_for_user(&store, "pat.ortiz@family.net", &linked);
        assert_eq!(parent_view.len(), 2);

        own.read_by.push("liam.ortiz@school.edu".to_string());
        let store = vec![own, other];
        let student_view = unread_alerts_for_user(&store, "liam.ortiz@school.edu", &[]);
        assert!(student_view.is_empty());
    }
}
