use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{ChecklistEntry, InterventionLogEntry, RecoveryTarget};

pub const DEFAULT_TARGET_PCT: i32 = 95;
pub const DEFAULT_TARGET_DAYS: i32 = 7;

/// Builds a time-boxed recovery plan starting today. Day 1 of the checklist
/// is today; the plan stays active through `end_date` and expires implicitly
/// once today moves past it.
pub fn build_recovery_target(
    student_email: &str,
    target_completion_pct: i32,
    days: i32,
    today: NaiveDate,
) -> RecoveryTarget {
    let days = days.max(1);
    let pct = target_completion_pct.clamp(0, 100);
    let checklist = (1..=days)
        .map(|day| ChecklistEntry {
            day,
            date: today + Duration::days(i64::from(day) - 1),
            done: false,
        })
        .collect();

    RecoveryTarget {
        id: Uuid::new_v4(),
        student_email: student_email.to_string(),
        target_completion_pct: pct,
        target_days: days,
        start_date: today,
        end_date: today + Duration::days(i64::from(days)),
        required_completions: required_completions(days, pct),
        achieved_completions: 0,
        checklist,
        created_at: Utc::now(),
    }
}

pub fn required_completions(days: i32, pct: i32) -> i32 {
    (f64::from(days) * f64::from(pct) / 100.0).ceil() as i32
}

/// The single shared Active predicate: status is never stored, only derived.
pub fn is_active(target: &RecoveryTarget, today: NaiveDate) -> bool {
    target.start_date <= today && today <= target.end_date
}

/// First active target in creation order. Overlapping targets are possible;
/// the earliest created one wins.
pub fn first_active<'a>(targets: &'a [RecoveryTarget], today: NaiveDate) -> Option<&'a RecoveryTarget> {
    targets.iter().find(|target| is_active(target, today))
}

/// Marks today's checklist entry done when at least one task was completed
/// today, and recomputes the achieved count. Returns whether anything
/// changed; the caller persists either way.
pub fn apply_daily_progress(
    target: &mut RecoveryTarget,
    completions_today: i64,
    today: NaiveDate,
) -> bool {
    if completions_today < 1 {
        return false;
    }
    let Some(entry) = target.checklist.iter_mut().find(|entry| entry.date == today) else {
        return false;
    };
    entry.done = true;
    target.achieved_completions = target.checklist.iter().filter(|entry| entry.done).count() as i32;
    true
}

pub fn build_intervention_log(
    student_email: &str,
    teacher_email: &str,
    action: &str,
    notes: &str,
    today: NaiveDate,
) -> InterventionLogEntry {
    InterventionLogEntry {
        id: Uuid::new_v4(),
        student_email: student_email.to_string(),
        teacher_email: teacher_email.to_string(),
        action: action.to_string(),
        notes: notes.to_string(),
        date: today,
        created_at: Utc::now(),
    }
}
