use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Pending,
    Completed,
    Submitted,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "Pending",
            AssignmentStatus::Completed => "Completed",
            AssignmentStatus::Submitted => "Submitted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(AssignmentStatus::Pending),
            "Completed" => Some(AssignmentStatus::Completed),
            "Submitted" => Some(AssignmentStatus::Submitted),
            _ => None,
        }
    }

    /// Completed and Submitted both count as done for completion-rate purposes.
    pub fn is_done(&self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Submitted)
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub user_key: String,
    pub title: String,
    pub subject: String,
    pub due_date: NaiveDate,
    pub status: AssignmentStatus,
    pub submitted_at: Option<NaiveDate>,
    pub grade: Option<String>,
    pub progress: Option<i32>,
}

impl Assignment {
    /// Grades arrive as free text from imports. Only decimal-free numeric
    /// values participate in scoring; anything else is excluded, never fatal.
    pub fn numeric_grade(&self) -> Option<i64> {
        let raw = self.grade.as_deref()?;
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub user_key: String,
    pub date: NaiveDate,
    pub subject: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RiskScorePoint {
    pub user_key: String,
    pub date: NaiveDate,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    RiskShift,
    RiskBandChange,
    GradeDecline,
    LateStreak,
    InterventionRequired,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::RiskShift => "risk_shift",
            AlertType::RiskBandChange => "risk_band_change",
            AlertType::GradeDecline => "grade_decline",
            AlertType::LateStreak => "late_streak",
            AlertType::InterventionRequired => "intervention_required",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "risk_shift" => Some(AlertType::RiskShift),
            "risk_band_change" => Some(AlertType::RiskBandChange),
            "grade_decline" => Some(AlertType::GradeDecline),
            "late_streak" => Some(AlertType::LateStreak),
            "intervention_required" => Some(AlertType::InterventionRequired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub student_email: String,
    pub date: NaiveDate,
    pub message: String,
    pub severity: Severity,
    pub read_by: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChecklistEntry {
    pub day: i32,
    pub date: NaiveDate,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct RecoveryTarget {
    pub id: Uuid,
    pub student_email: String,
    pub target_completion_pct: i32,
    pub target_days: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub required_completions: i32,
    pub achieved_completions: i32,
    pub checklist: Vec<ChecklistEntry>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InterventionLogEntry {
    pub id: Uuid,
    pub student_email: String,
    pub teacher_email: String,
    pub action: String,
    pub notes: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
