use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::models::{
    Alert, AlertType, Assignment, AssignmentStatus, ChecklistEntry, CompletionEvent,
    InterventionLogEntry, RecoveryTarget, RiskScorePoint, Severity,
};

const HISTORY_CAP: i64 = 500;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Serializes the read-compute-write cycle for one user key. Held for the
/// rest of the surrounding transaction.
pub async fn lock_user(conn: &mut PgConnection, user_key: &str) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(user_key)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn seed(conn: &mut PgConnection) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();

    let assignments: Vec<(
        &str,
        &str,
        &str,
        &str,
        i64,
        AssignmentStatus,
        Option<i64>,
        Option<&str>,
        Option<i32>,
    )> = vec![
        (
            "seed-001",
            "maya.chen@school.edu",
            "Algebra problem set",
            "Math",
            -9,
            AssignmentStatus::Completed,
            Some(-9),
            Some("78"),
            None,
        ),
        (
            "seed-002",
            "maya.chen@school.edu",
            "Cell structure lab",
            "Biology",
            -6,
            AssignmentStatus::Submitted,
            Some(-6),
            Some("84"),
            None,
        ),
        (
            "seed-003",
            "maya.chen@school.edu",
            "Persuasive essay draft",
            "English",
            -2,
            AssignmentStatus::Completed,
            Some(-3),
            Some("88"),
            None,
        ),
        (
            "seed-004",
            "maya.chen@school.edu",
            "Geometry quiz prep",
            "Math",
            2,
            AssignmentStatus::Pending,
            None,
            None,
            None,
        ),
        (
            "seed-005",
            "liam.ortiz@school.edu",
            "Reading log week 3",
            "English",
            -12,
            AssignmentStatus::Completed,
            Some(-11),
            Some("72"),
            None,
        ),
        (
            "seed-006",
            "liam.ortiz@school.edu",
            "Titration lab report",
            "Chemistry",
            -8,
            AssignmentStatus::Completed,
            Some(-6),
            Some("55"),
            None,
        ),
        (
            "seed-007",
            "liam.ortiz@school.edu",
            "Problem set 4",
            "Math",
            -4,
            AssignmentStatus::Submitted,
            Some(-2),
            Some("41"),
            None,
        ),
        (
            "seed-008",
            "liam.ortiz@school.edu",
            "Midterm review sheet",
            "Math",
            -1,
            AssignmentStatus::Pending,
            None,
            None,
            None,
        ),
        (
            "seed-009",
            "sofia.novak@school.edu",
            "Map exercise",
            "Geography",
            -3,
            AssignmentStatus::Completed,
            Some(-3),
            Some("67"),
            None,
        ),
        (
            "seed-010",
            "sofia.novak@school.edu",
            "Vocabulary list 12",
            "Spanish",
            1,
            AssignmentStatus::Pending,
            None,
            None,
            Some(40),
        ),
        (
            "seed-011",
            "sofia.novak@school.edu",
            "Revolution timeline",
            "History",
            4,
            AssignmentStatus::Pending,
            None,
            None,
            None,
        ),
    ];

    for (source_key, user_key, title, subject, due_offset, status, submitted_offset, grade, progress) in
        assignments
    {
        sqlx::query(
            r#"
            INSERT INTO homework_early_warning.assignments
            (id, user_key, title, subject, due_date, status, submitted_at, grade, progress, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_key)
        .bind(title)
        .bind(subject)
        .bind(today + Duration::days(due_offset))
        .bind(status.as_str())
        .bind(submitted_offset.map(|offset| today + Duration::days(offset)))
        .bind(grade)
        .bind(progress)
        .execute(&mut *conn)
        .await?;
    }

    let completions = vec![
        (
            "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "maya.chen@school.edu",
            -2,
            "English",
            "Persuasive essay draft",
        ),
        (
            "16fd2706-8baf-433b-82eb-8c7fada847da",
            "maya.chen@school.edu",
            -1,
            "Biology",
            "Cell structure lab",
        ),
        (
            "6ecd8c99-4036-403d-bf84-cf8400f67836",
            "maya.chen@school.edu",
            0,
            "Math",
            "Algebra problem set",
        ),
        (
            "3f333df6-90a4-4fda-8dd3-9485d27cee36",
            "liam.ortiz@school.edu",
            -6,
            "Chemistry",
            "Titration lab report",
        ),
        (
            "fdda765f-fc57-5604-a269-52a7df8164ec",
            "liam.ortiz@school.edu",
            -2,
            "Math",
            "Problem set 4",
        ),
        (
            "d9428888-122b-11e1-b85c-61cd3cbb3210",
            "sofia.novak@school.edu",
            -3,
            "Geography",
            "Map exercise",
        ),
    ];

    for (id, user_key, day_offset, subject, title) in completions {
        sqlx::query(
            r#"
            INSERT INTO homework_early_warning.completion_history
            (id, user_key, completed_on, subject, title)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(user_key)
        .bind(today + Duration::days(day_offset))
        .bind(subject)
        .bind(title)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn fetch_assignments(
    conn: &mut PgConnection,
    user_key: &str,
) -> anyhow::Result<Vec<Assignment>> {
    let rows = sqlx::query(
        "SELECT id, user_key, title, subject, due_date, status, submitted_at, grade, progress \
         FROM homework_early_warning.assignments \
         WHERE user_key = $1 \
         ORDER BY due_date, created_at",
    )
    .bind(user_key)
    .fetch_all(conn)
    .await?;

    rows.iter().map(assignment_from_row).collect()
}

pub async fn complete_assignment(
    conn: &mut PgConnection,
    user_key: &str,
    assignment_id: Uuid,
    today: NaiveDate,
) -> anyhow::Result<Option<Assignment>> {
    let row = sqlx::query(
        "UPDATE homework_early_warning.assignments \
         SET status = 'Completed', submitted_at = $3 \
         WHERE id = $1 AND user_key = $2 \
         RETURNING id, user_key, title, subject, due_date, status, submitted_at, grade, progress",
    )
    .bind(assignment_id)
    .bind(user_key)
    .bind(today)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(assignment_from_row).transpose()
}

pub async fn import_csv(conn: &mut PgConnection, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_key: String,
        title: String,
        subject: String,
        due_date: NaiveDate,
        status: String,
        submitted_at: Option<NaiveDate>,
        grade: Option<String>,
        progress: Option<i32>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status = AssignmentStatus::parse(&row.status)
            .with_context(|| format!("unknown status {:?} for {:?}", row.status, row.title))?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO homework_early_warning.assignments
            (id, user_key, title, subject, due_date, status, submitted_at, grade, progress, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.user_key)
        .bind(&row.title)
        .bind(&row.subject)
        .bind(row.due_date)
        .bind(status.as_str())
        .bind(row.submitted_at)
        .bind(&row.grade)
        .bind(row.progress)
        .bind(source_key)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn append_completion(
    conn: &mut PgConnection,
    event: &CompletionEvent,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO homework_early_warning.completion_history \
         (id, user_key, completed_on, subject, title) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(&event.user_key)
    .bind(event.date)
    .bind(&event.subject)
    .bind(&event.title)
    .execute(&mut *conn)
    .await?;

    // The log is capped to the most recent entries per user.
    sqlx::query(
        "DELETE FROM homework_early_warning.completion_history \
         WHERE user_key = $1 AND id NOT IN ( \
             SELECT id FROM homework_early_warning.completion_history \
             WHERE user_key = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2)",
    )
    .bind(&event.user_key)
    .bind(HISTORY_CAP)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_completion_history(
    conn: &mut PgConnection,
    user_key: &str,
) -> anyhow::Result<Vec<CompletionEvent>> {
    let rows = sqlx::query(
        "SELECT user_key, completed_on, subject, title \
         FROM homework_early_warning.completion_history \
         WHERE user_key = $1 \
         ORDER BY created_at, id",
    )
    .bind(user_key)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CompletionEvent {
            user_key: row.get("user_key"),
            date: row.get("completed_on"),
            subject: row.get("subject"),
            title: row.get("title"),
        })
        .collect())
}

pub async fn count_completions_on(
    conn: &mut PgConnection,
    user_key: &str,
    date: NaiveDate,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS completions \
         FROM homework_early_warning.completion_history \
         WHERE user_key = $1 AND completed_on = $2",
    )
    .bind(user_key)
    .bind(date)
    .fetch_one(conn)
    .await?;

    Ok(row.get("completions"))
}

pub async fn upsert_risk_point(
    conn: &mut PgConnection,
    point: &RiskScorePoint,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO homework_early_warning.risk_history (user_key, scored_on, score)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_key, scored_on) DO UPDATE SET score = EXCLUDED.score
        "#,
    )
    .bind(&point.user_key)
    .bind(point.date)
    .bind(point.score)
    .execute(conn)
    .await?;

    Ok(())
}

/// The "previous risk" query: most recent persisted score strictly before
/// `date`, so a same-day recompute never compares against itself.
pub async fn most_recent_score_before(
    conn: &mut PgConnection,
    user_key: &str,
    date: NaiveDate,
) -> anyhow::Result<Option<i32>> {
    let row = sqlx::query(
        "SELECT score FROM homework_early_warning.risk_history \
         WHERE user_key = $1 AND scored_on < $2 \
         ORDER BY scored_on DESC \
         LIMIT 1",
    )
    .bind(user_key)
    .bind(date)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| r.get("score")))
}

pub async fn fetch_all_alerts(conn: &mut PgConnection) -> anyhow::Result<Vec<Alert>> {
    let rows = sqlx::query(
        "SELECT id, alert_type, student_email, raised_on, message, severity, read_by \
         FROM homework_early_warning.alerts \
         ORDER BY raised_on, created_at",
    )
    .fetch_all(conn)
    .await?;

    rows.iter().map(alert_from_row).collect()
}

pub async fn fetch_alerts_for_student(
    conn: &mut PgConnection,
    student_email: &str,
) -> anyhow::Result<Vec<Alert>> {
    let rows = sqlx::query(
        "SELECT id, alert_type, student_email, raised_on, message, severity, read_by \
         FROM homework_early_warning.alerts \
         WHERE student_email = $1 \
         ORDER BY raised_on, created_at",
    )
    .bind(student_email)
    .fetch_all(conn)
    .await?;

    rows.iter().map(alert_from_row).collect()
}

pub async fn insert_alerts(conn: &mut PgConnection, alerts: &[Alert]) -> anyhow::Result<()> {
    for alert in alerts {
        sqlx::query(
            "INSERT INTO homework_early_warning.alerts \
             (id, alert_type, student_email, raised_on, message, severity, read_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(alert.id)
        .bind(alert.alert_type.as_str())
        .bind(&alert.student_email)
        .bind(alert.date)
        .bind(&alert.message)
        .bind(alert.severity.as_str())
        .bind(&alert.read_by)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn mark_alert_read(
    conn: &mut PgConnection,
    alert_id: Uuid,
    user: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE homework_early_warning.alerts \
         SET read_by = array_append(read_by, $2) \
         WHERE id = $1",
    )
    .bind(alert_id)
    .bind(user)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_recovery_target(
    conn: &mut PgConnection,
    target: &RecoveryTarget,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO homework_early_warning.recovery_targets
        (id, student_email, target_completion_pct, target_days, start_date, end_date,
         required_completions, achieved_completions, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(target.id)
    .bind(&target.student_email)
    .bind(target.target_completion_pct)
    .bind(target.target_days)
    .bind(target.start_date)
    .bind(target.end_date)
    .bind(target.required_completions)
    .bind(target.achieved_completions)
    .bind(target.created_at)
    .execute(&mut *conn)
    .await?;

    for entry in &target.checklist {
        sqlx::query(
            "INSERT INTO homework_early_warning.recovery_checklist \
             (target_id, day, due_on, done) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(target.id)
        .bind(entry.day)
        .bind(entry.date)
        .bind(entry.done)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Targets in creation order, checklists attached. The store does not
/// prevent overlapping plans; callers pick with `recovery::first_active`.
pub async fn recovery_targets_for_student(
    conn: &mut PgConnection,
    student_email: &str,
) -> anyhow::Result<Vec<RecoveryTarget>> {
    let rows = sqlx::query(
        "SELECT id, student_email, target_completion_pct, target_days, start_date, end_date, \
                required_completions, achieved_completions, created_at \
         FROM homework_early_warning.recovery_targets \
         WHERE student_email = $1 \
         ORDER BY created_at, id",
    )
    .bind(student_email)
    .fetch_all(&mut *conn)
    .await?;

    let mut targets = Vec::new();
    for row in rows {
        let mut target = RecoveryTarget {
            id: row.get("id"),
            student_email: row.get("student_email"),
            target_completion_pct: row.get("target_completion_pct"),
            target_days: row.get("target_days"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
            required_completions: row.get("required_completions"),
            achieved_completions: row.get("achieved_completions"),
            checklist: Vec::new(),
            created_at: row.get("created_at"),
        };

        let entries = sqlx::query(
            "SELECT day, due_on, done \
             FROM homework_early_warning.recovery_checklist \
             WHERE target_id = $1 \
             ORDER BY day",
        )
        .bind(target.id)
        .fetch_all(&mut *conn)
        .await?;

        target.checklist = entries
            .into_iter()
            .map(|row| ChecklistEntry {
                day: row.get("day"),
                date: row.get("due_on"),
                done: row.get("done"),
            })
            .collect();

        targets.push(target);
    }

    Ok(targets)
}

pub async fn active_recovery_for_student(
    conn: &mut PgConnection,
    student_email: &str,
    today: NaiveDate,
) -> anyhow::Result<Option<RecoveryTarget>> {
    let targets = recovery_targets_for_student(conn, student_email).await?;
    Ok(crate::recovery::first_active(&targets, today).cloned())
}

pub async fn save_recovery_progress(
    conn: &mut PgConnection,
    target: &RecoveryTarget,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE homework_early_warning.recovery_targets \
         SET achieved_completions = $2 \
         WHERE id = $1",
    )
    .bind(target.id)
    .bind(target.achieved_completions)
    .execute(&mut *conn)
    .await?;

    for entry in &target.checklist {
        sqlx::query(
            "UPDATE homework_early_warning.recovery_checklist \
             SET done = $3 \
             WHERE target_id = $1 AND day = $2",
        )
        .bind(target.id)
        .bind(entry.day)
        .bind(entry.done)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn insert_intervention(
    conn: &mut PgConnection,
    entry: &InterventionLogEntry,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO homework_early_warning.intervention_log
        (id, student_email, teacher_email, action, notes, logged_on, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.student_email)
    .bind(&entry.teacher_email)
    .bind(&entry.action)
    .bind(&entry.notes)
    .bind(entry.date)
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_interventions_for_student(
    conn: &mut PgConnection,
    student_email: &str,
) -> anyhow::Result<Vec<InterventionLogEntry>> {
    let rows = sqlx::query(
        "SELECT id, student_email, teacher_email, action, notes, logged_on, created_at \
         FROM homework_early_warning.intervention_log \
         WHERE student_email = $1 \
         ORDER BY created_at, id",
    )
    .bind(student_email)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| InterventionLogEntry {
            id: row.get("id"),
            student_email: row.get("student_email"),
            teacher_email: row.get("teacher_email"),
            action: row.get("action"),
            notes: row.get("notes"),
            date: row.get("logged_on"),
            created_at: row.get("created_at"),
        })
        .collect())
}

fn assignment_from_row(row: &PgRow) -> anyhow::Result<Assignment> {
    let status: String = row.get("status");
    Ok(Assignment {
        id: row.get("id"),
        user_key: row.get("user_key"),
        title: row.get("title"),
        subject: row.get("subject"),
        due_date: row.get("due_date"),
        status: AssignmentStatus::parse(&status)
            .with_context(|| format!("unknown assignment status {status:?}"))?,
        submitted_at: row.get("submitted_at"),
        grade: row.get("grade"),
        progress: row.get("progress"),
    })
}

fn alert_from_row(row: &PgRow) -> anyhow::Result<Alert> {
    let alert_type: String = row.get("alert_type");
    let severity: String = row.get("severity");
    Ok(Alert {
        id: row.get("id"),
        alert_type: AlertType::parse(&alert_type)
            .with_context(|| format!("unknown alert type {alert_type:?}"))?,
        student_email: row.get("student_email"),
        date: row.get("raised_on"),
        message: row.get("message"),
        severity: Severity::parse(&severity)
            .with_context(|| format!("unknown severity {severity:?}"))?,
        read_by: row.get("read_by"),
    })
}
