use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod alerts;
mod db;
mod forecast;
mod models;
mod recovery;
mod report;
mod risk;

use models::{CompletionEvent, RiskScorePoint};
use risk::RecoveryProgress;

#[derive(Parser)]
#[command(name = "homework-early-warning")]
#[command(about = "Student risk early warning engine for homework tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import assignments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Mark an assignment completed and log the completion
    Complete {
        #[arg(long)]
        email: String,
        #[arg(long)]
        assignment: Uuid,
    },
    /// Compute the current risk score for a student
    Score {
        #[arg(long)]
        email: String,
        #[arg(long)]
        json: bool,
    },
    /// Project near-term grade, fail risk and lateness for a student
    Forecast {
        #[arg(long)]
        email: String,
        #[arg(long)]
        json: bool,
    },
    /// Run the full evaluation cycle: score, persist, raise alerts
    Evaluate {
        #[arg(long)]
        email: String,
    },
    /// Manage time-boxed recovery plans
    Recovery {
        #[command(subcommand)]
        command: RecoveryCommands,
    },
    /// Record a teacher intervention
    Intervene {
        #[arg(long)]
        email: String,
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        action: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List alerts for a user (parents pass their linked students)
    Alerts {
        #[arg(long)]
        user: String,
        #[arg(long)]
        student: Vec<String>,
        #[arg(long)]
        unread: bool,
    },
    /// Acknowledge an alert for a user
    MarkRead {
        #[arg(long)]
        alert: Uuid,
        #[arg(long)]
        user: String,
    },
    /// Generate a markdown report for a student
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum RecoveryCommands {
    /// Start a recovery plan for a student
    Create {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = recovery::DEFAULT_TARGET_PCT)]
        target_pct: i32,
        #[arg(long, default_value_t = recovery::DEFAULT_TARGET_DAYS)]
        days: i32,
    },
    /// Show the active recovery plan for a student
    Show {
        #[arg(long)]
        email: String,
    },
}

#[derive(Serialize)]
struct ScoreOutput<'a> {
    score: i32,
    band: &'a str,
    streak: i64,
    breakdown: &'a risk::RiskBreakdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let mut conn = pool.acquire().await?;
            db::seed(&mut conn).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let mut conn = pool.acquire().await?;
            let inserted = db::import_csv(&mut conn, &csv).await?;
            println!("Inserted {inserted} assignments from {}.", csv.display());
        }
        Commands::Complete { email, assignment } => {
            let today = Utc::now().date_naive();
            let mut tx = pool.begin().await?;
            db::lock_user(&mut tx, &email).await?;

            let Some(done) = db::complete_assignment(&mut tx, &email, assignment, today).await?
            else {
                println!("No assignment {assignment} for {email}.");
                return Ok(());
            };

            db::append_completion(
                &mut tx,
                &CompletionEvent {
                    user_key: email.clone(),
                    date: today,
                    subject: done.subject.clone(),
                    title: done.title.clone(),
                },
            )
            .await?;

            let completions_today = db::count_completions_on(&mut tx, &email, today).await?;
            if let Some(mut target) =
                db::active_recovery_for_student(&mut tx, &email, today).await?
            {
                recovery::apply_daily_progress(&mut target, completions_today, today);
                db::save_recovery_progress(&mut tx, &target).await?;
            }

            tx.commit().await?;
            println!("Completed \"{}\" for {email}.", done.title);
        }
        Commands::Score { email, json } => {
            let today = Utc::now().date_naive();
            let mut conn = pool.acquire().await?;
            let assignments = db::fetch_assignments(&mut conn, &email).await?;
            let history = db::fetch_completion_history(&mut conn, &email).await?;
            let streak = risk::current_streak(&history, today);
            let target = db::active_recovery_for_student(&mut conn, &email, today).await?;
            let progress = target.as_ref().map(|t| RecoveryProgress {
                required: t.required_completions,
                achieved: t.achieved_completions,
            });
            let breakdown = risk::risk_breakdown(&assignments, streak, progress, today);
            let score = breakdown.total();
            let band = risk::risk_band(score);

            if json {
                let output = ScoreOutput {
                    score,
                    band: band.label(),
                    streak,
                    breakdown: &breakdown,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Risk score for {email}: {score} ({})", band.label());
                println!(
                    "- factors: completion {:.0}, late {:.0}, grade {:.0}, engagement {:.0}, recovery {:.0}",
                    breakdown.completion,
                    breakdown.late,
                    breakdown.grade,
                    breakdown.engagement,
                    breakdown.recovery
                );
                println!("- streak: {streak} days");
            }
        }
        Commands::Forecast { email, json } => {
            let mut conn = pool.acquire().await?;
            let assignments = db::fetch_assignments(&mut conn, &email).await?;
            let projection = forecast::compute_forecast(&assignments);

            if json {
                println!("{}", serde_json::to_string_pretty(&projection)?);
            } else {
                match projection.projected_grade {
                    Some(grade) => println!("Projected grade for {email}: {grade}"),
                    None => println!("No graded work for {email} yet."),
                }
                println!(
                    "- fail risk {}%, late probability {}%, trend {}",
                    projection.fail_risk_pct,
                    projection.late_probability_14_days,
                    projection.trend_direction
                );
            }
        }
        Commands::Evaluate { email } => {
            let today = Utc::now().date_naive();
            let mut tx = pool.begin().await?;
            db::lock_user(&mut tx, &email).await?;

            let assignments = db::fetch_assignments(&mut tx, &email).await?;
            let history = db::fetch_completion_history(&mut tx, &email).await?;
            let streak = risk::current_streak(&history, today);
            let target = db::active_recovery_for_student(&mut tx, &email, today).await?;
            let progress = target.as_ref().map(|t| RecoveryProgress {
                required: t.required_completions,
                achieved: t.achieved_completions,
            });
            let current = risk::compute_risk_score(&assignments, streak, progress, today);
            let projection = forecast::compute_forecast(&assignments);

            let previous = db::most_recent_score_before(&mut tx, &email, today).await?;
            db::upsert_risk_point(
                &mut tx,
                &RiskScorePoint {
                    user_key: email.clone(),
                    date: today,
                    score: current,
                },
            )
            .await?;

            let grade_slope = if projection.trend_direction == forecast::Trend::Downward {
                Some(-15)
            } else {
                None
            };
            let existing = db::fetch_alerts_for_student(&mut tx, &email).await?;
            let context = alerts::TriggerContext {
                student_email: &email,
                current_risk: current,
                previous_risk: previous,
                assignments: &assignments,
                grade_slope,
            };
            let new_alerts = alerts::check_alert_triggers(&existing, &context, today);
            db::insert_alerts(&mut tx, &new_alerts).await?;
            tx.commit().await?;

            println!(
                "Risk score for {email}: {current} ({})",
                risk::risk_band(current).label()
            );
            if let Some(previous) = previous {
                println!("Previous score: {previous}");
            }
            println!("Forecast trend: {}", projection.trend_direction);
            if new_alerts.is_empty() {
                println!("No new alerts.");
            } else {
                println!("New alerts:");
                for alert in &new_alerts {
                    println!("- [{}] {}", alert.severity.as_str(), alert.message);
                }
            }
        }
        Commands::Recovery { command } => match command {
            RecoveryCommands::Create {
                email,
                target_pct,
                days,
            } => {
                let today = Utc::now().date_naive();
                let mut conn = pool.acquire().await?;
                let target = recovery::build_recovery_target(&email, target_pct, days, today);
                db::insert_recovery_target(&mut conn, &target).await?;
                println!(
                    "Recovery plan for {email}: {} completion days needed by {}.",
                    target.required_completions, target.end_date
                );
            }
            RecoveryCommands::Show { email } => {
                let today = Utc::now().date_naive();
                let mut conn = pool.acquire().await?;
                match db::active_recovery_for_student(&mut conn, &email, today).await? {
                    None => println!("No active recovery plan for {email}."),
                    Some(target) => {
                        println!(
                            "Recovery plan for {email} ({} to {}):",
                            target.start_date, target.end_date
                        );
                        println!(
                            "- target {}% over {} days, {} of {} completion days achieved",
                            target.target_completion_pct,
                            target.target_days,
                            target.achieved_completions,
                            target.required_completions
                        );
                        for entry in &target.checklist {
                            println!(
                                "- [{}] day {} ({})",
                                if entry.done { "x" } else { " " },
                                entry.day,
                                entry.date
                            );
                        }
                    }
                }
            }
        },
        Commands::Intervene {
            email,
            teacher,
            action,
            notes,
        } => {
            let today = Utc::now().date_naive();
            let mut conn = pool.acquire().await?;
            let entry = recovery::build_intervention_log(&email, &teacher, &action, &notes, today);
            db::insert_intervention(&mut conn, &entry).await?;
            println!("Logged intervention for {email}.");
        }
        Commands::Alerts {
            user,
            student,
            unread,
        } => {
            let mut conn = pool.acquire().await?;
            let all = db::fetch_all_alerts(&mut conn).await?;
            let shown = if unread {
                alerts::unread_alerts_for_user(&all, &user, &student)
            } else if student.is_empty() {
                alerts::alerts_for_student(&all, &user)
            } else {
                alerts::alerts_for_linked_students(&all, &student)
            };

            if shown.is_empty() {
                println!("No alerts.");
                return Ok(());
            }
            for alert in shown {
                println!(
                    "- {} {} [{}] {} ({})",
                    alert.id,
                    alert.date,
                    alert.severity.as_str(),
                    alert.message,
                    alert.alert_type.as_str()
                );
            }
        }
        Commands::MarkRead { alert, user } => {
            let mut conn = pool.acquire().await?;
            if db::mark_alert_read(&mut conn, alert, &user).await? {
                println!("Alert {alert} acknowledged by {user}.");
            } else {
                println!("Alert {alert} not found.");
            }
        }
        Commands::Report { email, out } => {
            let today = Utc::now().date_naive();
            let mut conn = pool.acquire().await?;
            let assignments = db::fetch_assignments(&mut conn, &email).await?;
            let history = db::fetch_completion_history(&mut conn, &email).await?;
            let streak = risk::current_streak(&history, today);
            let target = db::active_recovery_for_student(&mut conn, &email, today).await?;
            let progress = target.as_ref().map(|t| RecoveryProgress {
                required: t.required_completions,
                achieved: t.achieved_completions,
            });
            let breakdown = risk::risk_breakdown(&assignments, streak, progress, today);
            let projection = forecast::compute_forecast(&assignments);
            let student_alerts = db::fetch_alerts_for_student(&mut conn, &email).await?;
            let interventions = db::fetch_interventions_for_student(&mut conn, &email).await?;

            let report = report::build_report(
                &email,
                today,
                &breakdown,
                streak,
                &projection,
                &student_alerts,
                target.as_ref(),
                &interventions,
                &history,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
