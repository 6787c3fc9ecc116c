use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing_subscriber::{fmt, EnvFilter};

mod accounts;
mod aggregate;
mod config;
mod dashboard;
mod db;
mod error;
mod invites;
mod models;
mod report;
mod risk;
mod routes;
mod server;
mod state;

use config::Config;
use models::RiskInput;
use risk::{LabelBands, RiskScorer, RiskWeights};

#[derive(Parser)]
#[command(name = "course-risk-tracker")]
#[command(about = "Course enrollment, grade and attendance tracker with dropout risk scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Grades,
    Attendance,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import grade or attendance rows from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score one student's dropout risk without touching the database
    Score {
        #[arg(long)]
        attendance: f64,
        #[arg(long)]
        grade: f64,
        #[arg(long)]
        assignments: f64,
        #[arg(long, default_value_t = 1)]
        difficulty: i32,
        #[arg(long, default_value_t = 0)]
        workload: i32,
        #[arg(long, default_value_t = 0)]
        financial: i32,
        #[arg(long, default_value_t = 0)]
        grade_drop: i32,
        /// JSON file with alternate factor weights
        #[arg(long)]
        weights: Option<PathBuf>,
    },
    /// List enrollments by instructor risk bucket
    Roster {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        risk: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// JSON file with alternate factor weights
        #[arg(long)]
        weights: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            attendance,
            grade,
            assignments,
            difficulty,
            workload,
            financial,
            grade_drop,
            weights,
        } => {
            let input = RiskInput {
                attendance,
                grade,
                assignments,
                difficulty,
                workload,
                financial,
                grade_drop,
            };
            input.validate()?;

            let weights = match weights {
                Some(path) => RiskWeights::from_json_file(&path)?,
                None => RiskWeights::default(),
            };
            let result = RiskScorer::new(weights, LabelBands::default()).score(&input);

            println!(
                "Risk {}% ({})",
                result.risk_percent,
                result.risk_label.as_str()
            );
            for reason in result.reasons {
                println!("- {reason}");
            }
        }
        Commands::Serve { port, weights } => {
            let mut config = Config::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            if weights.is_some() {
                config.weights_path = weights;
            }

            let state = state::AppState::new(config).await?;
            db::init_db(&state.pool).await?;
            server::start_server(state).await?;
        }
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let pool = connect().await?;
            let inserted = match kind {
                ImportKind::Grades => db::import_grades_csv(&pool, &csv).await?,
                ImportKind::Attendance => db::import_attendance_csv(&pool, &csv).await?,
            };
            println!("Inserted {inserted} rows from {}.", csv.display());
        }
        Commands::Roster { q, risk } => {
            let query = routes::RosterParams { q, risk }.into_query()?;
            let pool = connect().await?;
            let rows = db::fetch_enrollment_rows(&pool, None).await?;
            let roster = dashboard::instructor_roster(&rows, &query);

            if roster.rows.is_empty() {
                println!("No enrollments match.");
                return Ok(());
            }

            println!(
                "{} students, {} at risk, {} critical:",
                roster.totals.total_students, roster.totals.at_risk, roster.totals.critical
            );
            for row in roster.rows.iter() {
                println!(
                    "- [{}] {} ({}) in {}: attendance {:.1}%, grade {:.1}",
                    row.risk_label,
                    row.student_name,
                    row.email,
                    row.course_name,
                    row.attendance_rate,
                    row.current_grade
                );
            }
        }
        Commands::Report { out } => {
            let pool = connect().await?;
            let rows = db::fetch_enrollment_rows(&pool, None).await?;
            let events =
                db::upcoming_events(&pool, dashboard::UPCOMING_EVENTS_LIMIT as i64).await?;
            let report = report::build_report(
                &Utc::now().format("%Y-%m-%d %H:%M").to_string(),
                &dashboard::course_report(&rows, &events),
                &dashboard::instructor_overview(&rows),
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let config = Config::from_env()?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")
}
