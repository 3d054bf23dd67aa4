use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod attendance;
mod db;
mod grades;
mod ingest;
mod logging;
mod models;
mod report;
mod snapshot;
mod status;
mod summary;

use models::Dataset;

#[derive(Parser)]
#[command(name = "academic-record")]
#[command(about = "Grade, attendance and status summaries for institute students", long_about = None)]
struct Cli {
    /// Read a JSON export of the document store instead of Postgres
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,
    /// Log at debug level unless ACADEMIC_RECORD_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo career with students, grades and attendance
    Seed,
    /// Import grade rows from a CSV file
    ImportGrades {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the dashboard summary for one student
    Summary {
        #[arg(long)]
        student: String,
        #[arg(long)]
        json: bool,
    },
    /// Rank students by weighted average
    Roster {
        #[arg(long)]
        career: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown academic record
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect(cli: &Cli) -> anyhow::Result<PgPool> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set unless --snapshot is given")?;

    PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_dataset(cli: &Cli, career: Option<&str>) -> anyhow::Result<Dataset> {
    let (dataset, report) = match &cli.snapshot {
        Some(path) => snapshot::load(path)?,
        None => {
            let pool = connect(cli).await?;
            db::load_dataset(&pool, career).await?
        }
    };

    if report.rejected > 0 {
        eprintln!("Skipped {} malformed documents.", report.rejected);
    }
    info!(
        accepted = report.accepted,
        rejected = report.rejected,
        dropped_fields = report.dropped_fields,
        "dataset ready"
    );
    Ok(dataset)
}

fn find_student<'a>(dataset: &'a Dataset, id: &str) -> anyhow::Result<&'a models::Student> {
    dataset
        .student(id)
        .with_context(|| format!("no student with id {id}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match &cli.command {
        Commands::InitDb => {
            let pool = connect(&cli).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&cli).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportGrades { csv } => {
            let pool = connect(&cli).await?;
            let imported = db::import_grades_csv(&pool, csv).await?;
            println!(
                "Inserted {} grades from {} ({} duplicates, {} rejected).",
                imported.inserted,
                csv.display(),
                imported.duplicates,
                imported.rejected
            );
        }
        Commands::Summary { student, json } => {
            let dataset = load_dataset(&cli, None).await?;
            let student = find_student(&dataset, student)?;
            let summary = summary::build_student_summary(&dataset, student);

            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!(
                "{} ({}), {}",
                summary.full_name,
                summary.student_id,
                summary.career_name.as_deref().unwrap_or("no career assigned")
            );
            println!("Recognitions: {}", summary.recognitions);
            if let Some(best) = &summary.best_in_progress {
                println!(
                    "Current module: {} at {}% attendance",
                    best.module_name, best.percentage
                );
            }

            println!("Modules:");
            for item in summary.modules.iter() {
                println!(
                    "- {} [{}] average {:.2}, attendance {}% ({}/{})",
                    item.module.name,
                    item.module.status,
                    item.grades.final_score,
                    item.attendance.percentage(),
                    item.attendance.attended,
                    item.attendance.total
                );
            }

            println!("Seminars:");
            for seminar in summary.seminars.iter() {
                println!("- {} [{}]", seminar.name, seminar.status);
            }
        }
        Commands::Roster {
            career,
            limit,
            json,
        } => {
            let dataset = load_dataset(&cli, career.as_deref()).await?;
            let entries = summary::roster(&dataset, career.as_deref());

            if *json {
                let shown: Vec<_> = entries.iter().take(*limit).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            println!("Students by weighted average:");
            for entry in entries.iter().take(*limit) {
                println!(
                    "- {} ({}) average {:.2}, attendance {}%, {} recognitions",
                    entry.full_name,
                    entry.student_id,
                    entry.average,
                    entry.attendance_percentage,
                    entry.recognitions
                );
            }
        }
        Commands::Report { student, out } => {
            let dataset = load_dataset(&cli, None).await?;
            let student = find_student(&dataset, student)?;
            let summary = summary::build_student_summary(&dataset, student);
            let report = report::build_report(&summary, chrono::Local::now().date_naive());
            std::fs::write(out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
