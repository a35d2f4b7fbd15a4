use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod analytics;
mod compare;
mod config;
mod db;
mod extract;
mod models;
mod pulse;
mod report;
mod resolver;
mod sheet;
mod store;
mod text;

use crate::config::Settings;
use crate::db::PgStore;
use crate::pulse::Pulse;
use crate::sheet::CsvSheet;
use crate::store::{Backend, RowStore};

#[derive(Parser)]
#[command(name = "campus-pulse")]
#[command(
    about = "Weekend attendance logging and analytics across church campuses",
    long_about = None
)]
struct Cli {
    /// Campus and trigger configuration (TOML)
    #[arg(long, global = true, env = "PULSE_CONFIG")]
    config: Option<PathBuf>,
    /// Store rows in a CSV sheet instead of Postgres
    #[arg(long, global = true, env = "PULSE_SHEET")]
    sheet: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the row store
    InitDb,
    /// Load a few weeks of realistic history
    Seed,
    /// Import rows from a sheet export
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a spoken or typed stat report
    Submit {
        text: String,
        /// Campus to record against, skipping detection
        #[arg(long)]
        campus: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Answer a question about the recorded history
    Ask {
        question: String,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown campus review
    Report {
        #[arg(long)]
        campus: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, default_value = "review.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let directory = settings.directory();

    let backend = match &cli.sheet {
        Some(path) => Backend::Sheet(CsvSheet::new(path, directory.clone())),
        None => {
            let database_url = std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set unless --sheet is given")?;
            let store = PgStore::connect(&database_url, directory.clone())
                .await
                .context("failed to connect to Postgres")?;
            Backend::Postgres(store)
        }
    };
    let pulse = Pulse::new(backend, &settings);

    match cli.command {
        Commands::InitDb => {
            match pulse.store() {
                Backend::Sheet(sheet) => {
                    sheet.init()?;
                    println!("Sheet ready at {}.", sheet.path().display());
                }
                Backend::Postgres(store) => {
                    store.init_db().await?;
                    println!("Schema ready.");
                }
            }
        }
        Commands::Seed => {
            let reports = store::seed_reports(Utc::now().date_naive())?;
            for report in &reports {
                pulse.store().append(report).await?;
            }
            println!("Seed data inserted ({} reports).", reports.len());
        }
        Commands::Import { csv } => {
            let inserted = sheet::import_csv(pulse.store(), &csv, pulse.directory()).await?;
            println!("Inserted {inserted} reports from {}.", csv.display());
        }
        Commands::Submit { text, campus, json } => {
            let submission = pulse.submit(&text, campus.as_deref(), Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&submission)?);
                return Ok(());
            }

            if submission.recorded {
                println!(
                    "Recorded for {} on {}:",
                    submission.campus_name, submission.report_date
                );
            } else {
                println!(
                    "Nothing recorded for {}: no stats found.",
                    submission.campus_name
                );
            }
            for (stat, value) in &submission.stats {
                println!("- {}: {}", stat.label(), value);
            }
            for follow_up in &submission.follow_ups {
                println!("? {follow_up}");
            }
        }
        Commands::Ask { question, json } => {
            let answer = pulse.ask(&question, Utc::now().date_naive()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
                return Ok(());
            }

            println!("{}", answer.text);
            for insight in &answer.insights {
                println!("* {insight}");
            }
        }
        Commands::Report { campus, year, out } => {
            let (campuses, scope) = match campus.as_deref() {
                Some(name) => {
                    let campus = pulse
                        .directory()
                        .lookup(name)
                        .with_context(|| format!("unknown campus {name:?}"))?;
                    (vec![campus.id.clone()], Some(campus.name.clone()))
                }
                None => (pulse.directory().ids(), None),
            };
            let (reports, analysis) = pulse.review(&campuses, year).await?;
            let report = report::build_report(scope.as_deref(), year, &reports, &analysis);
            std::fs::write(&out, report)?;
            println!("Review written to {}.", out.display());
        }
    }

    Ok(())
}
