use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use class_engagement_index::dashboard;
use class_engagement_index::db::{self, SqliteStore, DEFAULT_DATABASE_URL};
use class_engagement_index::import;
use class_engagement_index::models::{
    DailyReflectionInput, RatingValue, RecordId, Scope, TaskGiven,
};
use class_engagement_index::report;
use class_engagement_index::submit;
use class_engagement_index::{EngineConfig, ReflectionStore};

#[derive(Parser)]
#[command(name = "cei")]
#[command(about = "Daily classroom reflections and weekly Class Engagement Index trends", long_about = None)]
struct Cli {
    /// TOML file with rated fields, weights and trend settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Score the low/medium/high classroom form with attendance instead of the default fields
    #[arg(long, global = true, conflicts_with = "config")]
    classroom_form: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    teacher: String,
    #[arg(long)]
    class: String,
    #[arg(long)]
    subject: String,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::new(&self.teacher, &self.class, &self.subject)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load four weeks of demo reflections
    Seed,
    /// Import reflections from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record today's (or a past day's) reflection for a class
    Reflect {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Session date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Rating as field=value, repeat for each rated field
        #[arg(long = "rating", value_parser = parse_rating)]
        ratings: Vec<(String, RatingValue)>,
        /// Work set in the session: none, classwork, assignment or test
        #[arg(long)]
        task: Option<TaskGiven>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Set how many students are on a class roster
    ClassSetup {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        size: u32,
    },
    /// Write the free-text reflection for a week
    WeekNote {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Any day in the week, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        text: String,
    },
    /// Retract a scored reflection so it can be submitted again
    Retract {
        #[arg(long)]
        id: i64,
    },
    /// List the classes and subjects a teacher has reflections for
    Classes {
        #[arg(long)]
        teacher: String,
    },
    /// Show weekly engagement trend for a class
    Trend {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 8)]
        weeks: usize,
        /// Print the weekly aggregates as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 8)]
        weeks: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn parse_rating(raw: &str) -> Result<(String, RatingValue), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {raw}"))?;
    let field = field.trim();
    if field.is_empty() || value.trim().is_empty() {
        return Err(format!("expected field=value, got {raw}"));
    }
    Ok((field.to_string(), RatingValue::parse(value)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("class_engagement_index=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None if cli.classroom_form => EngineConfig::classroom_form(),
        None => EngineConfig::default(),
    };

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let store = SqliteStore::connect(&database_url)
        .await
        .with_context(|| format!("failed to open {database_url}"))?;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&store, &config, today).await?;
            println!("Seed data inserted ({inserted} new reflections).");
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let summary = import::import_reflections(&store, &config, file, today).await?;
            println!(
                "Inserted {} reflections from {} ({} already recorded).",
                summary.inserted,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Reflect {
            scope,
            date,
            ratings,
            task,
            topic,
            note,
        } => {
            let mut input = DailyReflectionInput::new(scope.scope(), date.unwrap_or(today));
            input.ratings.extend(ratings);
            input.task_given = task;
            input.topic = topic;
            input.note = note;

            let submitted = submit::submit(&store, &config, input, today).await?;
            println!(
                "Reflection saved as #{}. Engagement score: {:.1}",
                submitted.id, submitted.record.cei
            );
        }
        Commands::ClassSetup {
            teacher,
            class,
            size,
        } => {
            submit::setup_class(&store, &Scope::new(&teacher, &class, ""), size).await?;
            println!("{class} now has {size} students on the roster.");
        }
        Commands::WeekNote { scope, date, text } => {
            let saved = submit::reflect_on_week(
                &store,
                &config.trend,
                scope.scope(),
                date.unwrap_or(today),
                &text,
                today,
            )
            .await?;
            println!("Reflection saved for the week of {}.", saved.week_start);
        }
        Commands::Retract { id } => {
            submit::retract(&store, RecordId(id)).await?;
            println!("Reflection #{id} retracted.");
        }
        Commands::Classes { teacher } => {
            let scopes = store.scopes(&teacher).await?;
            if scopes.is_empty() {
                println!("No reflections yet.");
                return Ok(());
            }
            for scope in scopes {
                println!("- {} / {}", scope.class_id, scope.subject_id);
            }
        }
        Commands::Trend { scope, weeks, json } => {
            let overview =
                dashboard::overview(&store, &config, &scope.scope(), weeks, today).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
                return Ok(());
            }

            if overview.weeks.is_empty() {
                println!("No sessions in the last {weeks} weeks.");
                return Ok(());
            }

            println!("Weekly engagement for {}:", overview.scope);
            for week in &overview.weeks {
                let delta = week
                    .trend_delta
                    .map(|delta| format!("{delta:+.2}"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "- week of {}: mean {:.2} (sd {:.2}) across {} sessions, change {}, {}",
                    week.week_start,
                    week.mean_cei,
                    week.std_dev_cei,
                    week.session_count,
                    delta,
                    week.trend_label
                );
            }
            if let Some(engagement) = &overview.engagement {
                println!(
                    "Average CEI {:.1} ({}): {}",
                    engagement.mean_cei, engagement.status, engagement.message
                );
            }
            for weekly in &overview.reflections {
                println!("  note for week of {}: {}", weekly.week_start, weekly.reflection);
            }
        }
        Commands::Report { scope, weeks, out } => {
            let overview =
                dashboard::overview(&store, &config, &scope.scope(), weeks, today).await?;
            let report = report::build_report(&overview, weeks, today);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
