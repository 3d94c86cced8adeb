//! # HRFlow: scheduled HR notification engine
//!
//! Usage:
//!   hrflow run                          # In-process scheduler loop
//!   hrflow tick weekly_report           # Run one job now (external cron)
//!   hrflow notify leave-submitted 42    # Feed a state change
//!   hrflow jobs                         # List jobs and cadences
//!   hrflow audit --entity review:12     # Show the audit log
//!   hrflow init-db                      # Create the database schema
//!   hrflow init-config                  # Write a default config file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use hrflow_core::config::expand_path;
use hrflow_core::HrFlowConfig;
use hrflow_scheduler::{
    AuditQuery, EntityRef, HrStore, JobName, LocalClock, SchedulerEngine, SqliteStore, TickOutcome,
    TransitionEvent, spawn_scheduler,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hrflow", version, about = "📧 HRFlow: scheduled HR notification engine")]
struct Cli {
    /// Config file (default: ~/.hrflow/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until interrupted
    Run,
    /// Run one job immediately
    Tick {
        /// Job name, e.g. morning_checkin
        job: String,
        /// Evaluate as of this local time ("YYYY-MM-DD HH:MM")
        #[arg(long)]
        at: Option<String>,
    },
    /// Dispatch the notifications for one state change
    Notify {
        /// Event name, e.g. leave-submitted, appreciation-recorded
        event: String,
        /// Id of the leave, offboarding, cycle or appreciation (employee id for onboarding-started)
        id: i64,
    },
    /// List jobs with their cadence
    Jobs,
    /// Show the most recent audit records
    Audit {
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only records for this entity, e.g. review:12
        #[arg(long)]
        entity: Option<String>,
    },
    /// Create or migrate the database and exit
    InitDb,
    /// Write the default configuration to the config path
    InitConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<HrFlowConfig> {
    let config = match path {
        Some(path) => HrFlowConfig::load_from(path)?,
        None => HrFlowConfig::load()?,
    };
    Ok(config)
}

fn parse_at(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
        .with_context(|| format!("invalid --at '{text}', expected YYYY-MM-DD HH:MM"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "hrflow=debug,hrflow_scheduler=debug,hrflow_channels=debug"
    } else {
        "hrflow=info,hrflow_scheduler=info,hrflow_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if let Command::InitConfig = cli.command {
        let path = cli.config.clone().unwrap_or_else(HrFlowConfig::default_path);
        if path.exists() {
            println!("⚠️  {} already exists, leaving it untouched.", path.display());
        } else {
            HrFlowConfig::default().save_to(&path)?;
            println!("✅ Wrote default config to {}", path.display());
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;
    let db_path = expand_path(&config.database.path);
    let store = Arc::new(
        SqliteStore::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );

    match cli.command {
        Command::InitDb | Command::InitConfig => {
            println!("✅ Database ready at {}", db_path.display());
        }
        Command::Jobs => {
            let engine = SchedulerEngine::from_config(
                &config,
                store,
                hrflow_channels::mailer_from_config(&config)?,
            )?;
            engine.prime(Local::now().naive_local());
            for status in engine.status() {
                let next = status
                    .next_run
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<26} {:<18} {:<8} next {next:<16}  {}",
                    status.job.as_str(),
                    status.cron,
                    if status.enabled { "enabled" } else { "disabled" },
                    status.job.description()
                );
            }
        }
        Command::Audit { limit, entity } => {
            let entity = entity
                .map(|e| EntityRef::parse(&e).with_context(|| format!("invalid entity '{e}', expected kind:id")))
                .transpose()?;
            let records = store.audit_log(&AuditQuery {
                entity,
                kind: None,
                limit,
            })?;
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Tick { job, at } => {
            let job = JobName::parse(&job).with_context(|| {
                let names: Vec<_> = JobName::ALL.iter().map(|j| j.as_str()).collect();
                format!("unknown job '{job}' (one of: {})", names.join(", "))
            })?;
            let now = match at {
                Some(text) => parse_at(&text)?,
                None => Local::now().naive_local(),
            };
            let mailer = hrflow_channels::mailer_from_config(&config)?;
            let engine = SchedulerEngine::from_config(&config, store, mailer)?;
            match engine.run_job(job, now).await? {
                TickOutcome::Completed(report) => println!("{}", serde_json::to_string(&report)?),
                TickOutcome::Skipped => println!("⏭️ {job} is already running"),
                TickOutcome::Disabled => println!("{job} is disabled"),
            }
        }
        Command::Notify { event, id } => {
            let event = TransitionEvent::parse(&event, id)
                .with_context(|| format!("unknown event '{event}'"))?;
            let mailer = hrflow_channels::mailer_from_config(&config)?;
            let engine = SchedulerEngine::from_config(&config, store, mailer)?;
            let report = engine.on_transition(event, Local::now().naive_local()).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Run => {
            let mailer = hrflow_channels::mailer_from_config(&config)?;
            tracing::info!("📧 Mail transport: {}", mailer.name());
            let engine = Arc::new(SchedulerEngine::from_config(&config, store, mailer)?);
            let handle = spawn_scheduler(
                engine,
                Arc::new(LocalClock),
                Duration::from_secs(config.scheduler.check_interval_secs.max(1)),
            );
            tokio::signal::ctrl_c().await?;
            tracing::info!("🛑 Shutting down");
            handle.abort();
        }
    }

    Ok(())
}
