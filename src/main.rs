//! FIRSTHALF: first-half goal value engine.
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the store and runs one idempotent job per subcommand, printing its
//! result as JSON. `schedule` runs every job on its own interval until
//! Ctrl-C.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use firsthalf::config::AppConfig;
use firsthalf::data::api_football::ApiFootballClient;
use firsthalf::data::resilient::{Resilient, RetryPolicy};
use firsthalf::engine::{ingest, Ingestor, PipelineOptions, SelectionPipeline, SettlementEngine};
use firsthalf::health::HealthMonitor;
use firsthalf::model::PredictionEngine;
use firsthalf::storage::{SqliteStore, Store};
use firsthalf::strategy::ValueEngine;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "firsthalf")]
#[command(about = "First-half goal prediction, selection and settlement engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upsert league profiles from the config file
    SyncLeagues,
    /// Import fixtures and scores for active leagues
    Import {
        /// First day (default: two days ago, to pick up results)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day (default: today + configured days ahead)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Refresh first-half odds for a day's scheduled matches
    RefreshOdds {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Capture closing prices for matches about to kick off
    CaptureClosing {
        /// Window ahead of now, in minutes
        #[arg(long)]
        window_mins: Option<i64>,
    },
    /// Recompute team profiles from finished matches
    RefreshStats {
        /// One league code (default: all active)
        #[arg(long)]
        league: Option<String>,
    },
    /// Compute (or show) the prediction for one match
    Predict {
        match_id: String,
        #[arg(long)]
        force: bool,
    },
    /// Run the daily selection pipeline
    Pipeline {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        league: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
    /// Settle pending selections
    Settle,
    /// Show the health report
    Health {
        /// Period in days (implies --fresh)
        #[arg(long)]
        period: Option<u32>,
        /// Generate a new report instead of using the cached one
        #[arg(long)]
        fresh: bool,
    },
    /// Run every job on its configured interval until Ctrl-C
    Schedule,
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct App {
    cfg: AppConfig,
    store: Arc<dyn Store>,
}

impl App {
    async fn open(cfg: AppConfig) -> Result<Self> {
        let store = SqliteStore::connect(&cfg.storage.database_url, cfg.storage.max_connections)
            .await
            .with_context(|| format!("Failed to open store at {}", cfg.storage.database_url))?;
        Ok(Self {
            cfg,
            store: Arc::new(store),
        })
    }

    fn ingestor(&self) -> Result<Ingestor> {
        let key = AppConfig::resolve_env(&self.cfg.supplier.api_key_env)?;
        let client = ApiFootballClient::new(&self.cfg.supplier, key)
            .context("Failed to build API-Football client")?;
        let supplier = Arc::new(Resilient::new(client, RetryPolicy::from(&self.cfg.supplier)));
        Ok(Ingestor::new(
            self.store.clone(),
            supplier.clone(),
            supplier,
            self.cfg.estimation.clone(),
            self.cfg.pipeline.concurrency,
        ))
    }

    fn predictions(&self) -> PredictionEngine {
        PredictionEngine::new(self.store.clone(), self.cfg.prediction.clone())
    }

    fn pipeline(&self) -> SelectionPipeline {
        SelectionPipeline::new(
            self.store.clone(),
            self.predictions(),
            ValueEngine::new(self.store.clone(), self.cfg.value.clone()),
            self.cfg.pipeline.clone(),
        )
    }

    fn settlement(&self) -> SettlementEngine {
        SettlementEngine::new(self.store.clone(), self.cfg.pipeline.concurrency)
    }

    fn health(&self) -> HealthMonitor {
        HealthMonitor::new(self.store.clone(), self.cfg.health.clone())
    }

    async fn import(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<serde_json::Value> {
        let today = Utc::now().date_naive();
        let from = from.unwrap_or(today - ChronoDuration::days(2));
        let to = to.unwrap_or(today + ChronoDuration::days(self.cfg.schedule.import_days_ahead));
        json(&self.ingestor()?.import_fixtures(from, to).await?)
    }

    async fn refresh_odds(&self, date: Option<NaiveDate>) -> Result<serde_json::Value> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        json(&self.ingestor()?.refresh_odds(date).await?)
    }

    async fn capture_closing(&self, window_mins: Option<i64>) -> Result<serde_json::Value> {
        let window = window_mins.unwrap_or(self.cfg.schedule.closing_interval_mins as i64);
        json(
            &self
                .ingestor()?
                .capture_closing_odds(Utc::now(), ChronoDuration::minutes(window))
                .await?,
        )
    }

    async fn refresh_stats(&self, league: Option<&str>) -> Result<serde_json::Value> {
        let ingestor = self.ingestor()?;
        match league {
            Some(code) => json(&ingestor.refresh_team_stats(code).await?),
            None => {
                let results: Vec<serde_json::Value> = ingestor
                    .refresh_all_team_stats()
                    .await?
                    .into_iter()
                    .map(|r| match r {
                        Ok(ok) => serde_json::to_value(ok),
                        Err(failure) => serde_json::to_value(failure),
                    })
                    .collect::<Result<_, _>>()?;
                Ok(serde_json::Value::Array(results))
            }
        }
    }

    async fn run_pipeline(&self, options: PipelineOptions) -> Result<serde_json::Value> {
        let result = self.pipeline().run_daily_pipeline(options).await;
        json(&result)
    }

    async fn settle(&self) -> Result<serde_json::Value> {
        json(&self.settlement().settle_selections().await?)
    }

    async fn health_report(&self, period: Option<u32>, fresh: bool) -> Result<serde_json::Value> {
        let monitor = self.health();
        let report = if fresh || period.is_some() {
            monitor.generate_health_report(period).await?
        } else {
            monitor.get_latest_health_report().await?
        };
        json(&report)
    }
}

fn json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("Failed to serialise result")
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config)?;
    let app = App::open(cfg).await?;

    let output = match cli.command {
        Commands::SyncLeagues => {
            let n = ingest::sync_leagues(app.store.as_ref(), &app.cfg.leagues).await?;
            serde_json::json!({ "leagues": n })
        }
        Commands::Import { from, to } => app.import(from, to).await?,
        Commands::RefreshOdds { date } => app.refresh_odds(date).await?,
        Commands::CaptureClosing { window_mins } => app.capture_closing(window_mins).await?,
        Commands::RefreshStats { league } => app.refresh_stats(league.as_deref()).await?,
        Commands::Predict { match_id, force } => {
            let prediction = app
                .predictions()
                .calculate_probability(&match_id, force)
                .await?;
            json(&prediction)?
        }
        Commands::Pipeline {
            date,
            league,
            dry_run,
            force,
        } => {
            app.run_pipeline(PipelineOptions {
                date,
                league_code: league,
                dry_run,
                force_regenerate: force,
            })
            .await?
        }
        Commands::Settle => app.settle().await?,
        Commands::Health { period, fresh } => app.health_report(period, fresh).await?,
        Commands::Schedule => {
            run_schedule(&app).await;
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Built-in scheduler. Each tick runs one job; a failed job is logged and
/// retried on its next tick.
async fn run_schedule(app: &App) {
    let s = &app.cfg.schedule;
    let every = |secs: u64| {
        let mut i = tokio::time::interval(Duration::from_secs(secs.max(1)));
        i.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        i
    };
    let mut import = every(s.import_interval_mins * 60);
    let mut odds = every(s.odds_interval_mins * 60);
    let mut closing = every(s.closing_interval_mins * 60);
    let mut stats = every(s.stats_interval_hours * 3600);
    let mut pipeline = every(s.pipeline_interval_hours * 3600);
    let mut settle = every(s.settle_interval_mins * 60);
    let mut health = every(s.health_interval_hours * 3600);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        import_mins = s.import_interval_mins,
        odds_mins = s.odds_interval_mins,
        closing_mins = s.closing_interval_mins,
        pipeline_hours = s.pipeline_interval_hours,
        settle_mins = s.settle_interval_mins,
        "Scheduler started. Press Ctrl+C to stop."
    );

    loop {
        let (job, outcome) = tokio::select! {
            _ = import.tick() => ("import", app.import(None, None).await),
            _ = odds.tick() => ("refresh-odds", app.refresh_odds(None).await),
            _ = closing.tick() => ("capture-closing", app.capture_closing(None).await),
            _ = stats.tick() => ("refresh-stats", app.refresh_stats(None).await),
            _ = pipeline.tick() => ("pipeline", app.run_pipeline(PipelineOptions::default()).await),
            _ = settle.tick() => ("settle", app.settle().await),
            _ = health.tick() => ("health", app.health_report(None, true).await),
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        };
        match outcome {
            Ok(_) => info!(job, "Scheduled job finished"),
            Err(e) => error!(job, error = %format!("{e:#}"), "Scheduled job failed"),
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("firsthalf=info"));

    if std::env::var("FIRSTHALF_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
