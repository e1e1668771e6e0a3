mod config;
mod db;
mod engine;
mod errors;
mod ingest;
mod server;
mod state;
mod stats;

use crate::db::SqliteDepot;
use crate::engine::controller::AnalyticsController;
use crate::errors::EngineResult;
use crate::state::{RunCounters, SeasonDates};
use crate::stats::composite::CompositeConfig;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hoops_averages")]
#[command(about = "Rolling multi-horizon player averages from box scores", long_about = None)]
struct Cli {
    /// Season (YYYY-YY) to calculate averages for. Every known season when omitted.
    #[arg(long)]
    season: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register or update a season's date range
    Season {
        #[arg(long)]
        season: String,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,
    },

    /// Import one day of collector rows (JSON array of data-stat objects)
    Import {
        #[arg(long)]
        season: String,

        #[arg(long)]
        date: NaiveDate,

        #[arg(long)]
        file: PathBuf,
    },

    /// Serve persisted averages over HTTP
    Serve,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> EngineResult<()> {
    let cfg = config::AppConfig::from_env()?;
    let pool = db::init_db(&cfg.db_path())?;
    let depot = SqliteDepot::new(pool.clone());

    match cli.command {
        Some(Commands::Season { season, start, end }) => {
            if end < start {
                return Err(errors::EngineError::Config(format!("season {season}: end {end} before start {start}")));
            }
            db::upsert_season(&pool, &SeasonDates { season: season.clone(), start, end })?;
            tracing::info!(season = %season, start = %start, end = %end, "season registered");
        }

        Some(Commands::Import { season, date, file }) => {
            let json = std::fs::read_to_string(&file)?;
            ingest::import_day(&pool, &depot, &season, date, &json)?;
        }

        Some(Commands::Serve) => {
            let app = server::router(server::AppState::new(depot));
            let addr = format!("0.0.0.0:{}", cfg.server_port);
            tracing::info!("server listening on {addr}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }

        None => {
            let counters = Arc::new(RunCounters::new());
            let composite = CompositeConfig {
                efficiency_per_minute: cfg.efficiency_per_minute,
            };
            let controller = Arc::new(AnalyticsController::new(Arc::new(depot), composite, counters.clone())?);

            let seasons = match cli.season {
                Some(season) => vec![season],
                None => controller.season_ids(),
            };
            tracing::info!(seasons = ?seasons, "averaging seasons");

            let summaries = controller.run_seasons(seasons).await?;
            for s in &summaries {
                tracing::info!(
                    season = %s.season,
                    days = s.days,
                    records = s.records,
                    rolling_flushes = s.rolling_flushes,
                    forced_flushes = s.forced_flushes,
                    "season averaged"
                );
            }
            tracing::info!(counters = %counters.to_json(), "run complete");
        }
    }

    Ok(())
}
