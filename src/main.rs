mod config;
mod coordinator;
mod data_sources;
mod error;
mod region;
mod signals;
mod storage;
mod utils;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use config::HeatcastConfig;
use coordinator::RunCoordinator;
use data_sources::HttpForecastSource;
use env_logger::Env;
use log::{error, info, warn};
use signals::display::{display_date, heating_message, page_title};
use signals::Season;
use std::time::Duration;
use storage::{NewRegion, RegionStore, RegionSummary, SqliteStore};
use tokio::time::sleep;

#[derive(Parser)]
#[command(name = "heatcast")]
#[command(about = "Infers district heating switch dates from weather forecasts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single pass over all regions (default)
    Once,
    /// Run continuously with specified interval in hours (default: 3)
    Continuous {
        #[arg(default_value = "3")]
        interval_hours: u64,
    },
    /// Print stored heating dates and graph records as JSON
    Status {
        /// Only show the region with this name
        #[arg(long)]
        region: Option<String>,
    },
    /// Add or update a tracked region
    AddRegion {
        id: u32,
        /// Provider location key
        provider_key: String,
        /// Whole hours east of UTC
        #[arg(allow_hyphen_values = true)]
        utc_offset: i32,
        name: String,
        /// Localized name used in messages
        display_name: String,
    },
}

async fn run_continuous<S: RegionStore, F: data_sources::ForecastSource>(
    coordinator: &mut RunCoordinator<S, F>,
    interval_hours: u64,
) {
    info!("Starting continuous runs with {}h intervals", interval_hours);
    loop {
        if let Err(e) = coordinator.reset_if_season_start() {
            error!("Season reset failed: {}", e);
        }
        let summary = coordinator.run().await;
        if !summary.completed() {
            warn!("Run aborted, see the diagnostics log");
        }
        info!("Waiting {} hours until next run", interval_hours);
        sleep(Duration::from_secs(interval_hours * 3600)).await;
    }
}

fn print_status(store: &SqliteStore, region: Option<&str>) -> anyhow::Result<()> {
    let season = Season::of(Local::now().date_naive());
    let mut entries = Vec::new();
    for r in store.list_regions()? {
        if region.is_some_and(|name| r.name != name) {
            continue;
        }
        let graph = store.load_graph(r.id)?;
        entries.push(status_entry(&r, &graph, season));
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn status_entry(
    region: &RegionSummary,
    graph: &[(NaiveDate, f64)],
    season: Season,
) -> serde_json::Value {
    let message = heating_message(
        &region.display_name,
        region.heating_date_display.as_deref(),
        season,
    );
    let (labels, temps): (Vec<String>, Vec<f64>) = graph
        .iter()
        .map(|(date, temp)| (display_date(*date, true), *temp))
        .unzip();
    serde_json::json!({
        "name": region.name,
        "name_ru": region.display_name,
        "heating_date": region.heating_date,
        "heating_date_ru": region.heating_date_display,
        "tracking_complete": region.tracking_complete,
        "direction": season.direction(),
        "message": message,
        "title": page_title(&region.display_name),
        "graph": {"x": labels, "y": temps},
    })
}

fn build_coordinator(
    config: &HeatcastConfig,
    store: SqliteStore,
) -> anyhow::Result<RunCoordinator<SqliteStore, HttpForecastSource>> {
    info!("Validating configuration...");
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("ERROR: {}", e);
        eprintln!("Please set API_KEY_OW or check your .env file");
        std::process::exit(1);
    }
    info!("  Database: {}", config.database_path);
    info!("  Call ceiling: {} per minute", config.rate_limit_ceiling);
    info!(
        "  Threshold: {:.1}°C over {} days",
        config.heating_threshold, config.heating_streak
    );

    let source = HttpForecastSource::new(config)?;
    Ok(RunCoordinator::new(config, store, source))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = HeatcastConfig::from_env();

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .format_timestamp_secs()
        .init();

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;

    match cli.command.unwrap_or(Commands::Once) {
        Commands::Status { region } => print_status(&store, region.as_deref())?,
        Commands::AddRegion {
            id,
            provider_key,
            utc_offset,
            name,
            display_name,
        } => {
            store.upsert_region(&NewRegion {
                id,
                provider_key,
                utc_offset,
                name,
                display_name,
            })?;
            info!("Region {} saved", id);
        }
        Commands::Continuous { interval_hours } => {
            let mut coordinator = build_coordinator(&config, store)?;
            println!("Starting continuous mode (every {} hours)", interval_hours);
            println!("Press Ctrl+C to stop");
            run_continuous(&mut coordinator, interval_hours).await;
        }
        Commands::Once => {
            let mut coordinator = build_coordinator(&config, store)?;
            coordinator.reset_if_season_start()?;
            let summary = coordinator.run().await;
            if let Some(abort) = summary.aborted {
                error!("Run aborted: {}", abort);
                std::process::exit(2);
            }
            info!("Program completed");
        }
    }

    Ok(())
}
