use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use fiacre::config::Config;
use fiacre::fetch::{Fetcher, WAKE_SETTLE};
use fiacre::logging::init_logging;
use fiacre::ops::VehicleOps;
use fiacre::registry::VehicleRegistry;
use fiacre::scheduler::BoundaryScheduler;
use fiacre::stats::StatsProjector;
use fiacre::store::{CredentialStore, Database, RentalStore, SnapshotStore, VehicleStore};
use fiacre::tesla::{TeslaClient, VehicleApi};
use fiacre::tokens::TokenStore;
use fiacre::web::{self, AppState};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "fiacre",
    about = "Rental management for Tesla vehicles",
    version = env!("APP_VERSION")
)]
struct Cli {
    /// Configuration file. The default probe locations apply when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the rental boundary worker
    Serve,
    /// Poll the state of all active vehicles once
    FetchData {
        /// Wake sleeping vehicles instead of falling back to the listing
        #[arg(long)]
        wakeup: bool,
        /// Only poll the selected vehicle
        #[arg(long)]
        vehicle_id: Option<i64>,
    },
    /// Reconcile the vehicle list of every account
    LoadVehicles {
        /// Wake vehicles so new ones get a full state snapshot
        #[arg(long)]
        wakeup: bool,
    },
    /// Record odometers for rental boundaries due right now
    UpdateRentals,
    /// Refresh credentials that expire soon
    RefreshCredentials,
    /// Print the raw vehicle listing of every account
    PrintVehicles,
}

fn build_state(config: Config) -> Result<(AppState, Arc<dyn VehicleApi>)> {
    let config = Arc::new(config);
    let db = Database::open(Path::new(&config.database.path))?;
    let credentials = CredentialStore::new(db.clone());
    let vehicles = VehicleStore::new(db.clone());
    let rentals = RentalStore::new(db.clone());
    let snapshots = SnapshotStore::new(db.clone());

    let api: Arc<dyn VehicleApi> = Arc::new(TeslaClient::new(&config.tesla)?);
    let tokens = Arc::new(TokenStore::new(
        credentials.clone(),
        api.clone(),
        config.effective_secret_key(),
    ));
    let registry = Arc::new(VehicleRegistry::new(
        vehicles.clone(),
        snapshots.clone(),
        credentials.clone(),
        tokens.clone(),
        api.clone(),
        WAKE_SETTLE,
    ));
    let fetcher = Arc::new(Fetcher::new(
        vehicles.clone(),
        snapshots.clone(),
        credentials.clone(),
        tokens.clone(),
        api.clone(),
        WAKE_SETTLE,
    ));
    let ops = Arc::new(VehicleOps::new(
        credentials.clone(),
        tokens.clone(),
        api.clone(),
        fetcher.clone(),
        WAKE_SETTLE,
    ));
    let scheduler = Arc::new(BoundaryScheduler::new(
        rentals.clone(),
        vehicles.clone(),
        snapshots.clone(),
        fetcher.clone(),
    ));
    let stats = Arc::new(StatsProjector::new(
        snapshots.clone(),
        config.stats.range_wh_per_km,
        config.rollup_timezone()?,
    ));

    let state = AppState {
        config,
        credentials,
        vehicles,
        rentals,
        snapshots,
        tokens,
        registry,
        fetcher,
        ops,
        scheduler,
        stats,
    };
    Ok((state, api))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    init_logging(&config.logging)?;

    let (state, api) = build_state(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("fiacre starting up");
            state.scheduler.ensure_running();
            let host = state.config.http.host.clone();
            let port = state.config.http.port;
            web::serve(state, &host, port).await
        }
        Command::FetchData { wakeup, vehicle_id } => {
            state.fetcher.fetch_all(wakeup, vehicle_id).await?;
            Ok(())
        }
        Command::LoadVehicles { wakeup } => {
            state.registry.sync_all(wakeup).await?;
            Ok(())
        }
        Command::UpdateRentals => {
            state.scheduler.update_rentals(Utc::now()).await?;
            Ok(())
        }
        Command::RefreshCredentials => {
            let refreshed = state.tokens.refresh_expiring().await?;
            info!("refreshed {} credentials", refreshed);
            Ok(())
        }
        Command::PrintVehicles => {
            for credential in state.credentials.list()? {
                let access_token = state.tokens.access_token(&credential)?;
                let listing = api.list_vehicles(&access_token).await?;
                println!("{}", serde_json::to_string_pretty(&listing)?);
            }
            Ok(())
        }
    }
}
