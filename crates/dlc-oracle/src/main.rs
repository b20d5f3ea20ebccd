//! `dlc-oracle` command-line front end.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dlc_oracle::core::{
    AssetConfigResponse, AssetListResponse, OracleAnnouncement, OracleAttestation,
    OraclePublicKeyResponse,
};
use dlc_oracle::store::SqliteStore;
use dlc_oracle::{
    parse_request_time, LocalSigner, Oracle, OracleConfig, OracleError, SystemClock,
    TablePriceFeed,
};

#[derive(Parser)]
#[command(name = "dlc-oracle", version, about = "DLC numeric price oracle")]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "oracle.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the oracle public key.
    Pubkey,
    /// List configured assets.
    Assets,
    /// Print the schedule of an asset.
    AssetConfig { asset: String },
    /// Announce the event for the publish date nearest to TIME.
    Announce { asset: String, time: String },
    /// Attest the event for the publish date nearest to TIME.
    Attest { asset: String, time: String },
    /// Create or upgrade the database schema.
    Migrate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MigrateResponse {
    schema_version: u32,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = OracleConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    let store = if config.uses_memory_database() {
        SqliteStore::open_memory()
    } else {
        SqliteStore::open(&config.database.path)
    }
    .with_context(|| format!("opening database {}", config.database.path))?;

    if let Command::Migrate = cli.command {
        let schema_version = store.schema_version().await?;
        info!(schema_version, "database ready");
        print_json(&MigrateResponse { schema_version })?;
        return Ok(ExitCode::SUCCESS);
    }

    let oracle = build_oracle(&config, store)?;
    match run(&oracle, cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "request failed");
            print_json(&e.to_response())?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn build_oracle(config: &OracleConfig, store: SqliteStore) -> Result<Oracle<SqliteStore>> {
    let keypair = config.load_keypair().context("loading oracle key")?;
    let clock = Arc::new(SystemClock);
    let mut feed = match &config.feed.prices_file {
        Some(path) => TablePriceFeed::load(path, clock.clone())
            .with_context(|| format!("loading prices from {}", path.display()))?,
        None => TablePriceFeed::new(clock.clone()),
    };
    let assets = config.asset_configs()?;
    for (asset_id, asset) in &assets {
        feed.set_max_age(asset_id, config.price_max_age(asset));
    }
    let oracle = Oracle::new(
        store,
        Arc::new(LocalSigner::new(keypair)),
        Arc::new(feed),
        assets,
    )?
    .with_clock(clock);
    Ok(oracle)
}

async fn run(oracle: &Oracle<SqliteStore>, command: Command) -> Result<(), OracleError> {
    match command {
        Command::Pubkey => print_json(&OraclePublicKeyResponse {
            public_key: oracle.public_key(),
        }),
        Command::Assets => print_json(&AssetListResponse {
            assets: oracle.asset_ids(),
        }),
        Command::AssetConfig { asset } => {
            print_json(&AssetConfigResponse::from(oracle.asset_config(&asset)?))
        }
        Command::Announce { asset, time } => {
            let requested = parse_request_time(&time)?;
            let announcement = oracle.get_or_create_announcement(&asset, requested).await?;
            let wire: OracleAnnouncement = announcement.to_wire()?;
            print_json(&wire)
        }
        Command::Attest { asset, time } => {
            let requested = parse_request_time(&time)?;
            let record = oracle.get_or_create_attestation(&asset, requested).await?;
            let attestation = OracleAttestation::from_record(&record).ok_or_else(|| {
                OracleError::Internal(format!("event {} is not attested", record.event_id()))
            })?;
            print_json(&attestation)
        }
        Command::Migrate => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), OracleError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| OracleError::Internal(format!("encoding response: {}", e)))?;
    println!("{}", json);
    Ok(())
}
