mod cli;
mod config;
mod storage;

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use serde_json::Value;
use strongbox_core::storage::{KeySecureStore, PlainRecordStore};
use strongbox_storage::{SecureStorage, StorageRequest, StorageResponse};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command if cli.ephemeral => run(&storage::ephemeral_storage(&config), command).await?,
        command => run(&storage::storage_from_config(&config)?, command).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so
    // stdout carries only stored values.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("strongbox {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run<K, R>(storage: &SecureStorage<K, R>, command: Command) -> Result<()>
where
    K: KeySecureStore,
    R: PlainRecordStore,
{
    if command == Command::Health {
        run_store_health(storage).await?;
        println!("Storage: ok");
        return Ok(());
    }

    let Some(request) = to_request(command)? else {
        return Ok(());
    };
    let response = storage
        .dispatch(request)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    for line in render(&response)? {
        println!("{line}");
    }
    Ok(())
}

fn to_request(command: Command) -> Result<Option<StorageRequest>> {
    let request = match command {
        Command::Init => StorageRequest::Init,
        Command::Get { key } => StorageRequest::Get { key: Some(key) },
        Command::Set { key, value, json } => {
            let value = if json {
                serde_json::from_str(&value)?
            } else {
                Value::String(value)
            };
            StorageRequest::Set {
                key: Some(key),
                value: Some(value),
            }
        }
        Command::Remove { key } => StorageRequest::Remove { key: Some(key) },
        Command::Clear => StorageRequest::Clear,
        Command::Keys => StorageRequest::Keys,
        Command::Health | Command::Version | Command::Config(_) => return Ok(None),
    };
    Ok(Some(request))
}

fn render(response: &StorageResponse) -> Result<Vec<String>> {
    Ok(match response {
        StorageResponse::Value { value: None } | StorageResponse::Done {} => Vec::new(),
        StorageResponse::Value {
            value: Some(Value::String(s)),
        } => vec![s.clone()],
        StorageResponse::Value { value: Some(value) } => {
            vec![serde_json::to_string_pretty(value)?]
        }
        StorageResponse::Keys { keys } => keys.clone(),
    })
}

/// Round-trips a probe value and removes it again.
async fn run_store_health<K, R>(storage: &SecureStorage<K, R>) -> Result<()>
where
    K: KeySecureStore,
    R: PlainRecordStore,
{
    let probe_key = "health/probe";
    let payload = "ok".into();
    let to_report = |e: strongbox_storage::StorageError| color_eyre::eyre::eyre!(e.to_string());

    storage.init().await.map_err(to_report)?;
    storage.set(probe_key, &payload).await.map_err(to_report)?;
    let round_trip = storage.get(probe_key).await.map_err(to_report)?;
    storage.remove(probe_key).await.map_err(to_report)?;

    if round_trip.as_ref() != Some(&payload) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}
