//! Command-line access to the dashboard's stores.
//!
//! ```text
//! newtab-store --origin http://dashboard.lan list
//! newtab-store --store cache --local-file local.json set feed '{"items": []}'
//! ```
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use newtab_store::codec;
use newtab_store::config::{LocalAreaKind, StoreConfig};
use newtab_store::storage::{StorageService, StoreScope};
use newtab_store::Value;

#[derive(Parser, Debug)]
#[command(name = "newtab-store", about = "Inspect and edit new tab dashboard storage")]
struct Cli {
    /// Origin the dashboard is served from
    #[arg(long, default_value = "http://localhost")]
    origin: String,

    /// Which store to operate on
    #[arg(long, value_enum, default_value_t = Scope::Default)]
    store: Scope,

    /// JSON file holding local storage (in-memory when omitted)
    #[arg(long)]
    local_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scope {
    Default,
    Large,
    Cache,
}

impl From<Scope> for StoreScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Default => StoreScope::Default,
            Scope::Large => StoreScope::Large,
            Scope::Cache => StoreScope::Cache,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under KEY
    Get { key: String },
    /// Store a JSON value under KEY
    Set { key: String, json: String },
    /// Remove KEY
    Remove { key: String },
    /// Remove everything
    Clear,
    /// Print every key and value
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = StoreConfig::default().with_origin(&cli.origin)?;
    if let Some(path) = cli.local_file {
        config = config.with_local_area(LocalAreaKind::JsonFile(path));
    }

    let service = StorageService::from_config(&config)?;
    let store = service.store(cli.store.into());

    match cli.command {
        Command::Get { key } => match store.get(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&codec::encode(&value))?),
            None => bail!("no value stored under {key:?}"),
        },
        Command::Set { key, json } => {
            let parsed = serde_json::from_str(&json).context("value must be JSON")?;
            store.set(&key, codec::decode(parsed)).await?;
        }
        Command::Remove { key } => store.remove(&key).await?,
        Command::Clear => store.clear().await?,
        Command::List => {
            let all = store.get_all().await?;
            let mut keys: Vec<&String> = all.keys().collect();
            keys.sort();
            for key in keys {
                let value: &Value = &all[key];
                println!("{key}\t{}", serde_json::to_string(&codec::encode(value))?);
            }
        }
    }

    Ok(())
}
