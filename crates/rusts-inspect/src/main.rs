//! RusTs Inspect CLI
//!
//! Prints the contents of index stores written by `rusts-index`.
//!
//! ## Usage
//!
//! ```bash
//! # List tables and the keys they hold
//! rusts-inspect --dir data/inverted tables
//!
//! # Tag values of tag key 3 starting with "us-", with series counts
//! rusts-inspect --dir data/inverted entry-set --tag-id 3 --prefix us-
//!
//! # Full entry set of one version
//! rusts-inspect --dir data/inverted entry-set --tag-id 3 --version 100
//!
//! # Tag values of a metric from the forward index
//! rusts-inspect --dir data/forward forward --metric-id 1 --version 100 --keys host,region
//!
//! # Tag key and field ids of a metric
//! rusts-inspect --dir data/meta meta --metric-id 1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusts_core::TimeRange;
use rusts_index::{ForwardIndexReader, IndexConfig, InvertedIndexReader, MetricsMetaReader};
use rusts_storage::{KvSnapshot, KvStore, StoreConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Optional TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InspectConfig {
    index: IndexConfig,
    file_prefix: Option<String>,
}

impl InspectConfig {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.index.validate()?;
        Ok(config)
    }
}

#[derive(Parser)]
#[command(name = "rusts-inspect")]
#[command(author, version, about = "Inspect RusTs index stores")]
struct Cli {
    /// Store directory
    #[arg(short, long, global = true, default_value = "./data")]
    dir: PathBuf,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List table files and their keys
    Tables,

    /// Show the inverted index entry set of a tag key
    EntrySet {
        /// Tag key id
        #[arg(long)]
        tag_id: u32,

        /// Only show tag values starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Show the full entry set of this version
        #[arg(long)]
        version: Option<i64>,
    },

    /// Resolve tag values from the forward index
    Forward {
        /// Metric id
        #[arg(long)]
        metric_id: u32,

        /// Version to read
        #[arg(long)]
        version: i64,

        /// Tag keys (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,
    },

    /// Show tag key and field ids of a metric
    Meta {
        /// Metric id
        #[arg(long)]
        metric_id: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!("Using config {}", path.display());
            InspectConfig::load(path)?
        }
        None => InspectConfig::default(),
    };

    let mut store_config = StoreConfig::new(&cli.dir);
    if let Some(prefix) = config.file_prefix {
        store_config.file_prefix = prefix;
    }
    if !cli.dir.is_dir() {
        anyhow::bail!("Store directory not found: {}", cli.dir.display());
    }
    let store = KvStore::open(store_config)
        .with_context(|| format!("Failed to open store {}", cli.dir.display()))?;

    match cli.command {
        Commands::Tables => list_tables(&store),
        Commands::EntrySet {
            tag_id,
            prefix,
            version,
        } => show_entry_set(&store, config.index, tag_id, &prefix, version),
        Commands::Forward {
            metric_id,
            version,
            keys,
        } => show_forward(&store, config.index, metric_id, version, &keys),
        Commands::Meta { metric_id } => show_meta(&store, config.index, metric_id),
    }
}

fn list_tables(store: &KvStore) -> Result<()> {
    let snapshot = store.snapshot();
    println!("{:<30} {:>10}  Keys", "Table", "Count");
    println!("{:-<60}", "");
    for reader in snapshot.readers() {
        let keys = reader.keys();
        let shown: Vec<String> = keys.iter().take(16).map(|k| k.to_string()).collect();
        let more = if keys.len() > shown.len() { " ..." } else { "" };
        println!(
            "{:<30} {:>10}  {}{}",
            reader.name(),
            keys.len(),
            shown.join(","),
            more
        );
    }
    println!("{:-<60}", "");
    println!("{} tables", snapshot.readers().len());
    Ok(())
}

fn show_entry_set(
    store: &KvStore,
    config: IndexConfig,
    tag_id: u32,
    prefix: &str,
    version: Option<i64>,
) -> Result<()> {
    let reader = InvertedIndexReader::new(store.snapshot(), config);

    if let Some(version) = version {
        let Some(entry_set) = reader.get_entry_set(tag_id, version)? else {
            println!("Version {} not found for tag key {}", version, tag_id);
            return Ok(());
        };
        println!("{:<40} {:>10}", "Tag value", "Series");
        println!("{:-<52}", "");
        for (value, series) in entry_set.iter().filter(|(v, _)| v.starts_with(prefix)) {
            println!("{:<40} {:>10}", value, series.len());
        }
        return Ok(());
    }

    let versions = reader.versions(tag_id)?;
    if versions.is_empty() {
        println!("Tag key {} not found", tag_id);
        return Ok(());
    }
    println!("Versions: {:?}", versions);
    println!("{:<40} {:>10}", "Tag value", "Series");
    println!("{:-<52}", "");
    for value in reader.suggest_tag_values(tag_id, prefix, usize::MAX)? {
        let series = reader.get_series_ids_by_tag_values(tag_id, &[value.as_str()], TimeRange::default())?;
        println!("{:<40} {:>10}", value, series.len());
    }
    Ok(())
}

fn show_forward(
    store: &KvStore,
    config: IndexConfig,
    metric_id: u32,
    version: i64,
    keys: &[String],
) -> Result<()> {
    let mut reader = ForwardIndexReader::new(store.snapshot(), config);
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

    let Some(values) = reader.get_tag_values(metric_id, &keys, version)? else {
        println!("No tag values for metric {} at version {}", metric_id, version);
        println!("Stored versions: {:?}", reader.versions(metric_id)?);
        return Ok(());
    };
    if let Some(series) = reader.series_ids(metric_id, version)? {
        println!("Series: {}", series.len());
    }
    for (key, values) in keys.iter().zip(values) {
        println!("{} ({} values)", key, values.len());
        for value in values {
            println!("  {}", value);
        }
    }
    Ok(())
}

fn show_meta(store: &KvStore, config: IndexConfig, metric_id: u32) -> Result<()> {
    let reader = MetricsMetaReader::new(store.snapshot(), config);
    let Some(meta) = reader.read_metric_meta(metric_id)? else {
        println!("Metric {} not found", metric_id);
        return Ok(());
    };

    println!("Tag keys:");
    for (key, id) in &meta.tag_keys {
        println!("  {:<30} {:>6}", key, id);
    }
    println!("Fields:");
    for (name, field) in &meta.fields {
        println!("  {:<30} {:>6}  {}", name, field.id, field.field_type);
    }
    Ok(())
}
