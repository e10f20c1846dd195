//! arcindex CLI: resolve configuration and inspect stored index state.
//!
//! # Commands
//! ```bash
//! arcindex info
//! arcindex config --prefix mainnet --mode check --from 1000 --to 2000
//! arcindex gaps   --db ./arcindex.db --prefix mainnet --from 0 --to 500000
//! arcindex stats  --db ./arcindex.db
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use arcindex_core::document::RecordKind;
use arcindex_core::indexer::{IndexerConfig, RunMode};
use arcindex_core::store::{DocumentStore, Query};
use arcindex_pipeline::find_gaps;
use arcindex_storage::SqliteStore;

mod logging;

use logging::{init_tracing, parse_components, LogConfig};

#[derive(Parser)]
#[command(
    name = "arcindex",
    about = "ArcIndex: Aergo chain indexer",
    long_about = "
ArcIndex: mine Aergo blocks, transactions, names, tokens, and balances into
typed document indices, follow the chain tip, and repair gaps.

ENVIRONMENT VARIABLES:
  ARCINDEX_CONFIG      JSON configuration file
  ARCINDEX_PREFIX      Index and alias prefix
  ARCINDEX_MODE        check | onsync | all | rebuild
  ARCINDEX_WHITELIST   Comma-separated addresses to watch
  RUST_LOG             Overrides --log-level
",
    version
)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LogArgs {
    /// Default log level
    #[arg(long, global = true, default_value = "info", env = "ARCINDEX_LOG_LEVEL")]
    log_level: String,
    /// Per-crate level override, e.g. arcindex_pipeline=debug
    #[arg(long = "log", global = true)]
    log_components: Vec<String>,
    /// Emit JSON logs
    #[arg(long, global = true, env = "ARCINDEX_LOG_JSON")]
    log_json: bool,
}

/// Settings layered over the configuration file.
#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(long, env = "ARCINDEX_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "ARCINDEX_PREFIX")]
    prefix: Option<String>,
    #[arg(long, env = "ARCINDEX_MODE")]
    mode: Option<RunMode>,
    #[arg(long, env = "ARCINDEX_FROM")]
    from: Option<u64>,
    #[arg(long, env = "ARCINDEX_TO")]
    to: Option<u64>,
    /// Re-ingest the whole range instead of scanning for gaps
    #[arg(long, env = "ARCINDEX_FIX")]
    fix: bool,
    #[arg(long, env = "ARCINDEX_MINERS")]
    miners: Option<usize>,
    #[arg(long, env = "ARCINDEX_BULK_SIZE")]
    bulk_size: Option<usize>,
    #[arg(long, env = "ARCINDEX_BATCH_TIME_MS")]
    batch_time_ms: Option<u64>,
    #[arg(long, env = "ARCINDEX_SKIP_EMPTY")]
    skip_empty: bool,
    #[arg(long, env = "ARCINDEX_WHITELIST", value_delimiter = ',')]
    whitelist: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and defaults
    Info,

    /// Print the resolved configuration as JSON
    Config {
        #[command(flatten)]
        args: ConfigArgs,
    },

    /// List missing block ranges in a SQLite store without backfilling
    Gaps {
        /// SQLite database path
        #[arg(long, env = "ARCINDEX_DB")]
        db: String,
        #[arg(long, default_value = "testnet", env = "ARCINDEX_PREFIX")]
        prefix: String,
        #[arg(long, default_value_t = 0)]
        from: u64,
        /// Defaults to the highest stored height
        #[arg(long)]
        to: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record count per index
    Stats {
        /// SQLite database path
        #[arg(long, env = "ARCINDEX_DB")]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log.log_level.clone(),
        components: parse_components(&cli.log.log_components),
        json: cli.log.log_json,
    });

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Config { args } => cmd_config(&args),
        Commands::Gaps {
            db,
            prefix,
            from,
            to,
            json,
        } => cmd_gaps(&db, &prefix, from, to, json).await,
        Commands::Stats { db } => cmd_stats(&db).await,
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_info() -> Result<()> {
    let defaults = IndexerConfig::default();
    println!("ArcIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default mode:            {}", defaults.mode);
    println!("  Miners:                  {}", defaults.miners);
    println!("  Bulk size:               {} records", defaults.bulk.bulk_size);
    println!("  Batch time:              {} ms", defaults.bulk.batch_time_ms);
    println!("  Max reorg depth:         {} blocks", defaults.sync.max_reorg_depth);
    println!("  Max store lag:           {} blocks", defaults.sync.max_store_lag);
    println!("  Storage backends:        memory, SQLite");
    println!(
        "  Record types:            {}",
        RecordKind::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

fn cmd_config(args: &ConfigArgs) -> Result<()> {
    let config = resolve_config(args)?;
    config.validate().context("invalid configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn resolve_config(args: &ConfigArgs) -> Result<IndexerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => IndexerConfig::default(),
    };

    if let Some(prefix) = &args.prefix {
        config.prefix = prefix.clone();
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(from) = args.from {
        config.from = from;
    }
    if args.to.is_some() {
        config.to = args.to;
    }
    config.fix |= args.fix;
    if let Some(miners) = args.miners {
        config.miners = miners;
    }
    if let Some(size) = args.bulk_size {
        config.bulk.bulk_size = size;
    }
    if let Some(ms) = args.batch_time_ms {
        config.bulk.batch_time_ms = ms;
    }
    config.skip_empty_blocks |= args.skip_empty;
    config
        .whitelist
        .extend(args.whitelist.iter().filter(|a| !a.is_empty()).cloned());
    Ok(config)
}

async fn cmd_gaps(db: &str, prefix: &str, from: u64, to: Option<u64>, as_json: bool) -> Result<()> {
    let store = SqliteStore::open(db)
        .await
        .with_context(|| format!("opening {db}"))?;
    let alias = format!("{prefix}_{}", RecordKind::Block.as_str());

    let to = match to {
        Some(to) => to,
        None => {
            let best = store
                .select_one(&alias, &Query::all().sorted_by("no", false))
                .await
                .context("reading best stored height")?;
            match best.and_then(|doc| doc.u64_field("no")) {
                Some(height) => height,
                None => {
                    println!("No blocks stored under '{alias}'");
                    return Ok(());
                }
            }
        }
    };

    let gaps = find_gaps(&store, &alias, from, to)
        .await
        .context("scanning block heights")?;
    let missing: u64 = gaps.iter().map(|g| g.end() - g.start() + 1).sum();

    if as_json {
        let ranges: Vec<[u64; 2]> = gaps.iter().map(|g| [*g.start(), *g.end()]).collect();
        let out = serde_json::json!({
            "from": from,
            "to": to,
            "missing": missing,
            "ranges": ranges,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Scanned {alias} over [{from}, {to}]");
        for gap in &gaps {
            let count = gap.end() - gap.start() + 1;
            println!("  missing {:>10} ..= {:<10} ({count} blocks)", gap.start(), gap.end());
        }
        println!("Total missing: {missing}");
    }
    Ok(())
}

async fn cmd_stats(db: &str) -> Result<()> {
    let store = SqliteStore::open(db)
        .await
        .with_context(|| format!("opening {db}"))?;
    let stats = store.stats().await.context("reading index statistics")?;
    if stats.is_empty() {
        println!("No indices in {db}");
        return Ok(());
    }
    println!("{:<48} {:<16} {:<32} {:>10}", "INDEX", "TYPE", "ALIAS", "RECORDS");
    for s in stats {
        println!(
            "{:<48} {:<16} {:<32} {:>10}",
            s.index,
            s.kind,
            s.alias.as_deref().unwrap_or("-"),
            s.documents
        );
    }
    Ok(())
}
