use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use lrc_config::{
    load_layered_yaml, report_unused_keys, resolve_source_keys, KeyEnforcement, UnusedKeyPolicy,
};
use lrc_runtime::{
    commit_new_entries, LedgerStore, PassError, PassOptions, ReconcileConfig, ReconcilePass,
    SourceDescriptor, SourceReport,
};
use lrc_source::{HttpPageSource, SourceFetcher};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

mod export;
mod file_store;
mod fixture;

use export::{write_exports, ExportSection, DEFAULT_EXPORT_ROOT};
use file_store::FileStore;
use fixture::FixtureSource;

#[derive(Parser)]
#[command(name = "lrc")]
#[command(about = "Ledger reconciliation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands (LRC_DATABASE_URL)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> sources -> local overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Reconcile every configured source against the store
    Reconcile(ReconcileArgs),
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Layered config paths in merge order
    #[arg(long = "config", required = true, num_args = 1..)]
    config_paths: Vec<String>,

    /// Read source pages from `<dir>/<source>/<account>/<category>.json`
    #[arg(long, conflicts_with = "http", required_unless_present = "http")]
    fixtures: Option<PathBuf>,

    /// Fetch from the sources' HTTP endpoints (`sources[].http`)
    #[arg(long, default_value_t = false)]
    http: bool,

    /// JSON store snapshot; inserts go to `<path>.inserts.jsonl`
    #[arg(long = "store-file", conflicts_with = "db")]
    store_file: Option<PathBuf>,

    /// Use the Postgres store (LRC_DATABASE_URL)
    #[arg(long, default_value_t = false)]
    db: bool,

    /// Only reconcile this source
    #[arg(long)]
    source: Option<String>,

    /// Report the full history instead of new entries only
    #[arg(long, default_value_t = false, conflicts_with = "insert")]
    show_all: bool,

    /// Insert new entries into the store after reconciling
    #[arg(long, default_value_t = false)]
    insert: bool,

    /// Export root (default: `export.dir` from config, else `exports`)
    #[arg(long = "export-dir")]
    export_dir: Option<PathBuf>,

    /// Fail on config keys outside the consumed sections
    #[arg(long, default_value_t = false)]
    strict_config: bool,
}

/// `/store` section of the config.
#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    #[serde(default)]
    file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Dev convenience: silent when absent.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = lrc_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = lrc_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_ledger_table={} has_balance_table={}",
                        s.ok, s.has_ledger_table, s.has_balance_table
                    );
                }
                DbCmd::Migrate => {
                    lrc_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::ConfigHash { paths } => {
            let loaded = load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(ExitCode::SUCCESS)
        }

        // Exit codes: 1 error, 2 usage (clap), 3 reconciled with mismatches.
        Commands::Reconcile(args) => {
            let all_ok = run_reconcile(args).await?;
            println!("overall_ok={all_ok}");
            Ok(if all_ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(3)
            })
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_reconcile(args: ReconcileArgs) -> Result<bool> {
    let loaded = load_layered_yaml(&args.config_paths)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(&loaded.config_json, policy)?;
    for leaf in &unused.unused_leaf_pointers {
        warn!(leaf = %leaf, "unused config key");
    }

    let cfg = ReconcileConfig::from_config_json(&loaded.config_json)
        .context("CONFIG_INVALID: reconcile config rejected")?;
    let export_section = ExportSection::from_config_json(&loaded.config_json)?;

    let sources: Vec<&SourceDescriptor> = match &args.source {
        Some(name) => vec![cfg
            .source(name)
            .with_context(|| format!("CONFIG_INVALID: source '{name}' is not configured"))?],
        None => cfg.sources.iter().collect(),
    };
    if sources.is_empty() {
        bail!("CONFIG_INVALID: no sources configured");
    }

    let keys = if args.http {
        Some(resolve_source_keys(&loaded.config_json, KeyEnforcement::Required)?)
    } else {
        None
    };

    let store = open_store(&args, &loaded.config_json).await?;
    let options = PassOptions {
        show_all: args.show_all || cfg.pass.show_all,
        max_concurrency: cfg.pass.max_concurrency,
    };
    if options.show_all && args.insert {
        bail!("--insert cannot be used when pass.show_all is set");
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling pass");
            let _ = cancel_tx.send(true);
        }
    });

    let mut reports: Vec<SourceReport> = Vec::with_capacity(sources.len());
    for descriptor in sources {
        let fetcher: Arc<dyn SourceFetcher> = if args.http {
            let http = descriptor.http.clone().with_context(|| {
                format!(
                    "CONFIG_INVALID: source '{}' has no http section",
                    descriptor.name
                )
            })?;
            let api_key = keys
                .as_ref()
                .and_then(|k| k.get(&descriptor.name))
                .map(str::to_string);
            Arc::new(HttpPageSource::new(
                descriptor.name.clone(),
                http,
                &descriptor.categories,
                api_key,
            ))
        } else {
            let dir = args
                .fixtures
                .as_deref()
                .context("--fixtures <dir> or --http is required")?;
            Arc::new(FixtureSource::load(dir, descriptor)?)
        };

        let pass = ReconcilePass::new(
            Arc::new(descriptor.clone()),
            fetcher,
            Arc::clone(&store),
            options,
        )
        .with_cancel(cancel_rx.clone());

        let report = match pass.run().await {
            Ok(r) => r,
            Err(PassError::Cancelled) => bail!("reconcile cancelled by user"),
            Err(e) => {
                return Err(e).with_context(|| format!("source '{}' pass failed", descriptor.name))
            }
        };
        print_summary(&report);

        if args.insert {
            let inserted = commit_new_entries(store.as_ref(), &report)
                .await
                .with_context(|| format!("insert for source '{}' failed", report.source))?;
            println!("source={} inserted={}", report.source, inserted);
        }
        reports.push(report);
    }

    let root = args
        .export_dir
        .clone()
        .or_else(|| export_section.dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_ROOT));
    let dir = write_exports(&root, &loaded.config_hash, &reports, &export_section)?;
    println!("export_dir={}", dir.display());

    Ok(reports.iter().all(|r| r.overall_ok))
}

async fn open_store(args: &ReconcileArgs, config_json: &Value) -> Result<Arc<dyn LedgerStore>> {
    if args.db {
        let pool = lrc_db::connect_from_env().await?;
        return Ok(Arc::new(lrc_db::PgLedgerStore::new(pool)));
    }
    let section: StoreSection = match config_json.pointer("/store") {
        None | Some(Value::Null) => StoreSection::default(),
        Some(v) => serde_json::from_value(v.clone()).context("invalid /store section")?,
    };
    let path = match (&args.store_file, section.file) {
        (Some(p), _) => p.clone(),
        (None, Some(p)) => PathBuf::from(p),
        (None, None) => bail!("no store: pass --store-file <path> or --db, or set store.file"),
    };
    Ok(Arc::new(open_file_store(&path)?))
}

fn open_file_store(path: &Path) -> Result<FileStore> {
    let store = FileStore::open(path)?;
    info!(snapshot = %path.display(), journal = %store.journal().display(), "file store opened");
    Ok(store)
}

fn print_summary(report: &SourceReport) {
    for r in &report.results {
        println!(
            "source={} account={} new={} source_count={} known_count={} store_only={} \
             duplicates={} unkeyed={} self_transfers={} source_balance={} known_balance={} \
             balance_basis={:?} balance_match={} count_match={}",
            r.source,
            r.account,
            r.new_entries.len(),
            r.source_count(),
            r.known_count(),
            r.store_only_count(),
            r.duplicates_collapsed(),
            r.unkeyed,
            r.self_transfers_dropped,
            r.source_balance,
            r.known_balance,
            r.balance_basis,
            r.balance_match,
            r.count_match,
        );
    }
    for f in &report.fetch_failures {
        println!(
            "source={} account={} category={} fetch_failed_after_pages={} error={:?}",
            report.source, f.account, f.category, f.pages_fetched, f.error
        );
    }
    println!(
        "source={} pass_id={} overall_ok={}",
        report.source, report.pass_id, report.overall_ok
    );
}
