//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use feedsync_core::{Ack, FeedOutcome, FeedReport, Orchestrator, RunKind, RunProgress, RunReport};
use feedsync_shared::{AppConfig, FieldMapping, NetworkKind, init_config, load_config};
use feedsync_storage::{CatalogStore, NewFeed, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// feedsync — keep a site's product catalog in step with its affiliate feeds.
#[derive(Parser)]
#[command(
    name = "feedsync",
    version,
    about = "Synchronize affiliate-network product feeds into a site's catalog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database path (overrides `[database].path` from the config file).
    #[arg(long, global = true, env = "FEEDSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch every feed of a site and reconcile products and categories.
    Update {
        /// Site subdomain.
        #[arg(long)]
        site: String,
    },

    /// Recompute product keywords and re-run keyword categorization.
    Refresh {
        /// Site subdomain.
        #[arg(long)]
        site: String,
    },

    /// Manage sites.
    Site {
        #[command(subcommand)]
        action: SiteAction,
    },

    /// Manage feeds.
    Feed {
        #[command(subcommand)]
        action: FeedAction,
    },

    /// Manage configuration.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Site subcommands.
#[derive(Subcommand)]
pub(crate) enum SiteAction {
    /// Register a site.
    Add {
        /// Display name.
        #[arg(long)]
        name: String,

        /// Subdomain used to trigger runs.
        #[arg(long)]
        subdomain: String,
    },
}

/// Feed subcommands.
#[derive(Subcommand)]
pub(crate) enum FeedAction {
    /// Attach a feed to a site.
    Add {
        /// Subdomain of the owning site.
        #[arg(long)]
        site: String,

        /// Feed name.
        #[arg(long)]
        name: String,

        /// Network: adrecord, adtraction, tradedoubler, or mapped.
        #[arg(long)]
        network: String,

        /// Feed download URL.
        #[arg(long)]
        url: String,

        /// Keep products whose description is empty.
        #[arg(long)]
        allow_empty_description: bool,

        /// Attach the categories the feed declares for each product.
        #[arg(long)]
        sync_categories: bool,

        /// Field mapping for `mapped` feeds: a JSON file path or inline JSON.
        #[arg(long)]
        mapping: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "feedsync=info",
        1 => "feedsync=debug",
        _ => "feedsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Route a parsed CLI command to its handler.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Update { site } => cmd_run(db.as_deref(), &site, RunKind::Update).await,
        Command::Refresh { site } => cmd_run(db.as_deref(), &site, RunKind::Refresh).await,
        Command::Site { action } => match action {
            SiteAction::Add { name, subdomain } => {
                cmd_site_add(db.as_deref(), &name, &subdomain).await
            }
        },
        Command::Feed { action } => match action {
            FeedAction::Add {
                site,
                name,
                network,
                url,
                allow_empty_description,
                sync_categories,
                mapping,
            } => {
                let request = FeedRequest {
                    site,
                    name,
                    network,
                    url,
                    allow_empty_description,
                    sync_categories,
                    mapping,
                };
                cmd_feed_add(db.as_deref(), request).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(db.as_deref()).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Load config and apply the `--db` override.
fn resolve_config(db: Option<&Path>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(path) = db {
        config.database.path = path.display().to_string();
    }
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.database.resolved_path()?;
    info!(path = %path.display(), "opening catalog database");
    Ok(Storage::open(&path).await?)
}

async fn cmd_run(db: Option<&Path>, subdomain: &str, kind: RunKind) -> Result<()> {
    let config = resolve_config(db)?;
    let storage = Arc::new(open_storage(&config).await?);

    let orchestrator =
        Orchestrator::from_config(storage, &config)?.with_progress(Arc::new(CliProgress::new()));

    let ack = orchestrator.trigger(subdomain, kind).await;
    println!("{}", serde_json::to_string(&ack.response())?);

    let Ack::Accepted { handle, .. } = ack else {
        return Ok(());
    };
    let report = handle.await??;
    print_report(&report);

    if report.failed_feeds() > 0 {
        return Err(eyre!(
            "{} of {} feeds failed",
            report.failed_feeds(),
            report.feeds.len()
        ));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Run {} ({}) of '{}'", report.run_id, report.kind, report.site);
    for feed in &report.feeds {
        match &feed.outcome {
            FeedOutcome::Done(tally) => println!(
                "  {:<24} applied {:>5}  failed {:>4}",
                feed.feed_name, tally.applied, tally.failed
            ),
            FeedOutcome::Failed { kind, message } => {
                println!("  {:<24} FAILED ({kind}): {message}", feed.feed_name)
            }
        }
    }
    println!(
        "  Categories: applied {}  failed {}",
        report.category_pass.applied, report.category_pass.failed
    );
    if report.kind == RunKind::Update {
        println!("  Orphans removed: {}", report.orphans_removed);
    }
    println!("  Time: {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_site_add(db: Option<&Path>, name: &str, subdomain: &str) -> Result<()> {
    let config = resolve_config(db)?;
    let storage = open_storage(&config).await?;

    if storage.find_site(subdomain).await?.is_some() {
        return Err(eyre!("site '{subdomain}' already exists"));
    }
    let id = storage.insert_site(name, subdomain).await?;
    println!("Site '{name}' added (id {id}, subdomain '{subdomain}').");
    Ok(())
}

/// Arguments of `feed add`.
struct FeedRequest {
    site: String,
    name: String,
    network: String,
    url: String,
    allow_empty_description: bool,
    sync_categories: bool,
    mapping: Option<String>,
}

async fn cmd_feed_add(db: Option<&Path>, request: FeedRequest) -> Result<()> {
    let network: NetworkKind = request.network.parse()?;
    let mapping = request.mapping.as_deref().map(read_mapping).transpose()?;
    if network == NetworkKind::Mapped && mapping.is_none() {
        info!("no --mapping given for a mapped feed; using default field names");
    }

    let config = resolve_config(db)?;
    let storage = open_storage(&config).await?;

    let site = storage
        .find_site(&request.site)
        .await?
        .ok_or_else(|| eyre!("site '{}' not found", request.site))?;

    let id = storage
        .insert_feed(&NewFeed {
            site_id: site.id,
            name: request.name.clone(),
            url: request.url,
            network,
            mapping,
            allow_empty_description: request.allow_empty_description,
            sync_categories: request.sync_categories,
        })
        .await?;

    println!(
        "Feed '{}' ({network}) added to site '{}' (id {id}).",
        request.name, site.subdomain
    );
    Ok(())
}

/// Parse a field mapping given inline or as a path to a JSON file.
fn read_mapping(arg: &str) -> Result<FieldMapping> {
    let text = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).map_err(|e| eyre!("failed to read mapping '{arg}': {e}"))?
    };
    serde_json::from_str(&text).map_err(|e| eyre!("invalid field mapping: {e}"))
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(db: Option<&Path>) -> Result<()> {
    let config = resolve_config(db)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl RunProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn feed_settled(&self, report: &FeedReport) {
        let status = match &report.outcome {
            FeedOutcome::Done(tally) => format!("{} applied", tally.applied),
            FeedOutcome::Failed { kind, .. } => format!("failed ({kind})"),
        };
        self.spinner
            .println(format!("  feed '{}': {status}", report.feed_name));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
