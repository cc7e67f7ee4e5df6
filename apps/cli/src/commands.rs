//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aidigest_core::digest::{CategoryGroup, group_by_category, insights_for_date};
use aidigest_core::{Pipeline, ProgressReporter, RunSummary, Stage, cleanup_older_than};
use aidigest_shared::{
    AiDigestError, AppConfig, SourceConfig, config_file_path, expand_home, init_config,
    load_config, load_config_from,
};
use aidigest_storage::Storage;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// aidigest: collect, filter and analyze daily AI industry news.
#[derive(Parser)]
#[command(
    name = "aidigest",
    version,
    about = "Collect AI news from feeds, papers, model hubs and more, then analyze it into a daily digest.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.aidigest/aidigest.toml).
    #[arg(long, global = true, env = "AIDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding `storage.db_path`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch, filter, store and analyze, then print today's digest.
    Full,

    /// Fetch, filter and store new content without analyzing it.
    Fetch,

    /// Analyze stored content that has not been processed yet.
    Process,

    /// Print the insights created on one day.
    Digest {
        /// Day to report, as YYYY-MM-DD (UTC). Defaults to today.
        #[arg(long)]
        date: Option<String>,

        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show processing statistics.
    Status,

    /// Delete processed content older than N days.
    Cleanup {
        /// Age in days (defaults to `storage.retention_days`).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Source registry management.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Source registry subcommands.
#[derive(Subcommand)]
pub(crate) enum SourcesAction {
    /// List registered sources.
    List,
    /// Add or update registry entries from the config file's `[[sources]]`.
    Sync,
    /// Activate a source.
    Enable { name: String },
    /// Deactivate a source.
    Disable { name: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
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
        0 => "aidigest=info",
        1 => "aidigest=debug",
        _ => "aidigest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref())?;
    let db_path = match &cli.db {
        Some(p) => p.clone(),
        None => expand_home(&config.storage.db_path)?,
    };

    match cli.command {
        Command::Full => cmd_full(&config, &db_path).await,
        Command::Fetch => cmd_fetch(&config, &db_path).await,
        Command::Process => cmd_process(&config, &db_path).await,
        Command::Digest { date, format } => cmd_digest(&db_path, date.as_deref(), format).await,
        Command::Status => cmd_status(&db_path).await,
        Command::Cleanup { days } => {
            cmd_cleanup(&db_path, days.unwrap_or(config.storage.retention_days)).await
        }
        Command::Sources { action } => match action {
            SourcesAction::List => cmd_sources_list(&db_path).await,
            SourcesAction::Sync => cmd_sources_sync(&config, &db_path).await,
            SourcesAction::Enable { name } => cmd_sources_toggle(&db_path, &name, true).await,
            SourcesAction::Disable { name } => cmd_sources_toggle(&db_path, &name, false).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(cli.config.as_deref(), force),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

async fn open_storage(db_path: &Path) -> Result<Arc<Storage>> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| AiDigestError::io(dir, e))?;
    }
    Ok(Arc::new(Storage::open(db_path).await?))
}

/// Active registry entries, seeding the registry from config when empty.
async fn active_sources(config: &AppConfig, storage: &Storage) -> Result<Vec<SourceConfig>> {
    if storage.count_sources().await? == 0 {
        info!(count = config.sources.len(), "seeding source registry from config");
        for source in &config.sources {
            storage.upsert_source(source).await?;
        }
    }
    let sources = storage.list_sources(true).await?;
    if sources.is_empty() {
        return Err(eyre!(
            "no active sources. Add [[sources]] to the config and run `aidigest sources sync`."
        ));
    }
    Ok(sources)
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_full(config: &AppConfig, db_path: &Path) -> Result<()> {
    let storage = open_storage(db_path).await?;
    let sources = active_sources(config, &storage).await?;
    let pipeline = Pipeline::from_config(config, storage.clone())?;

    info!(sources = sources.len(), "running full pipeline");
    let reporter = CliProgress::new();
    let summary = pipeline.run_full(&sources, &reporter).await;
    print_summary("Full run", &summary);
    ensure_success(&summary)?;

    let today = Utc::now().date_naive();
    let groups = group_by_category(insights_for_date(&storage, today).await?);
    print_digest(today, &groups);
    Ok(())
}

async fn cmd_fetch(config: &AppConfig, db_path: &Path) -> Result<()> {
    let storage = open_storage(db_path).await?;
    let sources = active_sources(config, &storage).await?;
    let pipeline = Pipeline::from_config(config, storage)?;

    let reporter = CliProgress::new();
    let summary = pipeline.fetch_and_store(&sources, &reporter).await;
    print_summary("Fetch", &summary);
    ensure_success(&summary)
}

async fn cmd_process(config: &AppConfig, db_path: &Path) -> Result<()> {
    let storage = open_storage(db_path).await?;
    let pipeline = Pipeline::from_config(config, storage)?;

    let reporter = CliProgress::new();
    let summary = pipeline.process_unprocessed(&reporter).await;
    print_summary("Process", &summary);
    ensure_success(&summary)
}

fn ensure_success(summary: &RunSummary) -> Result<()> {
    if summary.success {
        return Ok(());
    }
    let stage = summary.failed_stage.unwrap_or(Stage::Failed);
    Err(eyre!(
        "run failed during {stage}: {}",
        summary.error.as_deref().unwrap_or("unknown error")
    ))
}

fn print_summary(title: &str, summary: &RunSummary) {
    println!();
    if summary.success {
        println!("  {title} complete");
    } else {
        println!("  {title} failed");
    }
    if summary.fetched > 0 || summary.stored > 0 || summary.skipped > 0 {
        println!("  Fetched:    {}", summary.fetched);
        println!("  Unique:     {}", summary.deduped);
        println!("  Kept:       {}", summary.filtered);
        println!(
            "  Stored:     {} new, {} already stored, {} failed",
            summary.stored, summary.skipped, summary.store_failed
        );
    }
    if summary.processed > 0 || summary.failed > 0 {
        println!("  Analyzed:   {} ok, {} failed", summary.processed, summary.failed);
    }
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    if let Some(error) = &summary.error {
        println!("  Error:      {error}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// Reporting commands
// ---------------------------------------------------------------------------

async fn cmd_digest(db_path: &Path, date: Option<&str>, format: OutputFormat) -> Result<()> {
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| eyre!("invalid date '{d}' (expected YYYY-MM-DD): {e}"))?,
        None => Utc::now().date_naive(),
    };

    let storage = Storage::open_readonly(db_path).await?;
    let groups = group_by_category(insights_for_date(&storage, date).await?);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&groups)?),
        OutputFormat::Text => print_digest(date, &groups),
    }
    Ok(())
}

fn print_digest(date: NaiveDate, groups: &[CategoryGroup]) {
    let total: usize = groups.iter().map(|g| g.insights.len()).sum();
    println!("AI digest for {date} ({total} insights)");
    if total == 0 {
        println!("  Nothing analyzed yet for this day.");
        return;
    }

    for group in groups {
        println!();
        println!("## {} ({})", group.category, group.insights.len());
        for entry in &group.insights {
            println!();
            println!(
                "  [{:.2}] {} ({})",
                entry.insight.importance_score, entry.title, entry.source_name
            );
            if let Some(url) = &entry.url {
                println!("         {url}");
            }
            println!("         {}", entry.insight.summary);
        }
    }
    println!();
}

async fn cmd_status(db_path: &Path) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let stats = storage.processing_stats().await?;
    let sources = storage.list_sources(false).await?;
    let active = sources.iter().filter(|s| s.is_active).count();

    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Sources:     {} ({active} active)", sources.len());
    println!("  Stored:      {}", stats.total_raw_content);
    println!("  Processed:   {}", stats.processed_content);
    println!("  Pending:     {}", stats.unprocessed_content);
    println!("  Given up:    {}", stats.failed_content);
    println!("  Insights:    {}", stats.total_insights);
    println!("  Rate:        {:.1}%", stats.processing_rate());
    if !stats.by_source_type.is_empty() {
        println!("  By kind:");
        for (kind, count) in &stats.by_source_type {
            println!("    {kind:<8} {count}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_cleanup(db_path: &Path, days: u32) -> Result<()> {
    let storage = open_storage(db_path).await?;
    let removed = cleanup_older_than(&storage, days).await?;
    println!("Removed {removed} processed items older than {days} days.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Source registry commands
// ---------------------------------------------------------------------------

async fn cmd_sources_list(db_path: &Path) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let sources = storage.list_sources(false).await?;
    if sources.is_empty() {
        println!("No sources registered. Run `aidigest sources sync`.");
        return Ok(());
    }

    println!("{:<4} {:<8} {:<8} {:<28} URL", "PRI", "ACTIVE", "KIND", "NAME");
    for s in &sources {
        let mut state = if s.is_active { "yes" } else { "no" }.to_string();
        if !s.is_configured() {
            state.push('*');
        }
        println!(
            "{:<4} {:<8} {:<8} {:<28} {}",
            s.priority, state, s.source_type, s.source_name, s.source_url
        );
    }
    if sources.iter().any(|s| !s.is_configured()) {
        println!();
        println!("* not configured yet; skipped during fetch");
    }
    Ok(())
}

async fn cmd_sources_sync(config: &AppConfig, db_path: &Path) -> Result<()> {
    let storage = open_storage(db_path).await?;
    for source in &config.sources {
        storage.upsert_source(source).await?;
    }
    println!(
        "Synced {} sources ({} registered).",
        config.sources.len(),
        storage.count_sources().await?
    );
    Ok(())
}

async fn cmd_sources_toggle(db_path: &Path, name: &str, active: bool) -> Result<()> {
    let storage = open_storage(db_path).await?;
    if !storage.set_source_active(name, active).await? {
        return Err(eyre!("no source named '{name}'"));
    }
    let verb = if active { "Enabled" } else { "Disabled" };
    println!("{verb} {name}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if target.exists() && !force {
        return Err(eyre!(
            "config already exists at {} (use --force to overwrite)",
            target.display()
        ));
    }
    let path = init_config(Some(&target))?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
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

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        let message = match stage {
            Stage::Idle => "Starting",
            Stage::Fetching => "Fetching sources",
            Stage::Deduping => "Removing duplicates",
            Stage::Filtering => "Filtering by importance",
            Stage::Persisting => "Storing content",
            Stage::Classifying => "Analyzing content",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        };
        self.spinner.set_message(message);
    }

    fn source_fetched(&self, source: &str, count: usize, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {source}: {count} items"));
    }

    fn item_classified(&self, current: usize, total: usize) {
        self.spinner.set_message(format!("Analyzing [{current}/{total}]"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
