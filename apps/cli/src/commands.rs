//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use noirmap_core::{
    CancelHandle, Enricher, GroqClient, PipelineConfig, PipelineStage, ProgressReporter,
    RunOutcome, run_to_file,
};
use noirmap_discovery::NoirScanner;
use noirmap_repository::RepoRef;
use noirmap_shared::{
    AppConfig, EnrichmentConfig, init_config, load_config, load_config_from, resolve_api_key,
    validate_api_key,
};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// noirmap: map a codebase's HTTP API into a Postman collection.
#[derive(Parser)]
#[command(
    name = "noirmap",
    version,
    about = "Discover HTTP endpoints in a repository and emit an enriched Postman collection.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Scan a repository and write a Postman collection for its API.
    Generate(GenerateArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct GenerateArgs {
    /// Local directory or git URL of the repository to scan.
    #[arg(long)]
    pub repo: String,

    /// Base URL the collection's requests target (http or https).
    #[arg(long)]
    pub base_url: String,

    /// Output file (defaults to `<name>.postman_collection.json`).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Branch, tag or commit to check out (remote repositories only).
    #[arg(long)]
    pub rev: Option<String>,

    /// Collection name (defaults to the repository name).
    #[arg(short, long)]
    pub name: Option<String>,

    /// Build the collection from scanner output alone.
    #[arg(long)]
    pub skip_enrichment: bool,

    /// Maximum enrichment requests in flight.
    #[arg(long, env = "NOIRMAP_MAX_CONCURRENCY")]
    pub concurrency: Option<u32>,

    /// Inference requests per minute (0 disables the limit).
    #[arg(long, env = "NOIRMAP_RATE_LIMIT_RPM")]
    pub rate_limit: Option<u32>,

    /// Noir executable.
    #[arg(long, env = "NOIR_BIN")]
    pub noir_bin: Option<String>,

    /// Default bearer token stored in the `authToken` variable.
    #[arg(long, env = "NOIRMAP_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Config file to use instead of `~/.noirmap/noirmap.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,
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
        0 => "noirmap=info",
        1 => "noirmap=debug",
        _ => "noirmap=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays clean for the run summary.
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
    match cli.command {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    apply_overrides(&mut config, &args);

    // Check the credential before any cloning or scanning.
    let enricher = build_enricher(&config, args.skip_enrichment)?;

    let repo = RepoRef::parse(&args.repo)?;
    let mut pipeline = PipelineConfig::new(repo, &args.base_url)?;
    pipeline.revision = args.rev.clone();
    if let Some(name) = args.name.clone().or_else(|| config.collection.name.clone()) {
        pipeline.assembly.collection_name = name;
    }
    pipeline.assembly.body_methods = config.collection.body_methods.clone();
    pipeline.assembly.default_auth_token = args
        .auth_token
        .clone()
        .or_else(|| std::env::var(&config.collection.auth_token_env).ok())
        .filter(|t| !t.trim().is_empty());

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_path(&pipeline.assembly.collection_name));

    let scanner = NoirScanner::new(&config.scanner.binary)
        .with_base_url(&pipeline.assembly.base_url)
        .with_extra_args(config.scanner.extra_args.clone());

    info!(
        repo = %pipeline.repo,
        base_url = %pipeline.assembly.base_url,
        out = %out.display(),
        enrichment = enricher.is_some(),
        "generating collection"
    );

    let cancel = CancelHandle::new();
    let token = cancel.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let reporter = CliProgress::new();
    let result = run_to_file(
        &pipeline,
        &scanner,
        enricher.clone(),
        &token,
        &reporter,
        &out,
    )
    .await;
    reporter.clear();

    let (outcome, written) = result?;

    if let Some(enricher) = &enricher {
        let (hits, misses) = enricher.cache_stats();
        info!(cache_hits = hits, cache_misses = misses, "enrichment cache");
    }

    println!();
    println!("  Collection written!");
    println!("  Run:       {}", outcome.run_id);
    println!("  Name:      {}", outcome.collection.info.name);
    println!("  Endpoints: {}", outcome.endpoint_count);
    println!("  Requests:  {}", outcome.collection.request_count());
    println!("  Path:      {}", written.path.display());
    println!("  SHA-256:   {}", written.sha256);
    println!("  Time:      {:.1}s", outcome.elapsed.as_secs_f64());

    if !outcome.warnings.is_empty() {
        println!();
        println!("  Warnings ({}):", outcome.warnings.len());
        for warning in &outcome.warnings {
            println!("  - {warning}");
        }
    }
    println!();

    Ok(())
}

/// The LLM enricher, or `None` with `--skip-enrichment`.
///
/// Fails when the inference API key is missing.
fn build_enricher(config: &AppConfig, skip: bool) -> Result<Option<Arc<Enricher>>> {
    if skip {
        return Ok(None);
    }
    validate_api_key(config)?;
    let key = resolve_api_key(config)?;
    let enrichment = EnrichmentConfig::from(config);
    let backend = GroqClient::new(&enrichment, Some(key))?;
    Ok(Some(Arc::new(Enricher::new(Arc::new(backend), enrichment))))
}

/// CLI flags and env vars win over the config file.
fn apply_overrides(config: &mut AppConfig, args: &GenerateArgs) {
    if let Some(concurrency) = args.concurrency {
        config.inference.max_concurrency = concurrency;
    }
    if let Some(rpm) = args.rate_limit {
        config.inference.requests_per_minute = rpm;
    }
    if let Some(bin) = &args.noir_bin {
        config.scanner.binary = bin.clone();
    }
}

/// `<name>.postman_collection.json` in the working directory.
fn default_output_path(collection_name: &str) -> PathBuf {
    let stem: String = collection_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let stem = stem.trim_matches('-');
    let stem = if stem.is_empty() { "collection" } else { stem };
    Path::new(".").join(format!("{stem}.postman_collection.json"))
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

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: PipelineStage) {
        let message = match stage {
            PipelineStage::Acquiring => "Fetching repository",
            PipelineStage::Discovering => "Scanning for endpoints",
            PipelineStage::Enriching => "Enriching endpoints",
            PipelineStage::Assembling => "Assembling collection",
            PipelineStage::Writing => "Writing collection",
            PipelineStage::Done => "Done",
        };
        self.spinner.set_message(message);
    }

    fn endpoints_discovered(&self, count: usize) {
        self.spinner.set_message(format!("Found {count} endpoints"));
    }

    fn endpoint_enriched(&self, label: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] {label}"));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
