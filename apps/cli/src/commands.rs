//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docbundle_core::{BundleProgress, extract_knowledge};
use docbundle_firecrawl::FirecrawlClient;
use docbundle_shared::{AppConfig, init_config, load_config, validate_api_keys};
use docbundle_summarize::Summarizer;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docbundle — turn documentation sites into llms.txt knowledge bundles.
#[derive(Parser)]
#[command(
    name = "docbundle",
    version,
    about = "Generate llms.txt / llms-full.txt knowledge bundles from documentation sites.",
    long_about = None,
)]
pub(crate) struct Cli {
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
    /// Generate a knowledge bundle for a documentation site.
    Generate {
        /// Documentation URL to bundle.
        url: String,

        /// Name for the bundle directory (defaults to URL hostname).
        #[arg(short, long)]
        name: Option<String>,

        /// Output directory root (defaults to ./bundles).
        #[arg(short, long)]
        out: Option<String>,

        /// Maximum number of pages to map and process.
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "docbundle=info",
        1 => "docbundle=debug",
        _ => "docbundle=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            url,
            name,
            out,
            max_pages,
        } => cmd_generate(&url, name.as_deref(), out.as_deref(), max_pages).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

async fn cmd_generate(
    url: &str,
    name: Option<&str>,
    out: Option<&str>,
    max_pages: Option<usize>,
) -> Result<()> {
    // Validate API keys before doing anything
    let mut config = load_config()?;
    validate_api_keys(&config)?;

    if let Some(limit) = max_pages {
        config.pipeline.max_pages = limit;
    }

    let parsed_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    // Derive bundle name from hostname if not provided
    let bundle_name = name
        .map(String::from)
        .unwrap_or_else(|| parsed_url.host_str().unwrap_or("unknown").to_string());

    let cwd =
        std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let output_dir = match out {
        Some(p) => PathBuf::from(p),
        None => cwd.join("bundles"),
    }
    .join(&bundle_name);

    let firecrawl_key = std::env::var(&config.firecrawl.api_key_env)
        .map_err(|_| eyre!("missing {} environment variable", config.firecrawl.api_key_env))?;
    let openai_key = std::env::var(&config.openai.api_key_env)
        .map_err(|_| eyre!("missing {} environment variable", config.openai.api_key_env))?;

    let firecrawl = Arc::new(FirecrawlClient::new(
        &config.firecrawl,
        &firecrawl_key,
        config.retry.clone(),
    )?);
    let summarizer = Arc::new(Summarizer::new(
        &config.openai,
        &openai_key,
        config.pipeline.content_limit,
        config.retry.clone(),
    )?);

    info!(url, name = %bundle_name, max_pages = config.pipeline.max_pages, "generating knowledge bundle");

    let reporter = CliProgress::new();
    let started = Instant::now();

    let bundle = extract_knowledge(
        parsed_url.as_str(),
        firecrawl,
        summarizer,
        &config.pipeline,
        &reporter,
    )
    .await?;

    reporter.finish();

    std::fs::create_dir_all(&output_dir)
        .map_err(|e| eyre!("cannot create '{}': {e}", output_dir.display()))?;

    let llms_path = output_dir.join("llms.txt");
    let full_path = output_dir.join("llms-full.txt");
    std::fs::write(&llms_path, &bundle.llms_txt)
        .map_err(|e| eyre!("cannot write '{}': {e}", llms_path.display()))?;
    std::fs::write(&full_path, &bundle.llms_full_txt)
        .map_err(|e| eyre!("cannot write '{}': {e}", full_path.display()))?;

    // Print summary
    println!();
    println!("  Knowledge bundle created!");
    println!("  Source:     {}", bundle.source_url);
    println!(
        "  Pages:      {}/{} succeeded",
        bundle.meta.urls_succeeded, bundle.meta.urls_discovered
    );
    println!("  Index:      {}", llms_path.display());
    println!("  Full text:  {}", full_path.display());
    println!("  Time:       {:.1}s", started.elapsed().as_secs_f64());
    println!();

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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl BundleProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_processed(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing [{current}/{total}] {url}"));
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
