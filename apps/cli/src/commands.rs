//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ramlpreparer_core::{
    BatchReport, CommandRenderer, DocumentOutcome, DocumentStatus, ProgressReporter, Source,
    discover_sources, prepare_all,
};
use ramlpreparer_shared::{PreparerConfig, init_config, load_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ramlpreparer: prepare RAML API references for publishing.
#[derive(Parser)]
#[command(
    name = "ramlpreparer",
    version,
    about = "Render RAML API references and wrap them in JSON content envelopes.",
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
    /// Render and envelope RAML documents.
    Prepare {
        /// RAML files to prepare. Defaults to every `.raml` file under the
        /// source root.
        sources: Vec<PathBuf>,

        /// Content repository root; docnames are relative to it.
        #[arg(long, default_value = ".")]
        source_root: PathBuf,

        /// Config file to use instead of `~/.ramlpreparer/ramlpreparer.toml`.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory that receives the envelopes.
        #[arg(long)]
        envelope_dir: Option<PathBuf>,

        /// Maximum documents prepared at once.
        #[arg(long)]
        concurrency: Option<u32>,
    },

    /// Check that the renderer is installed, installing it if needed.
    Setup {
        /// Config file to use instead of `~/.ramlpreparer/ramlpreparer.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
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
    /// Show resolved configuration for a content repository.
    Show {
        /// Content repository root to resolve `_deconst.json` from.
        #[arg(long, default_value = ".")]
        source_root: PathBuf,

        /// Config file to use instead of `~/.ramlpreparer/ramlpreparer.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ramlpreparer=info",
        1 => "ramlpreparer=debug",
        _ => "ramlpreparer=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
        Command::Prepare {
            sources,
            source_root,
            config,
            envelope_dir,
            concurrency,
        } => {
            let overrides = Overrides {
                envelope_dir,
                concurrency,
            };
            cmd_prepare(sources, &source_root, config.as_deref(), overrides).await
        }
        Command::Setup { config } => cmd_setup(config.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show {
                source_root,
                config,
            } => cmd_config_show(&source_root, config.as_deref()).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Values given on the command line, applied last.
#[derive(Debug, Default)]
struct Overrides {
    envelope_dir: Option<PathBuf>,
    concurrency: Option<u32>,
}

fn base_config(path: Option<&Path>) -> Result<PreparerConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Layer `_deconst.json`, the environment and CLI flags over `config`.
///
/// Asset references resolve against the source root unless a source
/// directory is configured explicitly.
fn layer_config(
    mut config: PreparerConfig,
    source_root: &Path,
    env: impl Fn(&str) -> Option<String>,
    overrides: Overrides,
) -> Result<PreparerConfig> {
    config.apply_deconst_json(source_root)?;
    config.apply_env(env);

    if let Some(dir) = overrides.envelope_dir {
        config.envelope.envelope_dir = Some(dir);
    }
    if let Some(n) = overrides.concurrency {
        config.batch.concurrency = n;
    }
    if config.assets.original_asset_dir.is_none() {
        config.assets.original_asset_dir = Some(source_root.to_path_buf());
    }

    Ok(config)
}

fn resolve_config(
    config_path: Option<&Path>,
    source_root: &Path,
    overrides: Overrides,
) -> Result<PreparerConfig> {
    layer_config(
        base_config(config_path)?,
        source_root,
        |name| std::env::var(name).ok(),
        overrides,
    )
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_prepare(
    sources: Vec<PathBuf>,
    source_root: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<()> {
    let config = resolve_config(config_path, source_root, overrides)?;

    let sources: Vec<Source> = if sources.is_empty() {
        discover_sources(source_root)?
    } else {
        sources
            .into_iter()
            .map(|path| Source::new(path, source_root))
            .collect()
    };
    if sources.is_empty() {
        return Err(eyre!(
            "no .raml sources found under '{}'",
            source_root.display()
        ));
    }

    info!(count = sources.len(), root = %source_root.display(), "preparing documents");

    let renderer = Arc::new(CommandRenderer::new(config.renderer.clone()));
    let reporter = CliProgress::new();
    let report = prepare_all(Arc::new(config), renderer, sources, &reporter).await?;

    print_report(&report);

    if report.has_failures() {
        return Err(eyre!(
            "{} of {} document(s) failed",
            report.failed(),
            report.outcomes.len()
        ));
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    for outcome in &report.outcomes {
        match &outcome.status {
            DocumentStatus::Prepared {
                envelope_path,
                warnings,
            } => {
                println!("  ok      {} -> {}", outcome.docname, envelope_path.display());
                for warning in warnings {
                    println!("          warning: {warning}");
                }
            }
            DocumentStatus::Failed { error } => {
                println!("  FAILED  {}: {error}", outcome.docname);
            }
        }
    }
    println!();
    println!("  Prepared: {}", report.prepared());
    println!("  Failed:   {}", report.failed());
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_setup(config_path: Option<&Path>) -> Result<()> {
    let config = base_config(config_path)?;
    let renderer = CommandRenderer::new(config.renderer);
    let version = tokio::task::spawn_blocking(move || renderer.setup()).await??;
    println!("Renderer ready: {version}");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(source_root: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path, source_root, Overrides::default())?;
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

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_finished(&self, outcome: &DocumentOutcome, current: usize, total: usize) {
        let mark = if outcome.is_failed() { "failed" } else { "done" };
        self.spinner
            .set_message(format!("[{current}/{total}] {} {mark}", outcome.docname));
    }

    fn done(&self, _report: &BatchReport) {
        self.spinner.finish_and_clear();
    }
}
