pub mod config;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::report;
use crate::run::RunOrchestrator;
use crate::run::types::{ComparisonRequest, RunId, Viewport};
use crate::settings::Settings;

pub use config::FileConfig;

#[derive(Parser)]
#[command(name = "uicompare", version, about = "Visual regression runs with AI feedback")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    pub dotenv: Option<PathBuf>,

    /// Path to a YAML config file (default: auto-detect uicompare.yaml in cwd)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Parse `args` after loading the .env file they name (or the one in
    /// cwd), so `env =` fallbacks see its values.
    pub fn parse_with_env<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        load_dotenv(dotenv_arg(&args).as_deref());
        Self::try_parse_from(args)
    }
}

/// Value of `--dotenv`, found before clap runs.
fn dotenv_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        if arg == "--dotenv" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.to_str().and_then(|a| a.strip_prefix("--dotenv=")) {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Values that feed [`Settings`]. Unset values fall back to the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// Root directory for bitmaps, reports and run records
    #[arg(long, global = true, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Capture engine launch command (default: "npx backstop")
    #[arg(long, global = true, env = "ENGINE_COMMAND")]
    pub engine_command: Option<String>,

    /// Working directory of the capture engine
    #[arg(long, global = true, env = "ENGINE_DIR")]
    pub engine_dir: Option<PathBuf>,

    /// Feedback provider: anthropic, openai or none
    #[arg(long, global = true, env = "LLM_PROVIDER")]
    pub llm_provider: Option<String>,

    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, global = true, env = "ANTHROPIC_MODEL")]
    pub anthropic_model: Option<String>,

    #[arg(long, global = true, env = "ANTHROPIC_BASE_URL")]
    pub anthropic_base_url: Option<String>,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, global = true, env = "OPENAI_MODEL")]
    pub openai_model: Option<String>,

    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server
    Serve {
        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Maximum request body size in bytes (default: 1048576 = 1 MB)
        #[arg(long, env = "MAX_BODY")]
        max_body: Option<usize>,
    },

    /// Run one comparison and print its summary
    Compare {
        /// URL of the known-good page
        #[arg(short, long)]
        reference: String,

        /// URL of the page under test
        #[arg(short, long)]
        test: String,

        /// Viewport key (see `viewports`)
        #[arg(short, long)]
        viewport: Option<String>,
    },

    /// Print the report location and run record of a past run
    Report {
        /// Run ID
        run_id: String,
    },

    /// List available viewports
    Viewports,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse_with_env(std::env::args_os()).unwrap_or_else(|e| e.exit());

    let file_config = FileConfig::load(cli.config.as_deref())?;
    let settings = Arc::new(file_config.resolve(&cli.settings)?);

    match cli.command {
        Commands::Serve {
            host,
            port,
            max_body,
        } => {
            crate::api::serve(
                &file_config.host(host),
                file_config.port(port),
                settings,
                file_config.max_body(max_body),
            )
            .await
        }
        Commands::Compare {
            reference,
            test,
            viewport,
        } => cmd_compare(settings, reference, test, viewport).await,
        Commands::Report { run_id } => cmd_report(settings, run_id).await,
        Commands::Viewports => cmd_viewports(),
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&std::path::Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

async fn cmd_compare(
    settings: Arc<Settings>,
    reference: String,
    test: String,
    viewport: Option<String>,
) -> Result<()> {
    let orchestrator = RunOrchestrator::from_settings(settings.clone());
    let request = ComparisonRequest::new(&reference, &test, viewport.as_deref());

    let summary = orchestrator.run_comparison(request).await?;

    println!("Run ID:   {}", summary.run_id);
    println!("State:    {}", summary.state);
    println!("Viewport: {}", summary.viewport);
    println!("Outcome:  {}", summary.outcome);
    println!("Feedback: {}", serde_json::to_string(&summary.feedback)?);

    match report::fetch_report(&settings.data_dir, &summary.run_id.to_string()).await {
        Ok(entry) => println!("Report:   {}", entry.display()),
        Err(e) => println!("Report:   unavailable ({})", e),
    }
    Ok(())
}

async fn cmd_report(settings: Arc<Settings>, run_id: String) -> Result<()> {
    let entry = report::fetch_report(&settings.data_dir, &run_id).await?;
    println!("{}", entry.display());

    let id = RunId::parse(&run_id)?;
    let store = crate::run::record::RunRecordStore::new(&settings.data_dir);
    if let Ok(record) = store.load(&id).await {
        println!("{}", serde_json::to_string_pretty(&record).context("Failed to encode run record")?);
    }
    Ok(())
}

fn cmd_viewports() -> Result<()> {
    println!("{:<14} {:>6} {:>6}", "VIEWPORT", "WIDTH", "HEIGHT");
    println!("{}", "-".repeat(28));

    for viewport in Viewport::ALL {
        let (width, height) = viewport.dimensions();
        println!("{:<14} {:>6} {:>6}", viewport.label(), width, height);
    }

    println!("\nDefault: {}", Viewport::Desktop);
    Ok(())
}
