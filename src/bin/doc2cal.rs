//! CLI binary for doc2cal.
//!
//! Runs the upload endpoint, or the pipeline on a single local file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc2cal::server::{self, AppState};
use doc2cal::{AuthorizationContext, Coordinator, Extractor, PipelineConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the upload form on http://127.0.0.1:5000
  doc2cal serve

  # Add the events from one file to your primary calendar
  doc2cal process flyer.png

  # Only print the extracted text (no API keys needed)
  doc2cal extract agenda.docx

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  DOC2CAL_PROVIDER        Override provider (gemini, openai, anthropic, ollama)
  DOC2CAL_MODEL           Override model ID (default gemini-1.5-flash)
  GOOGLE_ACCESS_TOKEN     OAuth access token with the calendar.events scope
  GOOGLE_REFRESH_TOKEN    Optional, passed through with the access token
  GOOGLE_CLIENT_ID        Optional, passed through with the access token
  GOOGLE_CLIENT_SECRET    Optional, passed through with the access token
  GOOGLE_CALENDAR_ID      Target calendar (default primary)
  TESSERACT_CMD           OCR executable (default tesseract)
  PDFIUM_LIB_PATH         Directory containing libpdfium

A .env file in the working directory is loaded first, if present.
"#;

/// Turn documents into Google Calendar events.
#[derive(Parser, Debug)]
#[command(
    name = "doc2cal",
    version,
    about = "Turn PDFs, Word documents and images into Google Calendar events",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true, env = "DOC2CAL_VERBOSE")]
    verbose: bool,

    /// Errors only; no spinner.
    #[arg(short, long, global = true, env = "DOC2CAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP upload endpoint.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "DOC2CAL_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Add the events found in a local file to the calendar.
    Process {
        /// PDF, DOCX, JPG, PNG or GIF file.
        file: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Print the text extracted from a local file.
    Extract {
        file: PathBuf,

        /// OCR executable.
        #[arg(long, env = "TESSERACT_CMD")]
        tesseract: Option<String>,

        /// Directory containing the pdfium library.
        #[arg(long, env = "PDFIUM_LIB_PATH")]
        pdfium_lib: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "DOC2CAL_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "DOC2CAL_MODEL")]
    model: Option<String>,

    /// Target calendar ID.
    #[arg(long, env = "GOOGLE_CALENDAR_ID", default_value = "primary")]
    calendar: String,

    /// Keep inserting after a failed event and report a partial result.
    #[arg(long, env = "DOC2CAL_CONTINUE_ON_FAILURE")]
    continue_on_failure: bool,

    /// Load the calendar credential from a token.json file instead of
    /// GOOGLE_ACCESS_TOKEN.
    #[arg(long, env = "DOC2CAL_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Timeout for the LLM call in seconds.
    #[arg(long, env = "DOC2CAL_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "DOC2CAL_MAX_UPLOAD_MB", default_value_t = 20)]
    max_upload_mb: usize,

    /// Scratch directory for uploads.
    #[arg(long, env = "DOC2CAL_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// OCR executable.
    #[arg(long, env = "TESSERACT_CMD")]
    tesseract: Option<String>,

    /// Directory containing the pdfium library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before clap reads `env =` defaults.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || matches!(cli.command, Command::Process { .. }) {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { bind, pipeline } => {
            let (config, auth) = build_pipeline(&pipeline)?;
            let coordinator = Coordinator::new(config).context("Failed to set up pipeline")?;
            server::serve(bind, AppState::new(coordinator, auth))
                .await
                .with_context(|| format!("Server on {bind} failed"))?;
        }
        Command::Process { file, pipeline } => {
            let (config, auth) = build_pipeline(&pipeline)?;
            let coordinator = Coordinator::new(config).context("Failed to set up pipeline")?;
            process(&coordinator, &file, &auth, cli.quiet || cli.verbose).await?;
        }
        Command::Extract {
            file,
            tesseract,
            pdfium_lib,
        } => {
            let mut builder = PipelineConfig::builder();
            if let Some(cmd) = tesseract {
                builder = builder.tesseract_cmd(cmd);
            }
            if let Some(dir) = pdfium_lib {
                builder = builder.pdfium_lib_path(dir);
            }
            let extractor = Extractor::from_config(&builder.build()?);
            let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
            let text = extractor
                .extract(&file, ext)
                .await
                .with_context(|| format!("Failed to extract {}", file.display()))?;
            println!("{text}");
        }
    }

    Ok(())
}

fn build_pipeline(args: &PipelineArgs) -> Result<(PipelineConfig, AuthorizationContext)> {
    let mut builder = PipelineConfig::builder()
        .calendar_id(&args.calendar)
        .api_timeout_secs(args.api_timeout)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref m) = args.model {
        builder = builder.model(m);
    }
    if args.continue_on_failure {
        builder = builder.insertion_policy(doc2cal::InsertionPolicy::ContinueOnFailure);
    }
    if let Some(ref dir) = args.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(ref cmd) = args.tesseract {
        builder = builder.tesseract_cmd(cmd);
    }
    if let Some(ref dir) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(dir);
    }
    let config = builder.build()?;

    let auth = match args.token_file {
        Some(ref path) => AuthorizationContext::from_token_file(path)
            .with_context(|| format!("Failed to load credentials from {}", path.display()))?,
        None => AuthorizationContext::from_env()
            .context("No calendar credentials: set GOOGLE_ACCESS_TOKEN or pass --token-file")?,
    };

    Ok((config, auth))
}

async fn process(
    coordinator: &Coordinator,
    file: &Path,
    auth: &AuthorizationContext,
    no_spinner: bool,
) -> Result<()> {
    let spinner = if no_spinner {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(format!("Processing {}", file.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    };

    let result = coordinator.process_path(file, auth).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    match result {
        Ok(summary) => {
            let mark = if summary.failures.is_empty() {
                green("✔")
            } else {
                red("⚠")
            };
            println!("{mark} {}", summary.message());
            if summary.failures.is_empty() {
                Ok(())
            } else {
                anyhow::bail!("{} event(s) could not be created", summary.failures.len())
            }
        }
        Err(e) => {
            eprintln!("{} {}", red("✘"), e);
            std::process::exit(1);
        }
    }
}
