//! Courier binary
//!
//! - `run` (default): process the watched directory now and then every interval
//! - `once`: process a single batch and print how many files were recorded
//! - `status`: summarize the tracking file
//!
//! A `.env` file in the working directory is loaded before arguments are
//! parsed; variables already set in the environment win.
//!
//! First SIGINT/SIGTERM stops after the batch in progress; a second one exits
//! immediately.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use courier::{AidboxSender, Ingestor, ProcessedStore, Scheduler, ShutdownToken, ThreadSleeper};
use courier_logging::{init_logging, LogConfig};
use courier_protocol::{CourierConfig, ProcessedStatus};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Watched-directory HL7v2 ingestion")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Settings that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Directory to watch
    #[arg(long, global = true, env = "DIRECTORY_PATH")]
    directory: Option<PathBuf>,

    /// Base URL of the Aidbox instance
    #[arg(long, global = true, env = "AIDBOX_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, global = true, env = "AIDBOX_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "AIDBOX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, global = true, env = "LOG_FILE_PATH")]
    log_file: Option<PathBuf>,

    /// Tracking file of processed names
    #[arg(long, global = true, env = "PROCESSED_FILES_PATH")]
    processed_files: Option<PathBuf>,

    /// Seconds between batches
    #[arg(long, global = true, env = "SCHEDULE_INTERVAL")]
    interval: Option<u64>,

    /// Seconds between retries of a failed read or send
    #[arg(long, global = true, env = "RETRY_DELAY_SECONDS")]
    retry_delay: Option<u64>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, global = true, env = "REQUEST_TIMEOUT_SECONDS")]
    request_timeout: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut CourierConfig) {
        if let Some(v) = self.directory {
            config.directory_path = v;
        }
        if let Some(v) = self.base_url {
            config.aidbox_base_url = v;
        }
        if let Some(v) = self.username {
            config.aidbox_username = v;
        }
        if let Some(v) = self.password {
            config.aidbox_password = v;
        }
        if let Some(v) = self.log_file {
            config.log_file_path = v;
        }
        if let Some(v) = self.processed_files {
            config.processed_files_path = v;
        }
        if let Some(v) = self.interval {
            config.schedule_interval_secs = v;
        }
        if let Some(v) = self.retry_delay {
            config.retry_delay_secs = v;
        }
        if let Some(v) = self.request_timeout {
            config.request_timeout_secs = v;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the watched directory on a fixed interval (default)
    Run,

    /// Process one batch and exit
    Once,

    /// Summarize the tracking file
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    if let Err(e) = load_env_file(Path::new(".env")) {
        eprintln!("Warning: {:#}", e);
    }
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref(), cli.overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(LogConfig {
        log_file: &config.log_file_path,
        verbose: cli.verbose,
    }) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&config),
        Commands::Once => cmd_once(&config),
        Commands::Status { json } => cmd_status(&config, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load `path` into the process environment. `Ok(false)` when it does not exist.
fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

fn load_config(path: Option<&PathBuf>, overrides: Overrides) -> Result<CourierConfig> {
    let mut config = match path {
        Some(path) => CourierConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CourierConfig::default(),
    };
    overrides.apply(&mut config);
    Ok(config)
}

fn build_ingestor(config: &CourierConfig) -> Result<Ingestor<AidboxSender>> {
    config.validate().context("Invalid configuration")?;
    let sender = AidboxSender::new(config).context("Failed to create HTTP client")?;
    let ingestor = Ingestor::new(config, sender, Arc::new(ThreadSleeper));
    ingestor
        .ensure_directory()
        .context("Failed to create watched directory")?;
    Ok(ingestor)
}

fn cmd_run(config: &CourierConfig) -> Result<()> {
    let ingestor = build_ingestor(config)?;
    info!(
        directory = %config.directory_path.display(),
        endpoint = %config.message_endpoint_url(),
        "Courier starting"
    );

    let shutdown = ShutdownToken::new();
    install_signal_handlers(shutdown.clone())?;

    Scheduler::new(
        &ingestor,
        Arc::new(ThreadSleeper),
        config.schedule_interval(),
        shutdown,
    )
    .run();
    Ok(())
}

fn cmd_once(config: &CourierConfig) -> Result<()> {
    let ingestor = build_ingestor(config)?;
    let recorded = ingestor.process_new_files();
    println!("{}", recorded);
    Ok(())
}

fn cmd_status(config: &CourierConfig, json: bool) -> Result<()> {
    let store = ProcessedStore::new(&config.processed_files_path);
    let records = store.records().context("Failed to read tracking file")?;

    let succeeded = records
        .iter()
        .filter(|r| r.status == ProcessedStatus::Success)
        .count();
    let failed = records.len() - succeeded;
    let distinct: HashSet<&str> = records.iter().map(|r| r.filename.as_str()).collect();

    if json {
        let summary = serde_json::json!({
            "tracking_file": config.processed_files_path.display().to_string(),
            "records": records.len(),
            "success": succeeded,
            "error": failed,
            "files": distinct.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Tracking file: {}", config.processed_files_path.display());
        println!("Records:       {}", records.len());
        println!("  success:     {}", succeeded);
        println!("  error:       {}", failed);
        println!("Files:         {}", distinct.len());
    }
    Ok(())
}

/// First signal requests a graceful stop, the second exits immediately.
fn install_signal_handlers(shutdown: ShutdownToken) -> Result<()> {
    let received = Arc::new(AtomicUsize::new(0));

    let on_signal = move |name: &str| {
        if received.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("Received {}, stopping after the current batch...", name);
            shutdown.request();
        } else {
            warn!("Received {} again, exiting immediately", name);
            std::process::exit(FORCED_EXIT_CODE);
        }
    };

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
        std::thread::spawn(move || {
            for sig in signals.forever() {
                on_signal(&format!("signal {}", sig));
            }
        });
    }

    #[cfg(windows)]
    {
        ctrlc::set_handler(move || on_signal("Ctrl+C"))
            .context("Failed to set Ctrl+C handler")?;
    }

    Ok(())
}
