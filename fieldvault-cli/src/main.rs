//! `fieldvault` CLI: master key generation and the CSFLE / QE walkthroughs.

#![warn(clippy::pedantic, clippy::nursery)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fieldvault::config::{Credentials, DemoConfig, DEFAULT_MASTER_KEY_PATH};
use fieldvault::demo::{csfle, qe};
use fieldvault::driver::RunReport;
use fieldvault::event::{Event, Level, Observer};
use fieldvault::key_provider::KeyProvider;
use fieldvault_key_file::{generate_key_file, KeyEncoding, LocalKeyProvider};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Connection string used when none is configured.
const DEFAULT_URI: &str = "file://fieldvault-store.json";

#[derive(Parser)]
#[command(name = "fieldvault")]
#[command(about = "Client-side field level and queryable encryption walkthroughs", long_about = None)]
struct Cli {
    /// Log library internals (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a local master key file
    Keygen {
        /// Output file
        #[arg(short, long, default_value = DEFAULT_MASTER_KEY_PATH)]
        output: PathBuf,
        /// Write base64 text instead of raw bytes
        #[arg(long)]
        base64: bool,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Client-side field level encryption
    Csfle {
        #[command(subcommand)]
        step: CsfleStep,
    },
    /// Queryable encryption
    Qe {
        #[command(subcommand)]
        step: QeStep,
    },
}

#[derive(Subcommand)]
enum CsfleStep {
    /// Reset the key vault and create one data key per encrypted field
    Vault(RunArgs),
    /// Write and read the sample records through encrypted and plain sessions
    Data(RunArgs),
    /// Both steps in order
    Run(RunArgs),
}

#[derive(Subcommand)]
enum QeStep {
    /// Create an encrypted collection and query it
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Connection string (`memory://<name>` or `file://<path>`)
    #[arg(long)]
    uri: Option<String>,
    /// TOML file with MONGODB_URI and SHARED_LIB_PATH
    #[arg(long)]
    credentials: Option<PathBuf>,
    /// Query-analysis shared library
    #[arg(long)]
    shared_lib: Option<PathBuf>,
    /// Master key file
    #[arg(long, default_value = DEFAULT_MASTER_KEY_PATH)]
    master_key: PathBuf,
    /// Database of the sample collection
    #[arg(long)]
    database: Option<String>,
    /// Sample collection
    #[arg(long)]
    collection: Option<String>,
    /// Key vault namespace
    #[arg(long)]
    key_vault: Option<String>,
}

impl RunArgs {
    /// `--uri`, then `--credentials`, then the environment, then the default.
    fn credentials(&self) -> Result<Credentials> {
        let credentials = if let Some(uri) = &self.uri {
            Credentials::new(uri.clone())
        } else if let Some(path) = &self.credentials {
            Credentials::load(path).with_context(|| format!("loading {}", path.display()))?
        } else {
            Credentials::from_env().unwrap_or_else(|err| {
                debug!(%err, default = DEFAULT_URI, "no credentials configured");
                Credentials::new(DEFAULT_URI)
            })
        };
        Ok(match &self.shared_lib {
            Some(path) => credentials.with_shared_lib_path(Some(path.clone())),
            None => credentials,
        })
    }

    fn config(&self, preset: DemoConfig) -> DemoConfig {
        let mut config = preset.with_master_key_path(self.master_key.clone());
        if let Some(database) = &self.database {
            config = config.with_database(database.clone());
        }
        if let Some(collection) = &self.collection {
            config = config.with_collection(collection.clone());
        }
        if let Some(key_vault) = &self.key_vault {
            config = config.with_key_vault(key_vault.clone());
        }
        config
    }
}

/// Prints flow events for a human reader.
struct Narrator {
    verbose: bool,
}

impl Observer for Narrator {
    fn on_event(&self, event: &Event) {
        match event.level() {
            Level::Debug if !self.verbose => {}
            Level::Warn => eprintln!("{event}"),
            _ => println!("\n{event}"),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "fieldvault=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_provider(config: &DemoConfig) -> Result<Arc<dyn KeyProvider>> {
    let provider = LocalKeyProvider::open(&config.master_key_path).with_context(|| {
        format!(
            "loading master key {} (create one with `fieldvault keygen`)",
            config.master_key_path.display()
        )
    })?;
    Ok(Arc::new(provider))
}

/// Prints the problems of a run; returns whether it reached its end.
fn summarize(flow: &str, report: &RunReport) -> bool {
    for step in report.problems() {
        warn!(flow, step = %step.name, outcome = %step.outcome, "step did not go as declared");
    }
    match report.halted_at() {
        Some(step) => {
            eprintln!("\n{flow} halted at '{step}'");
            false
        }
        None => {
            println!("\n{flow} complete ({} steps)", report.steps().len());
            true
        }
    }
}

fn run_csfle(step: &CsfleStep, narrator: &Narrator) -> Result<bool> {
    let (args, vault, data) = match step {
        CsfleStep::Vault(args) => (args, true, false),
        CsfleStep::Data(args) => (args, false, true),
        CsfleStep::Run(args) => (args, true, true),
    };
    let config = args.config(DemoConfig::csfle());
    let credentials = args.credentials()?;
    let provider = load_provider(&config)?;

    if vault {
        let outcome = csfle::create_vault(&config, &credentials, Arc::clone(&provider), narrator);
        if !summarize("csfle vault", &outcome.report) {
            return Ok(false);
        }
    }
    if data {
        let outcome = csfle::create_data(&config, &credentials, provider, narrator);
        return Ok(summarize("csfle data", &outcome.report));
    }
    Ok(true)
}

fn run_qe(step: &QeStep, narrator: &Narrator) -> Result<bool> {
    let QeStep::Run(args) = step;
    let config = args.config(DemoConfig::qe());
    let credentials = args.credentials()?;
    let provider = load_provider(&config)?;

    let outcome = qe::hello_world(&config, &credentials, provider, narrator);
    Ok(summarize("qe", &outcome.report))
}

fn keygen(output: &Path, base64: bool, force: bool) -> Result<()> {
    if force && output.exists() {
        std::fs::remove_file(output).with_context(|| format!("removing {}", output.display()))?;
    }
    let encoding = if base64 { KeyEncoding::Base64 } else { KeyEncoding::Raw };
    generate_key_file(output, encoding).with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote master key to {}", output.display());
    println!("WARNING: a local key file is for development only");
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let narrator = Narrator { verbose: cli.verbose };

    let complete = match &cli.command {
        Commands::Keygen { output, base64, force } => {
            keygen(output, *base64, *force)?;
            true
        }
        Commands::Csfle { step } => run_csfle(step, &narrator)?,
        Commands::Qe { step } => run_qe(step, &narrator)?,
    };

    Ok(if complete { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
