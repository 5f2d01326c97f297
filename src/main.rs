use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

use poi_sandbox::core::{copy_resource, HashAlgo};
use poi_sandbox::runner::{self, ExecutionOutcome, Invocation};
use poi_sandbox::sandbox::{SandboxConfig, SandboxOverrides};

/// Exit status for a non-retryable failure
const EXIT_FAILURE: u8 = 1;
/// Exit status for a failure the caller may retry
const EXIT_RETRYABLE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "poi-sandbox", version, about = "Run commands inside nsjail")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a command inside the sandbox and print the outcome as JSON
    Run {
        /// Wall-clock timeout in seconds (overrides POI_SANDBOX_TIMEOUT_S)
        #[arg(long)]
        timeout: Option<u64>,
        /// TOML file with sandbox overrides; its values win over the environment
        #[arg(long, env = "POI_SANDBOX_CONFIG")]
        config: Option<PathBuf>,
        /// Command and arguments, passed through untouched
        #[arg(required = true, last = true)]
        argv: Vec<String>,
    },
    /// Print the resolved sandbox configuration
    ShowConfig {
        #[arg(long, env = "POI_SANDBOX_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print versions of this tool and the external tools it drives
    Versions,
    /// Hash a file and print the hex digest
    Hash {
        #[arg(long, value_enum, default_value_t = Algo::Keccak)]
        algo: Algo,
        file: PathBuf,
    },
    /// Write a bundled resource (e.g. config/seccomp.policy) to a path
    InstallResource { name: String, dst: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algo {
    Keccak,
    Sha256,
}

impl From<Algo> for HashAlgo {
    fn from(algo: Algo) -> Self {
        match algo {
            Algo::Keccak => HashAlgo::Keccak256,
            Algo::Sha256 => HashAlgo::Sha256,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("poi_sandbox=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            timeout,
            config,
            argv,
        } => {
            let config = match load_config(config.as_deref())? {
                Ok(config) => config,
                Err(failure) => return Ok(report(&failure.into())),
            };
            let timeout = timeout.map(Duration::from_secs).unwrap_or(config.timeout);
            let invocation = Invocation::new(argv, config);

            let outcome = runner::run_with_timeout(&invocation, timeout).await;
            Ok(report(&outcome))
        }
        Commands::ShowConfig { config } => match load_config(config.as_deref())? {
            Ok(config) => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(failure) => Ok(report(&failure.into())),
        },
        Commands::Versions => {
            let info = runner::version_info().await;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hash { algo, file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            println!("{}", HashAlgo::from(algo).hash_hex(&bytes));
            Ok(ExitCode::SUCCESS)
        }
        Commands::InstallResource { name, dst } => {
            copy_resource(&name, &dst)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Environment overrides, with the optional TOML file layered on top.
///
/// The outer error is an I/O problem reading the file; the inner one is a
/// classified configuration failure.
fn load_config(path: Option<&Path>) -> Result<Result<SandboxConfig, poi_sandbox::Failure>> {
    let mut overrides = SandboxOverrides::from_env();

    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sandbox config {:?}", path))?;
        info!("Loaded sandbox overrides from {:?}", path);
        match SandboxOverrides::from_toml_str(&content) {
            Ok(file) => overrides = overrides.merge(file),
            Err(failure) => return Ok(Err(failure)),
        }
    }

    Ok(SandboxConfig::build(&overrides))
}

fn report(outcome: &ExecutionOutcome) -> ExitCode {
    println!("{}", outcome.to_json());

    match outcome.failure() {
        None => ExitCode::SUCCESS,
        Some(failure) => {
            error!("{}", failure);
            if failure.retryable {
                ExitCode::from(EXIT_RETRYABLE)
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}
