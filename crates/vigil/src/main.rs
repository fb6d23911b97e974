//! Vigil command-line launcher.
//!
//! Exit status: 0 when every file succeeded, 1 when every attempted file
//! failed or the command could not run, 2 on partial failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use vigil::commands::{self, EventOptions};
use vigil::config::CONFIG_ENV;
use vigil::{AppContext, CommandStatus, FileSelector, TracingSink};
use vigil_logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Digital preservation control plane")]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create (or recreate) the service index
    SetupIndex,

    /// Rebuild the service index from metadata on disk
    Reindex,

    /// Start managing files
    Register {
        #[command(flatten)]
        selection: Selection,

        /// Known digests, e.g. sha256:ab12...,md5:9f0e...
        #[arg(long, value_delimiter = ',')]
        checksums: Vec<String>,
    },

    /// Stop managing files (metadata is kept)
    Deregister {
        #[command(flatten)]
        selection: Selection,
    },

    /// Run due preservation services
    Preserve {
        #[command(flatten)]
        selection: Selection,
    },

    /// Run due verification services
    Verify {
        #[command(flatten)]
        selection: Selection,
    },

    /// Check the configuration file and exit
    ValidateConfig,
}

#[derive(Args, Debug)]
struct Selection {
    /// Files to process; a trailing '/' selects everything beneath a directory
    #[arg(short = 'f', long = "file", value_delimiter = ',', conflicts_with = "locations")]
    files: Vec<String>,

    /// Storage locations to process
    #[arg(short = 's', long = "location", value_delimiter = ',')]
    locations: Vec<String>,

    /// Act even when already done or not yet due
    #[arg(long)]
    force: bool,
}

impl Selection {
    fn selector(&self) -> Result<FileSelector> {
        if self.files.is_empty() {
            Ok(FileSelector::from_locations(&self.locations)?)
        } else {
            Ok(FileSelector::from_paths(&self.files)?)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig::new("vigil").verbose(cli.verbose)) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<CommandStatus> {
    let config_path = cli
        .config
        .with_context(|| format!("No configuration file given; pass --config or set {}", CONFIG_ENV))?;

    if let Commands::ValidateConfig = cli.command {
        return Ok(commands::validate_config(&config_path)?);
    }

    let ctx = AppContext::load(&config_path, Arc::new(TracingSink::stdout()))?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let status = runtime.block_on(async {
        match &cli.command {
            Commands::SetupIndex => commands::setup_index(&ctx).await,
            Commands::Reindex => commands::reindex(&ctx).await,
            Commands::Register { selection, checksums } => {
                let options = EventOptions {
                    force: selection.force,
                    checksums: commands::parse_checksums(checksums)?,
                };
                commands::register(&ctx, &selection.selector()?, &options).await
            }
            Commands::Deregister { selection } => {
                commands::deregister(&ctx, &selection.selector()?, &event_options(selection)).await
            }
            Commands::Preserve { selection } => {
                commands::preserve(&ctx, &selection.selector()?, &event_options(selection)).await
            }
            Commands::Verify { selection } => {
                commands::verify(&ctx, &selection.selector()?, &event_options(selection)).await
            }
            Commands::ValidateConfig => Ok(CommandStatus::Success),
        }
        .map_err(anyhow::Error::from)
    })?;

    Ok(status)
}

fn event_options(selection: &Selection) -> EventOptions {
    EventOptions {
        force: selection.force,
        ..EventOptions::default()
    }
}
