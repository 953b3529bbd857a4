//! Command line access to the dataset repositories, meant for scheduled jobs.
//!
//! Set `RUST_LOG=info` (or `debug`) to follow what an update does.

use clap::{Parser, Subcommand};
use log::error;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use weather_repository::{
    RepositoryConfig, RepositoryError, UpdateResult, WeatherRepository, ROOT_ENV_VAR,
};

#[derive(Debug, Parser)]
#[command(name = "weather-repository", version, about = "Maintain on-disk weather dataset repositories")]
struct Cli {
    /// JSON repository configuration. Without it the built-in datasets are used.
    #[arg(long, global = true, env = "WEATHER_REPOSITORY_CONFIG")]
    config: Option<PathBuf>,

    /// Repository root. Takes precedence over the configuration file and
    /// WEATHER_REPOSITORY_ROOT.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one update pass for a dataset.
    Update {
        /// Dataset name, see `list`.
        dataset: String,
    },
    /// DESTRUCTIVE: delete the dataset's repository directory and everything in it.
    Erase {
        dataset: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Show the configured datasets with their directory and current scope.
    List,
}

async fn run(cli: Cli) -> Result<ExitCode, RepositoryError> {
    let config = match &cli.config {
        Some(path) => RepositoryConfig::load(path).await?,
        None => RepositoryConfig::default(),
    };
    let root = match cli.root {
        Some(root) => root,
        None => config.resolve_root()?,
    };

    match cli.command {
        Command::Update { dataset } => {
            let repository = WeatherRepository::open(config.dataset(&dataset)?.clone(), &root)?;
            let report = repository.update().await?;
            println!(
                "{}: update {} ({} processed, {} failed, {} up to date)",
                dataset, report.result, report.processed, report.failed, report.skipped
            );
            Ok(match report.result {
                UpdateResult::Failed => ExitCode::FAILURE,
                UpdateResult::Completed | UpdateResult::TimedOut => ExitCode::SUCCESS,
            })
        }
        Command::Erase { dataset, yes } => {
            let repository = WeatherRepository::open(config.dataset(&dataset)?.clone(), &root)?;
            if !yes {
                eprintln!(
                    "Refusing to erase {:?} without --yes",
                    repository.directory()
                );
                return Ok(ExitCode::from(2));
            }
            repository.purge_repository().await?;
            println!("{}: erased {:?}", dataset, repository.directory());
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            println!("root: {:?} (override with --root or {})", root, ROOT_ENV_VAR);
            for dataset in &config.datasets {
                match WeatherRepository::open(dataset.clone(), &root) {
                    Ok(repository) => println!(
                        "{:<12} {:<10} {:?} scope {}",
                        dataset.name,
                        dataset.granularity,
                        repository.directory(),
                        repository
                            .scope()
                            .map(|scope| scope.to_string())
                            .unwrap_or_else(|e| e.to_string())
                    ),
                    Err(e) => println!("{:<12} invalid: {}", dataset.name, e),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
