mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use projects::metrics_defs::ALL_METRICS;
use shared::metrics_defs::describe_all;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "project-api", about = "Serves project releases, support windows and policies")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Load all projects and serve the API
    Serve {
        #[arg(long)]
        config: PathBuf,
    },
    /// Parse and validate a configuration file, then exit
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not create statsd exporter: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    MetricsRecorder,
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Projects(#[from] projects::ProjectsError),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Serve { config } => serve(&config),
        CliCommand::CheckConfig { config } => Config::from_file(&config)
            .map(|_| println!("{} is valid", config.display()))
            .map_err(CliError::from),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Exiting");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn serve(path: &std::path::Path) -> Result<(), CliError> {
    let config = Config::from_file(path)?;

    let _sentry = init_logging(config.common.logging.as_ref());
    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tracing::info!("Starting project-api");
    rt.block_on(projects::run(config.projects))?;
    Ok(())
}

fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let guard = config
        .and_then(|c| c.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some("project_api"))?;
    metrics::set_global_recorder(recorder).map_err(|_| CliError::MetricsRecorder)?;
    describe_all(ALL_METRICS);
    Ok(())
}
