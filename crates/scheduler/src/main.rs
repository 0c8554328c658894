//! ShortHub Scheduler
//!
//! Fires the periodic jobs on their cron triggers:
//! 1. Deadline reminders for open assignments
//! 2. Subscriber sync of destination channels
//! 3. Cleanup of old read notifications
//!
//! `scheduler run <job>` executes one job immediately and exits.

mod triggers;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use shorthub_common::{
    config::{AppConfig, ObservabilityConfig},
    jobs::JobKind,
    metrics, AppServices, VERSION,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scheduler")]
#[command(about = "Runs ShortHub periodic jobs on their cron triggers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Keep running and fire jobs on schedule (default)
    Serve,
    /// Run one job now and exit
    Run {
        /// deadline-reminder, subscriber-sync or notification-cleanup
        job: JobKind,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let command = Cli::parse().command.unwrap_or(Command::Serve);

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting ShortHub Scheduler v{}", VERSION);

    metrics::register_metrics();

    info!("Connecting to database...");
    let services = AppServices::build(config).await?;

    match command {
        Command::Run { job } => {
            let summary = services.jobs.run(job).await?;
            info!(
                job = %job,
                examined = summary.examined,
                processed = summary.processed,
                failed = summary.failed,
                "Manual run complete"
            );
        }
        Command::Serve => {
            install_metrics_exporter(&services.config.observability)?;

            let mut scheduler = triggers::build(&services).await?;
            scheduler.start().await?;
            info!("Scheduler ready");

            shutdown_signal().await;

            scheduler.shutdown().await?;
            info!("Scheduler shutdown complete");
        }
    }
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }
    // Next port up so it can share a host with the gateway
    let port = config.metrics_port.saturating_add(1);
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    info!(port, "Prometheus exporter listening");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Command>, clap::Error> {
        Cli::try_parse_from(std::iter::once("scheduler").chain(args.iter().copied())).map(|cli| cli.command)
    }

    #[test]
    fn test_no_arguments_serves() {
        assert_eq!(parse(&[]).unwrap(), None);
        assert_eq!(parse(&["serve"]).unwrap(), Some(Command::Serve));
    }

    #[test]
    fn test_run_parses_job_name() {
        assert_eq!(
            parse(&["run", "subscriber-sync"]).unwrap(),
            Some(Command::Run {
                job: JobKind::SubscriberSync
            })
        );
    }

    #[test]
    fn test_bad_invocations_are_rejected() {
        assert!(parse(&["run"]).is_err());
        assert!(parse(&["run", "backup"]).is_err());
        assert!(parse(&["serve", "now"]).is_err());
    }
}
