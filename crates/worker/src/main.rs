use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use parkcast_core::training::TrainingConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parkcast_worker::cli::{cities, Cli, Command};
use parkcast_worker::jobs::{run_fetch, run_process, run_reconcile, run_train};
use parkcast_worker::scheduler::{Schedule, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkcast_worker=debug,parkcast_core=info,parkcast_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = parkcast_db::connect_and_migrate(&cli.database_url)
        .await
        .context("failed to initialise storage")?;

    match cli.command.clone() {
        Command::Fetch { city } => {
            let fetcher = cli.fetcher()?;
            for city in cities(city) {
                run_fetch(store.as_ref(), &fetcher, city)
                    .await
                    .with_context(|| format!("fetch {city}"))?;
            }
        }
        Command::Process { city, since } => {
            for city in cities(city) {
                run_process(store.as_ref(), city, since)
                    .await
                    .with_context(|| format!("process {city}"))?;
            }
        }
        Command::Train {
            city,
            garage,
            min_records,
        } => {
            let config = TrainingConfig {
                min_records_per_garage: min_records,
                ..TrainingConfig::default()
            };
            let report = run_train(
                store.as_ref(),
                city,
                garage.as_deref(),
                &cli.model_dir,
                &config,
                Utc::now(),
            )
            .await
            .with_context(|| format!("train {city}"))?;
            tracing::info!(
                version = %report.version,
                n_train = report.n_train,
                n_eval = report.n_eval,
                mae = report.mae,
                rmse = report.rmse,
                r2 = report.r2,
                excluded = report.excluded_garages.len(),
                "Training complete",
            );
        }
        Command::Reconcile {
            city,
            tolerance_minutes,
        } => {
            let tolerance = chrono::Duration::minutes(tolerance_minutes.max(0));
            for city in cities(city) {
                run_reconcile(store.as_ref(), city, Utc::now(), tolerance)
                    .await
                    .with_context(|| format!("reconcile {city}"))?;
            }
        }
        Command::Run {
            city,
            fetch_interval_secs,
            train_interval_secs,
        } => {
            let schedule = Schedule {
                cities: cities(city),
                fetch_every: Duration::from_secs(fetch_interval_secs.max(1)),
                train_every: Duration::from_secs(train_interval_secs.max(1)),
                model_dir: cli.model_dir.clone(),
                training: TrainingConfig::default(),
            };
            let scheduler = Scheduler::new(store, cli.fetcher()?, schedule);

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(scheduler.run(cancel.clone()));
            shutdown_signal().await;
            cancel.cancel();
            handle.await.context("scheduler task failed")?;
            tracing::info!("Worker stopped");
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
