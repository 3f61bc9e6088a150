use anyhow::{Context, Result};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessionkit::database::{
    connect_supervised, ConnectionFactory, ScyllaDriver, SupervisorExit, SupervisorState,
};
use sessionkit::load_settings;

#[derive(Parser, Debug)]
#[command(name = "session-probe")]
#[command(about = "Keep a self-healing CQL session open and report its health")]
struct Args {
    #[arg(short, long, default_value = "config/session-probe.yaml")]
    config: String,

    /// Query to run against the live session every `--every-ms`.
    #[arg(short, long)]
    query: Option<String>,

    #[arg(long, default_value = "5000")]
    every_ms: u64,

    /// Print the metrics registry on shutdown.
    #[arg(long)]
    dump_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_probe=info,sessionkit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting session-probe with config {}", args.config);

    let settings = load_settings(&args.config)
        .with_context(|| format!("loading settings from {}", args.config))?;
    let overrides = settings.to_options()?;

    let factory = ConnectionFactory::with_baseline(ScyllaDriver);
    let shutdown = CancellationToken::new();
    let (session, supervisor) =
        connect_supervised(factory, &overrides, settings.supervisor.clone(), shutdown.clone())
            .await
            .context("opening initial session")?;

    info!(
        "Session open against {:?} (keyspace {:?})",
        session.config().hosts,
        session.config().keyspace
    );

    let mut states = supervisor.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                SupervisorState::Recovering { attempt } => {
                    warn!("Session recovering (attempt {})", attempt)
                }
                SupervisorState::Stopped(exit) => {
                    info!("Supervisor stopped: {}", exit.label());
                    break;
                }
                other => tracing::debug!("Supervisor state: {:?}", other),
            }
        }
    });

    if let Some(query) = args.query.clone() {
        let session = session.clone();
        let cancel = shutdown.clone();
        let every = Duration::from_millis(args.every_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(every) => {}
                }
                match session.select::<(String,)>(&query, &[]).await {
                    Ok(rows) => info!("{} -> {} rows", query, rows.len()),
                    Err(e) => warn!("{} failed: {}", query, e),
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            shutdown.cancel();
        }
        _ = wait_stopped(supervisor.subscribe()) => {}
    }

    let exit = supervisor.join().await;
    if args.dump_metrics {
        print_metrics()?;
    }

    match exit {
        SupervisorExit::Cancelled => {
            info!("Session closed");
            Ok(())
        }
        other => {
            let err = other
                .into_error()
                .context("supervisor stopped without an error")?;
            error!("Session lost: {}", err);
            Err(err.into())
        }
    }
}

async fn wait_stopped(mut states: tokio::sync::watch::Receiver<SupervisorState>) {
    let _ = states
        .wait_for(|state| matches!(state, SupervisorState::Stopped(_)))
        .await;
}

fn print_metrics() -> Result<()> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    println!("{}", String::from_utf8(buffer)?);
    Ok(())
}
