//! idmsvc server: application entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idmsvc_server::config::LoggingConfig;
use idmsvc_server::{AppState, Config, bootstrap, create_router, worker};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

#[derive(Parser, Debug)]
#[command(name = "idmsvc-server")]
#[command(about = "Control plane for RHEL IdM domain registration and host enrollment")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the JWK refresh worker (default).
    Serve,
    /// Manage host-conf signing keys.
    Jwk {
        #[command(subcommand)]
        action: JwkCommand,
    },
}

#[derive(Subcommand, Debug)]
enum JwkCommand {
    /// List stored keys and their state.
    List,
    /// Purge expired keys and generate a new one when due.
    Refresh,
    /// Destroy the private half of a key.
    Revoke {
        /// Key id.
        kid: String,
    },
    /// Delete expired keys.
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("load configuration")?;
    init_tracing(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Jwk { action } => jwk(&config, action).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let directive: Directive = format!("idmsvc={}", logging.level)
        .parse()
        .with_context(|| format!("parse logging.level '{}'", logging.level))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting idmsvc server...");
    let state = bootstrap(&config).await?;

    let report = state
        .service
        .keys()
        .refresh()
        .await
        .context("initial JWK refresh")?;
    tracing::info!(
        valid = report.valid,
        generated = ?report.generated,
        "Host-conf signing keys ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = worker::spawn_jwk_refresh(
        Arc::clone(&state),
        Duration::from_secs(config.hostconf_jwk.refresh_interval_secs),
        shutdown_rx,
    );

    let app = create_router(state, &config.web);
    let listener = tokio::net::TcpListener::bind(config.web.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.web.bind_addr))?;
    tracing::info!(addr = %config.web.bind_addr, "idmsvc listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server")?;

    let _ = shutdown_tx.send(true);
    refresher.await.context("join JWK refresh worker")?;
    tracing::info!("idmsvc server stopped.");
    Ok(())
}

async fn jwk(config: &Config, action: JwkCommand) -> Result<()> {
    let state: Arc<AppState> = bootstrap(config).await?;
    let keys = state.service.keys();
    match action {
        JwkCommand::List => {
            for key in keys.list().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    key.key_id,
                    key.state,
                    key.expires_at.to_rfc3339(),
                    key.encryption_id
                );
            }
        }
        JwkCommand::Refresh => {
            let report = keys.refresh().await?;
            println!(
                "purged {}, valid {}, expired {}, revoked {}, generated {}",
                report.purged,
                report.valid,
                report.expired,
                report.revoked,
                report.generated.as_deref().unwrap_or("-")
            );
        }
        JwkCommand::Revoke { kid } => {
            let key = keys.revoke(&kid).await?;
            println!("revoked {}", key.key_id);
        }
        JwkCommand::Purge => {
            let purged = keys.purge_expired().await?;
            for key in &purged {
                println!("purged {}", key.key_id);
            }
            println!("{} key(s) purged", purged.len());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
