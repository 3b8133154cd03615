use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::sync::{CommitOutcome, Debouncer, Puller};

use crate::http_server;
use crate::service_config::Config;
use crate::service_state::{State, StateSetupError};

/// Handle to a running service.
#[derive(Debug)]
pub struct ShutdownHandle {
    shutdown_tx: watch::Sender<()>,
    local_addr: SocketAddr,
    join: JoinHandle<()>,
}

impl ShutdownHandle {
    /// Address the HTTP listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the service to stop. Returns immediately; use [`Self::wait`] to
    /// block until the final flush is done.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "service supervisor panicked");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Setup(#[from] StateSetupError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Start every component and return once the HTTP listener is bound.
///
/// Order: vault and coordinator (including the initial pull), then the
/// debouncer and puller, then the listener.
pub async fn start_service(config: &Config) -> Result<(State, ShutdownHandle), ServiceError> {
    let state = State::from_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let mut loops = vec![
        Debouncer::new(state.coordinator().clone(), config.debounce).spawn(shutdown_rx.clone()),
    ];
    if let Some(puller) = Puller::new(state.coordinator().clone(), config.pull_interval) {
        loops.push(puller.spawn(shutdown_rx.clone()));
    }

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| ServiceError::Bind {
            addr: config.listen_addr,
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| ServiceError::Bind {
        addr: config.listen_addr,
        source,
    })?;
    tracing::info!(addr = %local_addr, bucket = %config.bucket, "s3 gateway listening");

    let server = tokio::spawn(http_server::run(
        listener,
        state.clone(),
        shutdown_rx.clone(),
    ));
    let join = tokio::spawn(supervise(state.clone(), server, loops));

    Ok((
        state,
        ShutdownHandle {
            shutdown_tx,
            local_addr,
            join,
        },
    ))
}

/// Run the service until ctrl-c or SIGTERM.
pub async fn spawn_service(config: &Config) -> Result<(), ServiceError> {
    let (_state, handle) = start_service(config).await?;
    shutdown_signal().await;
    tracing::info!("shutdown requested");
    handle.shutdown();
    handle.wait().await;
    Ok(())
}

/// Wait for the server and loops to stop, then make one bounded attempt to
/// publish whatever is still pending.
async fn supervise(
    state: State,
    server: JoinHandle<std::io::Result<()>>,
    loops: Vec<JoinHandle<()>>,
) {
    match server.await {
        Ok(Ok(())) => tracing::info!("http server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "http server failed"),
        Err(e) => tracing::error!(error = %e, "http server task panicked"),
    }
    for result in futures::future::join_all(loops).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "sync loop panicked");
        }
    }

    if state.tracker().is_dirty() {
        let grace = state.config().shutdown_grace;
        match tokio::time::timeout(grace, state.coordinator().flush()).await {
            Ok(Ok(CommitOutcome::Synced { generation, .. })) => {
                tracing::info!(generation, "pending changes published before exit")
            }
            Ok(Ok(outcome)) => tracing::info!(?outcome, "final flush done"),
            Ok(Err(e)) => tracing::warn!(error = %e, "final flush failed, changes remain in the working tree"),
            Err(_) => tracing::warn!(?grace, "final flush did not finish within the shutdown grace period"),
        }
    }
    tracing::info!("service stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
}
