//! HTTP server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{routes::create_router, state::AppState};

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        source: std::io::Error,
    },
    /// Serving failed
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Gateway HTTP server
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server for the given state
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Address from the configuration
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        )
    }

    /// Bind the configured address and serve until a shutdown signal
    ///
    /// # Errors
    /// Returns error if binding or serving fails
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        self.serve(listener, async {
            shutdown_signal().await;
        })
        .await
    }

    /// Serve on an existing listener until `shutdown` resolves.
    ///
    /// In-flight requests get the configured shutdown timeout to finish.
    ///
    /// # Errors
    /// Returns error if serving fails
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: Option<SocketAddr> = listener.local_addr().ok();
        let timeout = self.state.config.server.shutdown_timeout;
        let environment = self.state.config.server.environment.clone();
        let router = create_router(self.state);

        info!(
            address = ?local,
            environment = %environment,
            "Gateway listening"
        );

        let (tx, mut rx) = tokio::sync::watch::channel(false);
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            shutdown.await;
            let _ = tx.send(true);
        });

        tokio::select! {
            result = serve => result?,
            () = drain_deadline(&mut rx, timeout) => {
                warn!(timeout = ?timeout, "Graceful shutdown timed out, dropping open connections");
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Resolves `timeout` after shutdown has been requested
async fn drain_deadline(rx: &mut tokio::sync::watch::Receiver<bool>, timeout: Duration) {
    if rx.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

/// Wait for Ctrl-C or SIGTERM and return the signal name
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "sigterm"
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&str>();

    let signal_name = tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
    };

    info!(signal = signal_name, "Received shutdown signal");
    signal_name
}
