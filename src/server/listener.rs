use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{DgrepError, Result};
use crate::server::handler::ConnectionHandler;

/// Worker server: accepts connections and hands each one to a
/// [`ConnectionHandler`] task.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    handler: Arc<ConnectionHandler>,
    connections: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`DgrepError::Bind`] if the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| DgrepError::Bind {
                addr: config.listen_addr,
                source,
            })?;

        Ok(Self {
            listener,
            handler: Arc::new(ConnectionHandler::from_config(&config)),
            connections: Arc::new(Semaphore::new(config.max_connections.max(1))),
            config,
        })
    }

    /// Address the listener is bound to (resolves port 0 to the actual port)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until `shutdown` is cancelled or accept fails.
    ///
    /// Handlers run as independent tasks; the loop only waits on a connection
    /// permit, never on handler work. After cancellation the server waits up
    /// to the configured drain timeout for in-flight handlers.
    ///
    /// # Errors
    ///
    /// Returns [`DgrepError::Accept`] on the first accept failure. Handlers
    /// already running are left to finish on their own.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr().unwrap_or(self.config.listen_addr),
            max_connections = self.config.max_connections,
            "Waiting for clients"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.connections.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!(error = %e, "Error accepting connection");
                        return Err(DgrepError::Accept(e));
                    }
                },
            };

            tracing::info!(peer = %peer, "Client connected");
            let handler = self.handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                handler.handle(stream, peer).await;
            });
        }

        self.drain().await;
        Ok(())
    }

    /// Wait for in-flight handlers by reclaiming every connection permit.
    async fn drain(&self) {
        let total = u32::try_from(self.config.max_connections.max(1)).unwrap_or(u32::MAX);
        let in_flight = (total as usize).saturating_sub(self.connections.available_permits());
        tracing::info!(in_flight, "Shutting down, draining connections");

        match tokio::time::timeout(
            self.config.drain_timeout(),
            self.connections.acquire_many(total),
        )
        .await
        {
            Ok(_) => tracing::info!("All connections drained"),
            Err(_) => tracing::warn!(
                timeout_ms = self.config.drain_timeout_ms,
                "Drain timed out with connections still open"
            ),
        }
    }
}

/// Bind `config.listen_addr` and serve until `shutdown` is cancelled.
pub async fn serve(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    Server::bind(config).await?.run(shutdown).await
}
