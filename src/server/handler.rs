use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::protocol::{is_valid_query, REJECTION_RESPONSE};
use crate::worker::{CommandExecutor, ExecutionStatus};

/// Stages a connection moves through. Every path ends in `Closed`.
#[derive(Debug)]
enum HandlerState {
    AwaitQuery,
    Validate(Vec<u8>),
    Execute(String),
    Respond(String),
    Closed,
}

/// How a connection was finished, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Read failed, timed out or the client closed before sending anything
    NoQuery,
    /// Query lacked the required prefix; the rejection literal was sent
    Rejected,
    /// Query ran through the executor
    Executed(ExecutionStatus),
}

/// Serves one query per connection: read, validate, execute, respond, close.
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    executor: CommandExecutor,
    read_timeout: Duration,
    buffer_size: usize,
}

impl ConnectionHandler {
    pub fn new(executor: CommandExecutor, read_timeout: Duration, buffer_size: usize) -> Self {
        Self {
            executor,
            read_timeout,
            buffer_size,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            CommandExecutor::new(config.executor.clone()),
            config.read_timeout(),
            config.query_buffer_size,
        )
    }

    /// Drive a connection to completion.
    ///
    /// The stream is owned by this call and dropped on return, so the
    /// connection is released on every path.
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut outcome = ConnectionOutcome::NoQuery;
        let mut state = HandlerState::AwaitQuery;

        loop {
            state = match state {
                HandlerState::AwaitQuery => match self.read_query(&mut stream, peer).await {
                    Some(query) => HandlerState::Validate(query),
                    None => HandlerState::Closed,
                },
                HandlerState::Validate(query) => {
                    if is_valid_query(&query) {
                        HandlerState::Execute(String::from_utf8_lossy(&query).into_owned())
                    } else {
                        tracing::info!(peer = %peer, "Rejected query without 'grep' prefix");
                        outcome = ConnectionOutcome::Rejected;
                        HandlerState::Respond(REJECTION_RESPONSE.to_string())
                    }
                }
                HandlerState::Execute(query) => {
                    tracing::info!(peer = %peer, query = %query, "Received query");
                    let result = self.executor.execute(&query).await;
                    if let Some(reason) = result.failure_reason() {
                        tracing::error!(
                            peer = %peer,
                            reason = %reason,
                            "Query could not be executed, sending empty response"
                        );
                    }
                    outcome = ConnectionOutcome::Executed(result.status);
                    HandlerState::Respond(result.output)
                }
                HandlerState::Respond(body) => {
                    tracing::debug!(peer = %peer, bytes = body.len(), "Sending response");
                    if let Err(e) = Self::respond(&mut stream, body.as_bytes()).await {
                        tracing::warn!(peer = %peer, error = %e, "Failed to write response");
                    }
                    HandlerState::Closed
                }
                HandlerState::Closed => break,
            };
        }

        tracing::debug!(peer = %peer, outcome = ?outcome, "Connection closed");
        outcome
    }

    /// Single bounded read of the query. Returns `None` when no query arrived.
    async fn read_query<S>(&self, stream: &mut S, peer: SocketAddr) -> Option<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; self.buffer_size];
        match timeout(self.read_timeout, stream.read(&mut buffer)).await {
            Ok(Ok(0)) => {
                tracing::debug!(peer = %peer, "Client closed before sending a query");
                None
            }
            Ok(Ok(n)) => {
                buffer.truncate(n);
                Some(buffer)
            }
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer, error = %e, "Error reading query");
                None
            }
            Err(_) => {
                tracing::warn!(
                    peer = %peer,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Timed out waiting for query"
                );
                None
            }
        }
    }

    async fn respond<S>(stream: &mut S, body: &[u8]) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(body).await?;
        stream.shutdown().await
    }
}
