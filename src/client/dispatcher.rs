use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::result::{FailureReason, Outcome, QueryResult};
use crate::config::DispatchConfig;

/// Fans a query out to a list of workers and collects one result per worker.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Send `query` to every worker concurrently and return their results.
    ///
    /// The returned vector has exactly one entry per worker, ordered by
    /// machine index (the worker's position in `workers`), whatever order the
    /// responses arrived in. Worker failures never fail the call; they show up
    /// as [`Outcome::Failed`] entries.
    ///
    /// Each worker is handled by its own task. Tasks send their result to a
    /// single aggregator task that owns the collection, and the call returns
    /// once every task has reported. At most `max_in_flight` connections are
    /// open at a time.
    pub async fn dispatch(&self, workers: &[String], query: &str) -> Vec<QueryResult> {
        let dispatch_id = Uuid::new_v4();
        let span = tracing::info_span!("dispatch", %dispatch_id, workers = workers.len());
        self.dispatch_inner(workers, query).instrument(span).await
    }

    async fn dispatch_inner(&self, workers: &[String], query: &str) -> Vec<QueryResult> {
        if workers.is_empty() {
            return Vec::new();
        }

        let (result_tx, mut result_rx) = mpsc::channel::<QueryResult>(workers.len());
        let capacity = workers.len();
        let aggregator = tokio::spawn(async move {
            let mut results = Vec::with_capacity(capacity);
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        });

        let in_flight = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let query: Arc<[u8]> = Arc::from(query.as_bytes());

        for (machine_index, address) in workers.iter().enumerate() {
            let result_tx = result_tx.clone();
            let in_flight = in_flight.clone();
            let query = query.clone();
            let config = self.config.clone();
            let address = address.clone();

            tokio::spawn(
                async move {
                    let outcome = match in_flight.acquire_owned().await {
                        Ok(_permit) => query_worker(&address, &query, &config).await,
                        // The semaphore is never closed
                        Err(_) => Outcome::Failed(FailureReason::Io),
                    };
                    let result = QueryResult::new(machine_index, address, outcome);
                    if result_tx.send(result).await.is_err() {
                        tracing::warn!("Aggregator dropped before result was delivered");
                    }
                }
                .in_current_span(),
            );
        }

        // The aggregator finishes once every worker task has dropped its sender
        drop(result_tx);
        let collected = match aggregator.await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, "Result aggregator failed");
                Vec::new()
            }
        };

        let results = complete_in_order(collected, workers);
        let responded = results.iter().filter(|r| r.is_success()).count();
        tracing::info!(responded, failed = results.len() - responded, "Dispatch complete");
        results
    }
}

/// Sort by machine index and fill in any worker whose task never reported.
fn complete_in_order(mut results: Vec<QueryResult>, workers: &[String]) -> Vec<QueryResult> {
    results.sort_by_key(|r| r.machine_index);
    if results.len() == workers.len() {
        return results;
    }

    let mut reported = results.into_iter().peekable();
    workers
        .iter()
        .enumerate()
        .map(|(machine_index, address)| {
            match reported.next_if(|r| r.machine_index == machine_index) {
                Some(result) => result,
                None => {
                    tracing::error!(
                        machine = machine_index,
                        address = %address,
                        "Worker task exited without reporting"
                    );
                    QueryResult::new(
                        machine_index,
                        address.clone(),
                        Outcome::Failed(FailureReason::Io),
                    )
                }
            }
        })
        .collect()
}

/// Connect, send the query, and read the bounded response from one worker.
async fn query_worker(address: &str, query: &[u8], config: &DispatchConfig) -> Outcome {
    let mut stream = match timeout(config.connect_timeout(), TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(address, error = %e, "Worker unreachable");
            return Outcome::Failed(FailureReason::Unreachable);
        }
        Err(_) => {
            tracing::debug!(address, timeout_ms = config.connect_timeout_ms, "Connect timed out");
            return Outcome::Failed(FailureReason::Timeout);
        }
    };

    // One deadline covers both the write and the read
    let request = exchange(&mut stream, query, config.response_buffer_size);
    match timeout(config.io_timeout(), request).await {
        Ok(Ok(response)) => Outcome::Success(String::from_utf8_lossy(&response).into_owned()),
        Ok(Err(e)) => {
            tracing::debug!(address, error = %e, "Worker I/O failed");
            Outcome::Failed(FailureReason::Io)
        }
        Err(_) => {
            tracing::debug!(
                address,
                timeout_ms = config.io_timeout_ms,
                "Worker response timed out"
            );
            Outcome::Failed(FailureReason::Timeout)
        }
    }
}

/// Write the raw query, then read until the worker closes or `limit` bytes
/// have arrived. Anything past `limit` is dropped.
async fn exchange(stream: &mut TcpStream, query: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    stream.write_all(query).await?;

    let mut response = Vec::with_capacity(limit);
    (&mut *stream)
        .take(limit as u64)
        .read_to_end(&mut response)
        .await?;
    Ok(response)
}

/// Dispatch with the default configuration.
pub async fn dispatch(workers: &[String], query: &str) -> Vec<QueryResult> {
    Dispatcher::default().dispatch(workers, query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{}:6120", i)).collect()
    }

    fn ok(machine_index: usize, output: &str) -> QueryResult {
        QueryResult::new(
            machine_index,
            format!("10.0.0.{}:6120", machine_index),
            Outcome::Success(output.to_string()),
        )
    }

    #[test]
    fn complete_in_order_sorts_arrivals() {
        let arrived = vec![ok(2, "c"), ok(0, "a"), ok(1, "b")];
        let results = complete_in_order(arrived, &workers(3));

        let indices: Vec<usize> = results.iter().map(|r| r.machine_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(results[1].output(), "b");
    }

    #[test]
    fn complete_in_order_fills_missing_workers() {
        let arrived = vec![ok(2, "c"), ok(0, "a")];
        let results = complete_in_order(arrived, &workers(4));

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].output(), "a");
        assert_eq!(results[1].failure(), Some(FailureReason::Io));
        assert_eq!(results[1].address, "10.0.0.1:6120");
        assert_eq!(results[2].output(), "c");
        assert_eq!(results[3].failure(), Some(FailureReason::Io));
    }

    #[tokio::test]
    async fn empty_worker_list_returns_nothing() {
        let results = dispatch(&[], "grep foo").await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn unparseable_address_is_unreachable() {
        let workers = vec!["not an address".to_string()];
        let results = dispatch(&workers, "grep foo").await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].failure(), Some(FailureReason::Unreachable));
    }
}
