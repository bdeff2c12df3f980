use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{QUERY_BUFFER_SIZE, RESPONSE_BUFFER_SIZE};

/// Configuration for running queries on a worker.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell used to interpret the query (invoked as `<shell> -c <query>`)
    pub shell: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

/// Configuration for a worker server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Upper bound on connections handled at the same time.
    /// The accept loop stops pulling from the backlog while the bound is reached.
    pub max_connections: usize,
    /// Deadline for the client to deliver its query after connecting
    pub read_timeout_ms: u64,
    /// How long shutdown waits for in-flight handlers before giving up
    pub drain_timeout_ms: u64,
    /// Maximum number of query bytes read from a connection
    pub query_buffer_size: usize,
    pub executor: ExecutorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:6120"
                .parse()
                .expect("default listen address is valid"),
            max_connections: 256,
            read_timeout_ms: 5000,
            drain_timeout_ms: 5000,
            query_buffer_size: QUERY_BUFFER_SIZE,
            executor: ExecutorConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_read_timeout_ms(mut self, read_timeout_ms: u64) -> Self {
        self.read_timeout_ms = read_timeout_ms;
        self
    }

    pub fn with_drain_timeout_ms(mut self, drain_timeout_ms: u64) -> Self {
        self.drain_timeout_ms = drain_timeout_ms;
        self
    }

    pub fn with_query_buffer_size(mut self, query_buffer_size: usize) -> Self {
        self.query_buffer_size = query_buffer_size;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.executor.shell = shell.into();
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Configuration for fanning a query out to workers.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub connect_timeout_ms: u64,
    /// Combined write + read deadline, measured from connection establishment
    pub io_timeout_ms: u64,
    /// Upper bound on concurrent worker connections for one dispatch
    pub max_in_flight: usize,
    /// Responses longer than this are truncated
    pub response_buffer_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            io_timeout_ms: 5000,
            max_in_flight: 64,
            response_buffer_size: RESPONSE_BUFFER_SIZE,
        }
    }
}

impl DispatchConfig {
    pub fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    pub fn with_io_timeout_ms(mut self, io_timeout_ms: u64) -> Self {
        self.io_timeout_ms = io_timeout_ms;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_response_buffer_size(mut self, response_buffer_size: usize) -> Self {
        self.response_buffer_size = response_buffer_size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
