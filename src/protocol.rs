//! Wire protocol shared by the dispatcher and worker servers.
//!
//! The protocol is unframed: the client writes the raw query bytes in one
//! send, the server writes the raw result bytes in one send and closes the
//! connection. Neither side uses a delimiter or length prefix, so both sides
//! cap what they read with a fixed buffer and silently drop anything beyond it.

/// Bytes every accepted query must begin with.
pub const QUERY_PREFIX: &[u8] = b"grep";

/// Response written instead of executing a query that lacks [`QUERY_PREFIX`].
pub const REJECTION_RESPONSE: &str = "Error: query must start with 'grep'";

/// Maximum number of query bytes a server reads from a connection.
pub const QUERY_BUFFER_SIZE: usize = 1024;

/// Maximum number of response bytes a client reads from a connection.
pub const RESPONSE_BUFFER_SIZE: usize = 2048;

/// Returns true if the raw query is allowed to run.
///
/// This is a byte prefix match, not a shell-token check: `grepx` passes and
/// so does `grep foo; rm -rf /`.
pub fn is_valid_query(query: &[u8]) -> bool {
    query.starts_with(QUERY_PREFIX)
}
