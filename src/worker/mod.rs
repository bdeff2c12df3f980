//! Query execution on worker machines.
//!
//! - [`CommandExecutor`]: spawns `sh -c <query>` and captures trimmed stdout
//!
//! # Failure Handling
//!
//! A non-zero exit status or a failed spawn never becomes an error for the
//! caller. It is logged and recorded on the [`ExecutionResult`], and the
//! captured output (possibly empty) is still returned to the client.
//!
//! # Security Note
//!
//! Queries are interpreted by a shell without sandboxing. Only a `grep`
//! prefix check guards execution, so a query can chain arbitrary commands.

pub mod executor;

pub use executor::{CommandExecutor, ExecutionResult, ExecutionStatus};
