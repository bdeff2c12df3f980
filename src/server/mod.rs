//! Worker-side TCP server.
//!
//! - [`Server`]: binds the listener and runs the accept loop
//! - [`ConnectionHandler`]: per-connection state machine
//!   (`AwaitQuery → Validate → Execute → Respond → Closed`)
//!
//! Only bind and accept failures are fatal; everything that goes wrong inside
//! a connection is logged and confined to that connection.

pub mod handler;
pub mod listener;

pub use handler::{ConnectionHandler, ConnectionOutcome};
pub use listener::{serve, Server};
