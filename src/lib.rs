pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod worker;
