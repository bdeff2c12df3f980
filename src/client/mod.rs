//! Client side: fan a query out to a roster of workers and gather results.
//!
//! - [`Dispatcher`]: concurrent fan-out with a single owning aggregator
//! - [`QueryResult`]: one tagged result per worker, keyed by machine index
//! - [`roster`]: loads the ordered worker list from a servers file

pub mod dispatcher;
pub mod result;
pub mod roster;

pub use dispatcher::{dispatch, Dispatcher};
pub use result::{FailureReason, Outcome, QueryResult};
pub use roster::load_workers;
