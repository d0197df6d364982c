pub mod config;
pub mod extract;
pub mod feeds;
pub mod fetch;
pub mod manifest;
pub mod paths;
pub mod reporter;
pub mod solver;
pub mod store;

pub use config::Config;
pub use fetch::Fetcher;
pub use paths::*;
pub use reporter::{NullReporter, Reporter};
pub use solver::Solver;
pub use store::Store;

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("depot-core/", env!("CARGO_PKG_VERSION"));
