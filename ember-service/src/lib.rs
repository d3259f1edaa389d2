pub mod client;
pub mod config;
pub mod error;
pub mod service;
pub mod tokio_tools;

/// Name of the Crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Version of the Crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
