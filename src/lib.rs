//! Library crate for dev-scan-rs: finds local web dev servers and ranks them
//! for a device-preview shell.
pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod devices;
pub mod discovery;
pub mod enumerator;
pub mod error;
pub mod inspector;
pub mod launch;
pub mod ports;
pub mod resolver;
pub mod scanner;
pub mod server;
pub mod types;

pub use discovery::{discover_servers, discover_servers_blocking, Discovery};
