//! Library crate for net-health-rs: network probes and the composite health report.
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod parser;
pub mod pool;
pub mod ports;
pub mod probes;
pub mod runner;
pub mod server;
pub mod types;
