pub mod adapters;
pub mod analyzers;
pub mod config;
pub mod core;
pub mod errors;
pub mod platform;
pub mod server;
