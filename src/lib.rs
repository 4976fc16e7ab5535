// Public API for integration tests and the binary

pub mod config;
pub mod geo;
pub mod protocol;
pub mod relay;
pub mod report;
pub mod server;
pub mod session;
pub mod state;
pub mod types;
pub mod ws;

#[cfg(test)]
mod testing;
