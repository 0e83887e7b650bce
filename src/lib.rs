pub mod async_job;
pub mod balance;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod recipients;
pub mod rpc;
pub mod session;
pub mod simulator;
pub mod submitter;
pub mod token_registry;
pub mod types;
pub mod utils;
pub mod validation;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use error::SendError;
pub use session::MultiSendSession;
