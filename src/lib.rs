pub mod broker;
pub mod config;
pub mod connector;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod report;
pub mod session;
pub mod shutdown;
pub mod sources;
pub mod validate;
pub mod worker;

#[cfg(test)]
mod testing;
