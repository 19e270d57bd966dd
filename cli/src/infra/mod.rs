//! Infrastructure layer — production implementations of the application ports.

pub mod audit;
pub mod command_runner;
pub mod config;
pub mod ssh;
