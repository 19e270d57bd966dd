//! Command implementations

pub mod audit;
pub mod provision;
mod session_watch;
pub mod version;
