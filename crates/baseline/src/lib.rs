//! Baseline state for the integrity monitor
//!
//! This crate provides:
//! - The ordered path -> record map ([`Baseline`])
//! - The lock-guarded store the differ mutates ([`BaselineStore`])
//! - JSON persistence with atomic saves

pub mod baseline;
pub mod persist;
pub mod store;

// Re-exports
pub use baseline::Baseline;
pub use persist::{BaselineError, BaselineInfo};
pub use store::BaselineStore;
