//! Change detection for the integrity monitor
//!
//! This crate provides:
//! - Polling and native-notification scanners behind one [`Scanner`] trait
//! - Per-path debouncing with independent settle windows
//! - Classification of settled paths against the baseline
//! - Overflow recovery and periodic reconciliation
//! - The [`EventSink`] delivery interface and the [`Monitor`] session

pub mod config;
pub mod debounce;
pub mod differ;
pub mod ignore;
pub mod monitor;
pub mod observation;
pub mod reconcile;
pub mod scanner;
pub mod sink;

// Re-exports
pub use config::{ConfigError, MonitorConfig, ScanMode, DEFAULT_ROOT};
pub use debounce::{Debouncer, Settled, SettledPath};
pub use differ::{classify, DiffOutcome, Differ, Probe};
pub use ignore::{IgnoreConfig, IgnoreRules};
pub use monitor::{scan_once, Monitor, MonitorError, MonitorHandle, ScanReport};
pub use observation::{ObservationKind, RawObservation, RescanReason, ScanSignal};
pub use reconcile::PeriodicReconciler;
pub use scanner::{EventScanner, PollingScanner, ScanError, Scanner, WalkError};
pub use sink::{ChannelSink, EventSink, FanoutSink, SinkDeliveryError, SinkError};
