//! What scanners report before anything is fingerprinted

use tokio::time::Instant;
use veriwatch_core::RelPath;

/// Kind of raw change a scanner saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    Appeared,
    MetadataChanged,
    Disappeared,
}

/// Unverified report that something happened at a path
///
/// Never trusted on its own: the differ re-reads the path once it settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    pub path: RelPath,
    pub kind: ObservationKind,
    pub observed_at: Instant,
}

impl RawObservation {
    pub fn new(path: RelPath, kind: ObservationKind) -> Self {
        Self::at(path, kind, Instant::now())
    }

    pub fn at(path: RelPath, kind: ObservationKind, observed_at: Instant) -> Self {
        Self {
            path,
            kind,
            observed_at,
        }
    }
}

/// Why a full reconciliation was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanReason {
    /// Notification backend dropped events
    Overflow,
    /// Notification backend reported an error
    BackendError,
    /// Scheduled by the periodic reconciler
    Periodic,
    /// Asked for through the monitor handle
    Requested,
}

impl std::fmt::Display for RescanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            RescanReason::Overflow => "event overflow",
            RescanReason::BackendError => "watch backend error",
            RescanReason::Periodic => "periodic",
            RescanReason::Requested => "requested",
        };
        f.write_str(reason)
    }
}

/// Message from a scanner to the debouncer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSignal {
    Observed(RawObservation),
    /// Individual observations can no longer be trusted to be complete
    Rescan(RescanReason),
}
