//! Library half of the `vw` binary
//!
//! Config file loading, logging setup, the concrete event sinks and the
//! formatting helpers the commands share.

pub mod logging;
pub mod settings;
pub mod sinks;
pub mod util;
