//! `inforoute-runtime` – the refresh coordinator.
//!
//! # Modules
//!
//! - [`coordinator`] – [`Coordinator`]: owns the interval timer, coalesces
//!   manual refresh requests, keeps the last good snapshot and fans
//!   data-changed signals out to [`DataListener`]s.
//! - [`telemetry`] – `tracing` subscriber setup with optional OTLP export.

pub mod coordinator;
pub mod telemetry;

pub use coordinator::{Coordinator, CoordinatorState, DataListener, ListenerId, RefreshOutcome};
