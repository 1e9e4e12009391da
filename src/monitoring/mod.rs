//! Reachability monitoring: address safety checks, probes, the per-target
//! state tracker and the periodic cycle driver that ties them together.

pub mod probe;
pub mod safety;
pub mod service;
pub mod tracker;

pub use probe::{NetworkProber, ProbeTarget, Prober};
pub use safety::{Rejection, SafetyPolicy};
pub use service::{CycleError, CycleReport, DriverPhase, MonitoringService, MonitoringSettings};
pub use tracker::{ReachabilityState, ReachabilityTracker, Transition};
