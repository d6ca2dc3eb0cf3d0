//! Resource-aware admission control.
//!
//! Admission is requested *before* the external call is made: the call
//! itself consumes the scarce resource, so throttling after the fact
//! cannot prevent quota overrun.

mod controller;
mod types;

pub use controller::AdmissionController;
pub use types::{AdmissionDecision, DenyReason, Recommendation, ResourceState};
