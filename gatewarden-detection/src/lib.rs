//! # Gatewarden Detection Feed
//!
//! Turns the IDS alert log into a stream of candidate attacker addresses.

pub mod alert;
pub mod source;

pub use alert::{default_filter, dest_filter, Alert, AlertFilter};
pub use source::{AlertSource, LogAlertSource, ScanState};
