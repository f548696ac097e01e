//! # gatewarden-engine
//!
//! The protection manager: the single authority over the ban table and the
//! whitelist, and the only component that talks to the firewall backend.

pub mod engine;

pub use engine::{
    EngineError, ProtectionHandle, ProtectionManager, ProtectionManagerBuilder,
    ProtectionSettings,
};
