//! # Gatewarden Prevention Backends
//!
//! The packet-filter side of enforcement. The protection manager only sees
//! the [`FirewallBackend`] trait; this crate provides an nftables
//! implementation for the gateway and an in-memory one for dry runs.

pub mod firewall;
pub mod memory;
pub mod nftables;

pub use firewall::{FirewallBackend, FirewallError};
pub use memory::MemoryFirewall;
pub use nftables::NftablesFirewall;
