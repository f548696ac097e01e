//! # gatewarden-core
//!
//! Foundation types shared by every Gatewarden crate.
//!
//! ### Key Submodules:
//! - `address`: canonical textual form for IPv4/IPv6 addresses
//! - `ban`: ban-table entries and their read-only snapshot view
//! - `error`: validation errors raised at the public entry points

pub mod address;
pub mod ban;
pub mod error;

pub use address::canonicalize;
pub use ban::{BanEntry, BannedIpView};
pub use error::AddressError;
