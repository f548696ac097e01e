//! ## gatewarden-engine::engine
//! **Event-driven ban/whitelist state machine**
//!
//! ### Components:
//! - `manager`: lifecycle (`start`/`stop`) and construction
//! - `handle`: cloneable, non-blocking request surface plus snapshots
//! - `event_loop`: the single consumer applying every decision
//! - `state`: the lock-protected, snapshot-visible tables

mod error;
mod event_loop;
mod handle;
mod manager;
mod settings;
mod state;

pub use error::EngineError;
pub use handle::ProtectionHandle;
pub use manager::{ProtectionManager, ProtectionManagerBuilder};
pub use settings::ProtectionSettings;
