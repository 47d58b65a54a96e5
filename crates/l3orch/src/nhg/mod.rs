//! Next-hop group (ECMP / weighted ECMP) management.
//!
//! Groups compose live next-hops into one forwarding target. Member slots
//! and group slots are limited by the backend's reported capabilities,
//! optionally narrowed by configuration.

mod orch;
mod types;

pub use orch::{NhgOrch, NhgOrchStats};
pub use types::{GroupRequest, GroupState, NextHopGroup};
