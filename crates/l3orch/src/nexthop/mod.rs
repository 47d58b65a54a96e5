//! Next-hop management.
//!
//! A next-hop is keyed by `(vr, rif, ip)` and resolves its destination MAC
//! from the neighbor table. Identical requests share one hardware object.

mod orch;
mod types;

pub use orch::{NextHopOrch, NextHopOrchStats};
pub use types::{NextHop, NextHopKey};
