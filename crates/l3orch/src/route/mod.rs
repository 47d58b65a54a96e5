//! Route table management.

mod orch;
mod types;

pub use orch::{RouteOrch, RouteOrchStats};
pub use types::{Route, RouteRequest, MAX_MPLS_LABEL};
