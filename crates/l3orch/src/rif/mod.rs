//! Router interface registry.
//!
//! A RIF attaches a virtual router to a port, VLAN, LAG or bridge. The
//! attachment kind fixes the RIF type, and the attachment must exist in the
//! peer registry when the RIF is created.

mod orch;

pub use orch::{RifEntry, RifOrch, RifOrchStats};
