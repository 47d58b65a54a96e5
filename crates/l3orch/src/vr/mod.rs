//! Virtual router registry.
//!
//! A virtual router is an isolated routing domain. RIFs and routes attach to
//! one and hold a reference on it, so a VR can only be deleted once all of
//! them are gone.

mod orch;

pub use orch::{VrOrch, VrOrchStats};
