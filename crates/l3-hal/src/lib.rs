//! Backend contract for programming L3 forwarding objects.
//!
//! The orchestration layer never talks to a vendor SDK directly. It calls an
//! [`L3Backend`], a synchronous per-object-type create/remove/set interface,
//! and consults an [`AttachmentRegistry`] for the liveness of ports, LAGs,
//! VLANs and bridges owned by peer subsystems.
//!
//! - [`types`]: typed 64-bit object ids
//! - [`error`]: backend status codes and errors
//! - [`api`]: attribute types per object class
//! - [`backend`]: the [`L3Backend`] trait and [`BackendCapabilities`]
//! - [`registry`]: the [`AttachmentRegistry`] trait and an in-memory registry
//! - [`memory`]: [`MemoryBackend`], an in-memory backend with fault injection

pub mod api;
pub mod backend;
pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

pub use api::{
    Egress, GroupMember, GroupType, NeighborAttribute, NeighborAttributes, NeighborEntry,
    NextHopAttribute, NextHopAttributes, NextHopGroupAttributes, PacketAction, RifAttachment,
    RifAttribute, RifAttributes, RifType, RouteAttribute, RouteAttributes, RouteEntry, RouteFlags,
    RouteTarget, VrAttribute, VrAttributes, MIN_RIF_MTU,
};
pub use backend::{BackendCapabilities, L3Backend};
pub use error::{HalError, HalResult, HalStatus};
pub use memory::{BackendOp, MemoryBackend};
pub use registry::{AttachmentRegistry, MemoryRegistry};
pub use types::{
    BridgeKind, BridgeOid, LagKind, LagOid, NextHopGroupKind, NextHopGroupOid, NextHopKind,
    NextHopOid, ObjectId, ObjectKind, PortKind, PortOid, RawObjectId, RouterInterfaceKind,
    RouterInterfaceOid, VirtualRouterKind, VirtualRouterOid,
};
