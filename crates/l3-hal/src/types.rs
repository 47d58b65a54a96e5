//! Typed hardware object ids.
//!
//! Every handle the backend hands out is a 64-bit value. The phantom kind
//! parameter keeps a next-hop id from being passed where a group id is
//! expected.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw backend object id.
pub type RawObjectId = u64;

/// Marker trait for hardware object kinds.
pub trait ObjectKind: Send + Sync + 'static {
    fn type_name() -> &'static str;
}

/// A backend-assigned object id tagged with its kind.
///
/// ```
/// use l3_hal::{NextHopOid, PortOid};
///
/// let port = PortOid::from_raw(0x1000_0000_0001).unwrap();
/// assert_eq!(format!("{port:?}"), "Port(0x0000100000000001)");
/// assert!(NextHopOid::from_raw(0).is_none());
/// ```
pub struct ObjectId<K: ObjectKind> {
    raw: RawObjectId,
    _kind: PhantomData<K>,
}

impl<K: ObjectKind> ObjectId<K> {
    pub const NULL: Self = Self {
        raw: 0,
        _kind: PhantomData,
    };

    /// Wraps a raw id. Zero is the null handle and yields `None`.
    pub fn from_raw(raw: RawObjectId) -> Option<Self> {
        (raw != 0).then_some(Self {
            raw,
            _kind: PhantomData,
        })
    }

    pub const fn as_raw(&self) -> RawObjectId {
        self.raw
    }

    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }
}

// Derives would put bounds on K, which is only a marker.
impl<K: ObjectKind> Clone for ObjectId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ObjectKind> Copy for ObjectId<K> {}

impl<K: ObjectKind> PartialEq for ObjectId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: ObjectKind> Eq for ObjectId<K> {}

impl<K: ObjectKind> PartialOrd for ObjectId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: ObjectKind> Ord for ObjectId<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K: ObjectKind> Hash for ObjectId<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: ObjectKind> Default for ObjectId<K> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<K: ObjectKind> fmt::Debug for ObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", K::type_name(), self.raw)
    }
}

impl<K: ObjectKind> fmt::Display for ObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.raw)
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $oid_alias:ident) => {
        #[doc = concat!("Marker for ", $type_name, " objects.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Id of a ", $type_name, " object.")]
        pub type $oid_alias = ObjectId<$name>;
    };
}

define_object_kind!(VirtualRouterKind, "VirtualRouter", VirtualRouterOid);
define_object_kind!(RouterInterfaceKind, "RouterInterface", RouterInterfaceOid);
define_object_kind!(NextHopKind, "NextHop", NextHopOid);
define_object_kind!(NextHopGroupKind, "NextHopGroup", NextHopGroupOid);
// Owned by peer subsystems; only referenced here.
define_object_kind!(PortKind, "Port", PortOid);
define_object_kind!(LagKind, "Lag", LagOid);
define_object_kind!(BridgeKind, "Bridge", BridgeOid);
