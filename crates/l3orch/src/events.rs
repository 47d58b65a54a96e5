//! Asynchronous hardware events.
//!
//! Events arrive out of band (MAC learn/move/age, link state, route hits),
//! are coalesced per key in an [`EventQueue`](l3_orch_common::EventQueue),
//! and are applied by [`L3Orch::process_events`] under the same per-class
//! locks as synchronous calls.

use std::sync::Arc;

use l3_hal::{Egress, NeighborEntry, PortOid, RouteEntry, RouterInterfaceOid, VirtualRouterOid};
use l3_orch_common::Coalesce;
use l3_types::{IpAddress, IpPrefix, MacAddress};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::L3Error;
use crate::orch::L3Orch;

/// A notification raised by the forwarding hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    NeighborLearned {
        vr: VirtualRouterOid,
        ip: IpAddress,
        rif: RouterInterfaceOid,
        mac: MacAddress,
        egress: Option<Egress>,
    },
    /// A known station showed up behind a different MAC or egress.
    NeighborMoved {
        vr: VirtualRouterOid,
        ip: IpAddress,
        rif: RouterInterfaceOid,
        mac: MacAddress,
        egress: Option<Egress>,
    },
    NeighborAged {
        vr: VirtualRouterOid,
        ip: IpAddress,
    },
    LinkState {
        port: PortOid,
        up: bool,
    },
    RouteHit {
        vr: VirtualRouterOid,
        prefix: IpPrefix,
    },
}

impl HwEvent {
    /// Short name used in logs and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            HwEvent::NeighborLearned { .. } => "neighbor_learned",
            HwEvent::NeighborMoved { .. } => "neighbor_moved",
            HwEvent::NeighborAged { .. } => "neighbor_aged",
            HwEvent::LinkState { .. } => "link_state",
            HwEvent::RouteHit { .. } => "route_hit",
        }
    }

    /// The object the event is about.
    pub fn subject(&self) -> String {
        match self.key() {
            EventKey::Neighbor(entry) => entry.to_string(),
            EventKey::Link(port) => port.to_string(),
            EventKey::Route(entry) => entry.to_string(),
        }
    }
}

/// Coalescing key: events for the same key supersede one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKey {
    Neighbor(NeighborEntry),
    Link(PortOid),
    Route(RouteEntry),
}

impl Coalesce for HwEvent {
    type Key = EventKey;

    fn key(&self) -> EventKey {
        match *self {
            HwEvent::NeighborLearned { vr, ip, .. }
            | HwEvent::NeighborMoved { vr, ip, .. }
            | HwEvent::NeighborAged { vr, ip } => EventKey::Neighbor(NeighborEntry::new(vr, ip)),
            HwEvent::LinkState { port, .. } => EventKey::Link(port),
            HwEvent::RouteHit { vr, prefix } => EventKey::Route(RouteEntry::new(vr, prefix)),
        }
    }

    fn is_withdrawal(&self) -> bool {
        matches!(self, HwEvent::NeighborAged { .. })
    }
}

/// Outcome of one [`L3Orch::process_events`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessedEvents {
    pub applied: usize,
    pub failed: Vec<(HwEvent, L3Error)>,
}

impl ProcessedEvents {
    pub fn total(&self) -> usize {
        self.applied + self.failed.len()
    }
}

/// Spawns a task that feeds events from `rx` into `orch` and applies them.
///
/// The task ends when every sender is dropped.
pub fn spawn_event_pump(orch: Arc<L3Orch>, mut rx: mpsc::Receiver<HwEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("L3Orch: event pump started");
        while let Some(event) = rx.recv().await {
            orch.notify(event);
            while let Ok(event) = rx.try_recv() {
                orch.notify(event);
            }

            while orch.pending_events() > 0 {
                let processed = orch.process_events();
                if processed.total() == 0 {
                    break;
                }
                debug!("L3Orch: applied {} event(s)", processed.applied);
                for (event, err) in &processed.failed {
                    warn!("L3Orch: event {:?} failed: {}", event, err);
                }
            }
        }
        info!("L3Orch: event pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3_orch_common::EventQueue;
    use pretty_assertions::assert_eq;

    fn vr() -> VirtualRouterOid {
        VirtualRouterOid::from_raw(1).unwrap()
    }

    fn learned(last: u8) -> HwEvent {
        HwEvent::NeighborLearned {
            vr: vr(),
            ip: IpAddress::v4(10, 0, 0, 1),
            rif: RouterInterfaceOid::from_raw(2).unwrap(),
            mac: MacAddress::new([0x00, 0xaa, 0, 0, 0, last]),
            egress: None,
        }
    }

    #[test]
    fn test_learn_events_coalesce() {
        let mut queue = EventQueue::new();
        queue.push(learned(1));
        queue.push(learned(2));
        assert_eq!(queue.drain(), vec![learned(2)]);
    }

    #[test]
    fn test_aged_supersedes_learn() {
        let aged = HwEvent::NeighborAged {
            vr: vr(),
            ip: IpAddress::v4(10, 0, 0, 1),
        };
        let mut queue = EventQueue::new();
        queue.push(learned(1));
        queue.push(aged.clone());
        queue.push(learned(3));
        assert_eq!(queue.drain(), vec![aged, learned(3)]);
    }

    #[test]
    fn test_kind_and_subject() {
        let port = PortOid::from_raw(5).unwrap();
        let link = HwEvent::LinkState { port, up: false };
        assert_eq!(link.kind(), "link_state");
        assert_eq!(link.subject(), port.to_string());

        let event = learned(1);
        assert_eq!(event.kind(), "neighbor_learned");
        assert_eq!(
            event.subject(),
            NeighborEntry::new(vr(), IpAddress::v4(10, 0, 0, 1)).to_string()
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let port = PortOid::from_raw(5).unwrap();
        let mut queue = EventQueue::new();
        queue.push(HwEvent::LinkState { port, up: false });
        queue.push(learned(1));
        queue.push(HwEvent::LinkState { port, up: true });
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.contains(&HwEvent::LinkState { port, up: true }));
    }
}
