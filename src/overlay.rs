//! The working overlay: client-side copies of the nodes and parcels being
//! edited, kept apart from confirmed server state.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use geo::Intersects;
use geo_types::{Coord, Polygon};

use crate::model::{BoundaryNode, Envelope, NodeId, Parcel, ParcelId};

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    NodeMoved {
        node: NodeId,
        from: Coord<f64>,
        to: Coord<f64>,
    },
    /// A parcel received new rings.
    RingChanged(ParcelId),
    /// Renderers should reconcile the parcel with its current geometry.
    FeatureChanged(ParcelId),
    /// Emitted once after a propagation pass.
    BatchComplete,
}

pub trait OverlayListener {
    fn on_event(&mut self, event: &OverlayEvent);
}

/// Listener that records every event; cloning shares the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<OverlayEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OverlayEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<OverlayEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl OverlayListener for EventLog {
    fn on_event(&mut self, event: &OverlayEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Plain data held by the overlay.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlaySnapshot {
    pub parcels: BTreeMap<ParcelId, Parcel>,
    pub nodes: BTreeMap<NodeId, BoundaryNode>,
}

#[derive(Default)]
pub struct WorkingOverlay {
    data: OverlaySnapshot,
    listeners: Vec<Box<dyn OverlayListener>>,
}

impl WorkingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl OverlayListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: OverlayEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        self.data.clone()
    }

    pub fn data(&self) -> &OverlaySnapshot {
        &self.data
    }

    pub fn parcel(&self, id: &ParcelId) -> Option<&Parcel> {
        self.data.parcels.get(id)
    }

    pub fn parcels(&self) -> impl Iterator<Item = &Parcel> {
        self.data.parcels.values()
    }

    pub fn node(&self, id: &NodeId) -> Option<&BoundaryNode> {
        self.data.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &BoundaryNode> {
        self.data.nodes.values()
    }

    /// Loads a parcel into the working set. Loading is not an edit, so no
    /// event is emitted.
    pub fn insert_parcel(&mut self, parcel: Parcel) {
        self.data.parcels.insert(parcel.id.clone(), parcel);
    }

    pub fn insert_node(&mut self, node: BoundaryNode) {
        let id = node.id.clone();
        self.data.nodes.insert(id.clone(), node);
        self.emit(OverlayEvent::NodeAdded(id));
    }

    pub fn remove_node(&mut self, id: &NodeId) -> Option<BoundaryNode> {
        let removed = self.data.nodes.remove(id)?;
        self.emit(OverlayEvent::NodeRemoved(id.clone()));
        Some(removed)
    }

    pub(crate) fn move_node(&mut self, id: &NodeId, to: Coord<f64>) -> bool {
        let Some(node) = self.data.nodes.get_mut(id) else {
            return false;
        };
        let from = std::mem::replace(&mut node.coordinate, to);
        self.emit(OverlayEvent::NodeMoved {
            node: id.clone(),
            from,
            to,
        });
        true
    }

    /// Replaces the rings of a loaded parcel. Returns false if the parcel is
    /// not in the overlay.
    pub fn set_parcel_geometry(&mut self, id: &ParcelId, geometry: Polygon<f64>) -> bool {
        let Some(parcel) = self.data.parcels.get_mut(id) else {
            return false;
        };
        parcel.geometry = geometry;
        self.emit(OverlayEvent::RingChanged(id.clone()));
        true
    }

    pub fn notify_feature_changed(&mut self, id: &ParcelId) {
        self.emit(OverlayEvent::FeatureChanged(id.clone()));
    }

    pub(crate) fn batch_complete(&mut self) {
        self.emit(OverlayEvent::BatchComplete);
    }

    /// First node, in id order, whose coordinate falls inside `bbox`.
    pub fn first_node_in(&self, bbox: &Envelope) -> Option<&BoundaryNode> {
        self.data
            .nodes
            .values()
            .find(|node| bbox.intersects(&node.coordinate))
    }

    /// Loaded parcels that reference the node, either through its
    /// association set or by having its coordinate as a vertex.
    pub fn parcels_touching(&self, node: &BoundaryNode, tolerance: f64) -> Vec<ParcelId> {
        self.data
            .parcels
            .values()
            .filter(|parcel| {
                node.touches(&parcel.id) || parcel.has_vertex(node.coordinate, tolerance)
            })
            .map(|parcel| parcel.id.clone())
            .collect()
    }
}
