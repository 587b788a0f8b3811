//! Interactive node tools. Both variants run on the same gesture engine and
//! differ only in how they obtain the node and how they roll back.

use std::time::Duration;

use geo_types::Coord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EditConfig;
use crate::error::Result;
use crate::fetch::{fetch_node, FetchCanceller, FetchGate, FetchMode};
use crate::model::{BoundaryNode, Envelope, NodeId, Parcel, ParcelId};
use crate::overlay::WorkingOverlay;
use crate::propagate::{anchor_node, apply_node_to_parcels, relocate_node};
use crate::service::CadastreNodeService;

/// The map control the tools draw on.
pub trait MapView {
    fn srid(&self) -> i32;
    fn refresh(&mut self);
}

/// Result of the drag/confirm sub-tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Manipulation {
    /// The user confirmed the node at this location.
    Confirmed(Coord<f64>),
    Cancelled,
}

pub trait NodeManipulator {
    fn manipulate(&mut self, node: &BoundaryNode, overlay: &WorkingOverlay) -> Manipulation;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    AddNode,
    ChangeNode,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::AddNode => "add-node",
            ToolKind::ChangeNode => "change-node",
        }
    }

    pub fn tooltip(&self) -> &'static str {
        match self {
            ToolKind::AddNode => "Add a node to the boundaries of the selected parcels",
            ToolKind::ChangeNode => "Move an existing boundary node",
        }
    }

    pub fn fetch_mode(&self) -> FetchMode {
        match self {
            ToolKind::AddNode => FetchMode::Potential,
            ToolKind::ChangeNode => FetchMode::Existing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolState {
    Idle,
    AwaitingGesture,
    Fetching,
    Inserting,
    Relocating,
    Manipulating,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum GestureOutcome {
    /// Nothing was found under the rectangle.
    NoNode,
    Committed {
        node: NodeId,
        parcels: Vec<ParcelId>,
    },
    RolledBack {
        node: NodeId,
        removed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureReport {
    pub tool: ToolKind,
    pub outcome: GestureOutcome,
    pub path: Vec<ToolState>,
    pub refreshed: bool,
}

/// Everything a gesture reads or mutates besides the tool itself.
pub struct EditContext<'a, S: ?Sized, V: ?Sized> {
    pub overlay: &'a mut WorkingOverlay,
    pub service: &'a S,
    pub map: &'a mut V,
    pub config: &'a EditConfig,
}

/// State kept while the add-node tool waits for the user, so a cancel can
/// put everything back.
struct InsertedNode {
    node: BoundaryNode,
    parcels_before: Vec<Parcel>,
    replaced: Option<BoundaryNode>,
}

/// The node the change-node tool is working on.
struct FetchedNode {
    node: BoundaryNode,
    parcels_before: Vec<Parcel>,
    new_from_server: bool,
}

#[derive(Debug)]
pub struct NodeEditTool {
    kind: ToolKind,
    gate: FetchGate,
    state: ToolState,
    path: Vec<ToolState>,
    changed: bool,
}

impl NodeEditTool {
    pub fn new(kind: ToolKind, fetch_timeout: Option<Duration>) -> Self {
        Self {
            kind,
            gate: FetchGate::new(fetch_timeout),
            state: ToolState::Idle,
            path: Vec::new(),
            changed: false,
        }
    }

    pub fn add_node(fetch_timeout: Option<Duration>) -> Self {
        Self::new(ToolKind::AddNode, fetch_timeout)
    }

    pub fn change_node(fetch_timeout: Option<Duration>) -> Self {
        Self::new(ToolKind::ChangeNode, fetch_timeout)
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn state(&self) -> ToolState {
        self.state
    }

    /// Handle for aborting this tool's in-flight node request.
    pub fn canceller(&self) -> FetchCanceller {
        self.gate.canceller()
    }

    fn enter(&mut self, state: ToolState) {
        debug!("{}: {:?} -> {:?}", self.kind.name(), self.state, state);
        self.state = state;
        self.path.push(state);
    }

    /// Handles a finished gesture rectangle. The map is refreshed at most
    /// once, and only if the overlay was touched.
    pub async fn on_rectangle_finished<S, V, M>(
        &mut self,
        bbox: Envelope,
        ctx: EditContext<'_, S, V>,
        manipulator: &mut M,
    ) -> Result<GestureReport>
    where
        S: CadastreNodeService + ?Sized,
        V: MapView + ?Sized,
        M: NodeManipulator + ?Sized,
    {
        let EditContext {
            overlay,
            service,
            map,
            config,
        } = ctx;

        self.path.clear();
        self.changed = false;
        self.enter(ToolState::AwaitingGesture);

        let srid = map.srid();
        let result = match self.kind {
            ToolKind::AddNode => {
                self.run_add_node(bbox, srid, overlay, service, config, manipulator)
                    .await
            }
            ToolKind::ChangeNode => {
                self.run_change_node(bbox, srid, overlay, service, config, manipulator)
                    .await
            }
        };

        let refreshed = self.changed;
        if refreshed {
            map.refresh();
        }
        self.enter(ToolState::Idle);

        let outcome = result?;
        Ok(GestureReport {
            tool: self.kind,
            outcome,
            path: std::mem::take(&mut self.path),
            refreshed,
        })
    }

    async fn fetch<S>(
        &mut self,
        bbox: &Envelope,
        srid: i32,
        service: &S,
    ) -> Result<Option<BoundaryNode>>
    where
        S: CadastreNodeService + ?Sized,
    {
        self.enter(ToolState::Fetching);
        let mode = self.kind.fetch_mode();
        self.gate.run(fetch_node(service, bbox, srid, mode)).await
    }

    async fn run_add_node<S, M>(
        &mut self,
        bbox: Envelope,
        srid: i32,
        overlay: &mut WorkingOverlay,
        service: &S,
        config: &EditConfig,
        manipulator: &mut M,
    ) -> Result<GestureOutcome>
    where
        S: CadastreNodeService + ?Sized,
        M: NodeManipulator + ?Sized,
    {
        let Some(node) = self.fetch(&bbox, srid, service).await? else {
            debug!("add-node: no potential node in {:?}", bbox);
            return Ok(GestureOutcome::NoNode);
        };

        self.enter(ToolState::Inserting);
        let parcels_before: Vec<Parcel> = node
            .parcel_ids
            .iter()
            .filter_map(|id| overlay.parcel(id).cloned())
            .collect();
        let replaced = overlay.node(&node.id).cloned();

        let parcels = apply_node_to_parcels(overlay, &node, node.coordinate, config)?;
        overlay.insert_node(node.clone());
        self.changed = true;

        let inserted = InsertedNode {
            node,
            parcels_before,
            replaced,
        };

        self.enter(ToolState::Manipulating);
        match manipulator.manipulate(&inserted.node, overlay) {
            Manipulation::Confirmed(to) => {
                if let Err(err) = relocate_node(overlay, &inserted.node.id, to, config) {
                    self.rollback_insert(overlay, inserted);
                    return Err(err);
                }
                self.enter(ToolState::Committed);
                info!("Node {} added to {} parcels", inserted.node.id, parcels.len());
                Ok(GestureOutcome::Committed {
                    node: inserted.node.id,
                    parcels,
                })
            }
            Manipulation::Cancelled => {
                let node = inserted.node.id.clone();
                self.rollback_insert(overlay, inserted);
                info!("Adding node {} was cancelled", node);
                Ok(GestureOutcome::RolledBack {
                    node,
                    removed: true,
                })
            }
        }
    }

    fn rollback_insert(&mut self, overlay: &mut WorkingOverlay, inserted: InsertedNode) {
        for parcel in inserted.parcels_before {
            overlay.set_parcel_geometry(&parcel.id, parcel.geometry);
        }
        overlay.remove_node(&inserted.node.id);
        if let Some(previous) = inserted.replaced {
            overlay.insert_node(previous);
        }
        self.enter(ToolState::RolledBack);
    }

    async fn run_change_node<S, M>(
        &mut self,
        bbox: Envelope,
        srid: i32,
        overlay: &mut WorkingOverlay,
        service: &S,
        config: &EditConfig,
        manipulator: &mut M,
    ) -> Result<GestureOutcome>
    where
        S: CadastreNodeService + ?Sized,
        M: NodeManipulator + ?Sized,
    {
        let (node, new_from_server) = match overlay.first_node_in(&bbox).cloned() {
            Some(node) => (node, false),
            None => {
                let Some(fetched) = self.fetch(&bbox, srid, service).await? else {
                    debug!("change-node: no node in {:?}", bbox);
                    return Ok(GestureOutcome::NoNode);
                };
                match overlay.node(&fetched.id).cloned() {
                    Some(local) => (local, false),
                    None => {
                        overlay.insert_node(fetched.clone());
                        self.changed = true;
                        (fetched, true)
                    }
                }
            }
        };

        self.enter(ToolState::Relocating);
        let parcels_before: Vec<Parcel> = node
            .parcel_ids
            .iter()
            .filter_map(|id| overlay.parcel(id).cloned())
            .collect();
        let fetched = FetchedNode {
            node,
            parcels_before,
            new_from_server,
        };
        match anchor_node(overlay, &fetched.node, config) {
            Ok(anchored) if !anchored.is_empty() => {
                debug!("change-node: {} parcels gained node {}", anchored.len(), fetched.node.id);
                self.changed = true;
            }
            Ok(_) => {}
            Err(err) => {
                self.rollback_change(overlay, &fetched, config);
                return Err(err.into());
            }
        }

        self.enter(ToolState::Manipulating);
        match manipulator.manipulate(&fetched.node, overlay) {
            Manipulation::Confirmed(to) => {
                let parcels = match relocate_node(overlay, &fetched.node.id, to, config) {
                    Ok(parcels) => parcels,
                    Err(err) => {
                        self.rollback_change(overlay, &fetched, config);
                        return Err(err);
                    }
                };
                if fetched.node.coordinate != to {
                    self.changed = true;
                }
                self.enter(ToolState::Committed);
                info!("Node {} moved on {} parcels", fetched.node.id, parcels.len());
                Ok(GestureOutcome::Committed {
                    node: fetched.node.id,
                    parcels,
                })
            }
            Manipulation::Cancelled => {
                self.rollback_change(overlay, &fetched, config);
                info!("Changing node {} was cancelled", fetched.node.id);
                Ok(GestureOutcome::RolledBack {
                    node: fetched.node.id,
                    removed: fetched.new_from_server,
                })
            }
        }
    }

    /// Puts back the rings of parcels that had to gain the node, then sends
    /// renderers a feature-changed event for every parcel on the node so they
    /// reconcile with the unmoved geometry. The node itself is only dropped if
    /// this gesture brought it in from the server.
    fn rollback_change(
        &mut self,
        overlay: &mut WorkingOverlay,
        fetched: &FetchedNode,
        config: &EditConfig,
    ) {
        for parcel in &fetched.parcels_before {
            let current = overlay.parcel(&parcel.id).map(|p| &p.geometry);
            if current != Some(&parcel.geometry) {
                overlay.set_parcel_geometry(&parcel.id, parcel.geometry.clone());
            }
        }
        for parcel in overlay.parcels_touching(&fetched.node, config.snap_tolerance) {
            overlay.notify_feature_changed(&parcel);
        }
        if fetched.new_from_server {
            overlay.remove_node(&fetched.node.id);
        }
        self.changed = true;
        self.enter(ToolState::RolledBack);
    }
}
