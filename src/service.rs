//! Boundary of the cadastre web service: transfer objects and the node query
//! interface.

use std::cell::Cell;

use async_trait::async_trait;
use geo::Intersects;
use geo_types::Coord;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{envelope, BoundaryNode, NodeId, ParcelId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CadastreObjectRefTo {
    pub id: String,
}

/// Node as returned by the service: its location and the cadastre objects
/// whose boundaries pass through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CadastreObjectNodeTo {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub cadastre_object_list: Vec<CadastreObjectRefTo>,
}

impl TryFrom<CadastreObjectNodeTo> for BoundaryNode {
    type Error = ServiceError;

    fn try_from(to: CadastreObjectNodeTo) -> Result<Self, Self::Error> {
        if to.id.trim().is_empty() {
            return Err(ServiceError::InvalidTransfer("node without id".to_string()));
        }
        if !to.x.is_finite() || !to.y.is_finite() {
            return Err(ServiceError::InvalidTransfer(format!(
                "node {} has a non-finite location ({}, {})",
                to.id, to.x, to.y
            )));
        }

        let mut parcel_ids: Vec<ParcelId> = Vec::with_capacity(to.cadastre_object_list.len());
        for co in to.cadastre_object_list {
            let id = ParcelId::from(co.id);
            if !parcel_ids.contains(&id) {
                parcel_ids.push(id);
            }
        }

        Ok(BoundaryNode {
            id: NodeId::from(to.id),
            coordinate: Coord { x: to.x, y: to.y },
            parcel_ids,
        })
    }
}

impl From<&BoundaryNode> for CadastreObjectNodeTo {
    fn from(node: &BoundaryNode) -> Self {
        Self {
            id: node.id.to_string(),
            x: node.coordinate.x,
            y: node.coordinate.y,
            cadastre_object_list: node
                .parcel_ids
                .iter()
                .map(|id| CadastreObjectRefTo { id: id.to_string() })
                .collect(),
        }
    }
}

/// Node queries of the cadastre service. Both take a map-space rectangle and
/// the srid of the active view.
#[async_trait(?Send)]
pub trait CadastreNodeService {
    /// A point inside the rectangle where a new node can be added to the
    /// intersecting parcel boundaries.
    async fn get_cadastre_object_node_potential(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError>;

    /// An existing boundary node inside the rectangle.
    async fn get_cadastre_object_node(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError>;
}

/// Service backed by fixed node lists.
#[derive(Debug, Default)]
pub struct InMemoryCadastreService {
    potential: Vec<CadastreObjectNodeTo>,
    existing: Vec<CadastreObjectNodeTo>,
    requests: Cell<usize>,
}

impl InMemoryCadastreService {
    pub fn new(potential: Vec<CadastreObjectNodeTo>, existing: Vec<CadastreObjectNodeTo>) -> Self {
        Self {
            potential,
            existing,
            requests: Cell::new(0),
        }
    }

    /// Number of queries served so far.
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn lookup(
        &self,
        nodes: &[CadastreObjectNodeTo],
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Option<CadastreObjectNodeTo> {
        self.requests.set(self.requests.get() + 1);
        let bbox = envelope(min_x, min_y, max_x, max_y);
        nodes
            .iter()
            .find(|to| bbox.intersects(&Coord { x: to.x, y: to.y }))
            .cloned()
    }
}

#[async_trait(?Send)]
impl CadastreNodeService for InMemoryCadastreService {
    async fn get_cadastre_object_node_potential(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        _srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError> {
        Ok(self.lookup(&self.potential, min_x, min_y, max_x, max_y))
    }

    async fn get_cadastre_object_node(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        _srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError> {
        Ok(self.lookup(&self.existing, min_x, min_y, max_x, max_y))
    }
}
