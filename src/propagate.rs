//! Applies a single node edit to every parcel ring that references the node.
//!
//! Both passes stage the new geometry of every affected parcel before the
//! overlay is touched, so a geometry error leaves the overlay unchanged.

use std::collections::BTreeSet;

use geo_types::{Coord, LineString, Polygon};
use tracing::{debug, warn};

use crate::config::{CoincidentVertex, EditConfig};
use crate::error::{EditError, GeometryError};
use crate::model::{BoundaryNode, NodeId, ParcelId};
use crate::overlay::WorkingOverlay;
use crate::ring::{insert_coordinate, project, replace_vertex};

fn insert_if_on_ring(
    ring: &LineString<f64>,
    coordinate: Coord<f64>,
    config: &EditConfig,
    nearest: &mut f64,
) -> Result<Option<LineString<f64>>, GeometryError> {
    let projection = project(ring, coordinate)?;
    *nearest = nearest.min(projection.distance);
    if projection.distance > config.snap_tolerance {
        return Ok(None);
    }
    insert_coordinate(ring, coordinate, config.coincident_vertex, config.snap_tolerance).map(Some)
}

/// Inserts `coordinate` into the rings of every loaded parcel in the node's
/// association set. Parcels that are not loaded are skipped.
///
/// Returns the ids of the parcels that were updated.
pub fn apply_node_to_parcels(
    overlay: &mut WorkingOverlay,
    node: &BoundaryNode,
    coordinate: Coord<f64>,
    config: &EditConfig,
) -> Result<Vec<ParcelId>, GeometryError> {
    let mut seen = BTreeSet::new();
    let mut staged = Vec::new();

    for parcel_id in &node.parcel_ids {
        if !seen.insert(parcel_id) {
            continue;
        }
        let Some(parcel) = overlay.parcel(parcel_id) else {
            warn!("Parcel {} of node {} is not loaded, skipping", parcel_id, node.id);
            continue;
        };

        let geometry = &parcel.geometry;
        let mut nearest = f64::INFINITY;
        let mut touched = false;

        let exterior = insert_if_on_ring(geometry.exterior(), coordinate, config, &mut nearest)?;
        let exterior = match exterior {
            Some(ring) => {
                touched = true;
                ring
            }
            None => geometry.exterior().clone(),
        };

        let mut interiors = Vec::with_capacity(geometry.interiors().len());
        for interior in geometry.interiors() {
            match insert_if_on_ring(interior, coordinate, config, &mut nearest)? {
                Some(ring) => {
                    touched = true;
                    interiors.push(ring);
                }
                None => interiors.push(interior.clone()),
            }
        }

        if !touched {
            return Err(GeometryError::OffBoundary {
                parcel: parcel_id.clone(),
                distance: nearest,
            });
        }

        staged.push((parcel_id.clone(), Polygon::new(exterior, interiors)));
    }

    let updated: Vec<ParcelId> = staged.iter().map(|(id, _)| id.clone()).collect();
    for (id, geometry) in staged {
        overlay.set_parcel_geometry(&id, geometry);
    }
    if !updated.is_empty() {
        overlay.batch_complete();
    }
    debug!("Node {} applied to {} parcels", node.id, updated.len());

    Ok(updated)
}

/// Gives every loaded parcel in the node's association set a vertex at the
/// node, without duplicating vertices that are already there. Returns the ids
/// of the parcels that gained one.
pub fn anchor_node(
    overlay: &mut WorkingOverlay,
    node: &BoundaryNode,
    config: &EditConfig,
) -> Result<Vec<ParcelId>, GeometryError> {
    let missing: Vec<ParcelId> = node
        .parcel_ids
        .iter()
        .filter(|id| {
            overlay
                .parcel(id)
                .is_some_and(|p| !p.has_vertex(node.coordinate, config.snap_tolerance))
        })
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let partial = BoundaryNode::new(node.id.clone(), node.coordinate, missing);
    let merge = EditConfig {
        coincident_vertex: CoincidentVertex::Merge,
        ..config.clone()
    };
    apply_node_to_parcels(overlay, &partial, node.coordinate, &merge)
}

fn nearest_ring_distance(
    geometry: &Polygon<f64>,
    point: Coord<f64>,
) -> Result<f64, GeometryError> {
    let mut nearest = f64::INFINITY;
    for ring in std::iter::once(geometry.exterior()).chain(geometry.interiors()) {
        nearest = nearest.min(project(ring, point)?.distance);
    }
    Ok(nearest)
}

/// Moves a node already in the overlay to `to`, dragging the matching vertex
/// of every loaded parcel that references it.
///
/// Every loaded parcel in the node's association set must have a vertex at the
/// node; otherwise nothing moves and the parcel is reported as
/// [`GeometryError::OffBoundary`].
pub fn relocate_node(
    overlay: &mut WorkingOverlay,
    node_id: &NodeId,
    to: Coord<f64>,
    config: &EditConfig,
) -> Result<Vec<ParcelId>, EditError> {
    let node = overlay
        .node(node_id)
        .cloned()
        .ok_or_else(|| EditError::UnknownNode(node_id.clone()))?;
    if node.coordinate == to {
        return Ok(Vec::new());
    }

    let mut staged = Vec::new();
    for parcel_id in overlay.parcels_touching(&node, config.snap_tolerance) {
        let Some(parcel) = overlay.parcel(&parcel_id) else {
            continue;
        };
        let geometry = &parcel.geometry;
        let tolerance = config.snap_tolerance;

        let (exterior, mut moved) =
            replace_vertex(geometry.exterior(), node.coordinate, to, tolerance)?;
        let mut interiors = Vec::with_capacity(geometry.interiors().len());
        for interior in geometry.interiors() {
            let (ring, n) = replace_vertex(interior, node.coordinate, to, tolerance)?;
            moved += n;
            interiors.push(ring);
        }

        if moved > 0 {
            staged.push((parcel_id, Polygon::new(exterior, interiors)));
        } else if node.touches(&parcel_id) {
            return Err(GeometryError::OffBoundary {
                distance: nearest_ring_distance(geometry, node.coordinate)?,
                parcel: parcel_id,
            }
            .into());
        }
    }

    let updated: Vec<ParcelId> = staged.iter().map(|(id, _)| id.clone()).collect();
    for (id, geometry) in staged {
        overlay.set_parcel_geometry(&id, geometry);
    }
    overlay.move_node(node_id, to);
    overlay.batch_complete();
    debug!("Node {} moved across {} parcels", node_id, updated.len());

    Ok(updated)
}
