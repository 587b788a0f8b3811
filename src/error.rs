use std::time::Duration;

use thiserror::Error;

use crate::model::{NodeId, ParcelId};

/// Geometry that the ring editor or the propagator refuses to produce.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid ring: {0}")]
    InvalidRing(String),

    #[error("coordinate ({x}, {y}) is not finite")]
    NonFiniteCoordinate { x: f64, y: f64 },

    #[error(
        "node does not lie on any ring of parcel {parcel} (nearest segment is {distance} away)"
    )]
    OffBoundary { parcel: ParcelId, distance: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("snap tolerance must be a finite distance of zero or more, got {0}")]
    SnapTolerance(f64),
}

/// Failures reported by the cadastre web service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cadastre service unavailable: {0}")]
    Unavailable(String),

    #[error("cadastre service rejected the request: {0}")]
    Rejected(String),

    #[error("invalid node transfer object: {0}")]
    InvalidTransfer(String),
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("could not place node here: {0}")]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("node request was cancelled by a newer gesture")]
    Cancelled,

    #[error("node request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("node {0} is not in the working overlay")]
    UnknownNode(NodeId),
}

pub type Result<T, E = EditError> = std::result::Result<T, E>;
