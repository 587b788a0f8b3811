use std::fmt;

use geo_types::{Coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Map-space rectangle drawn by a gesture.
pub type Envelope = Rect<f64>;

pub fn envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Envelope {
    Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(ParcelId);
string_id!(NodeId);

/// A cadastre object held in the working overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub id: ParcelId,
    pub geometry: Polygon<f64>,
}

impl Parcel {
    pub fn new(id: impl Into<ParcelId>, geometry: Polygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
        }
    }

    /// True if any ring of the parcel has `coordinate` as a vertex.
    pub fn has_vertex(&self, coordinate: Coord<f64>, tolerance: f64) -> bool {
        std::iter::once(self.geometry.exterior())
            .chain(self.geometry.interiors())
            .flat_map(|ring| ring.coords())
            .any(|c| coords_within(*c, coordinate, tolerance))
    }
}

/// A coordinate shared by the boundaries of one or more parcels.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryNode {
    pub id: NodeId,
    pub coordinate: Coord<f64>,
    pub parcel_ids: Vec<ParcelId>,
}

impl BoundaryNode {
    pub fn new(id: impl Into<NodeId>, coordinate: Coord<f64>, parcel_ids: Vec<ParcelId>) -> Self {
        Self {
            id: id.into(),
            coordinate,
            parcel_ids,
        }
    }

    pub fn touches(&self, parcel: &ParcelId) -> bool {
        self.parcel_ids.contains(parcel)
    }
}

pub(crate) fn coords_within(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    let d = a - b;
    (d.x * d.x + d.y * d.y).sqrt() <= tolerance
}
