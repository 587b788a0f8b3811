//! Coordinate-level edits on closed polygon rings.

use geo::{Closest, ClosestPoint};
use geo_types::{Coord, LineString, Point};

use crate::config::CoincidentVertex;
use crate::error::GeometryError;
use crate::model::coords_within;

/// Where a point lands when projected onto a ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingProjection {
    /// Index of the segment starting at vertex `segment_index`.
    pub segment_index: usize,
    pub closest: Coord<f64>,
    pub distance: f64,
}

pub fn validate_ring(ring: &LineString<f64>) -> Result<(), GeometryError> {
    if ring.0.len() < 4 {
        return Err(GeometryError::InvalidRing(format!(
            "a closed ring needs at least 4 coordinates, got {}",
            ring.0.len()
        )));
    }
    if !ring.is_closed() {
        return Err(GeometryError::InvalidRing(
            "first and last coordinates differ".to_string(),
        ));
    }
    Ok(())
}

fn check_finite(point: Coord<f64>) -> Result<(), GeometryError> {
    if point.x.is_finite() && point.y.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonFiniteCoordinate {
            x: point.x,
            y: point.y,
        })
    }
}

/// Projects `point` onto the nearest segment of `ring`. Ties go to the lowest
/// segment index.
pub fn project(
    ring: &LineString<f64>,
    point: Coord<f64>,
) -> Result<RingProjection, GeometryError> {
    validate_ring(ring)?;
    check_finite(point)?;

    let target = Point::from(point);
    let mut best: Option<RingProjection> = None;

    for (segment_index, segment) in ring.lines().enumerate() {
        let closest = match segment.closest_point(&target) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p.0,
            Closest::Indeterminate => segment.start,
        };
        let d = closest - point;
        let distance = (d.x * d.x + d.y * d.y).sqrt();

        if best.map_or(true, |b| distance < b.distance) {
            best = Some(RingProjection {
                segment_index,
                closest,
                distance,
            });
        }
    }

    best.ok_or_else(|| GeometryError::InvalidRing("ring has no segments".to_string()))
}

/// Inserts `point` as a vertex right after the segment it projects onto.
///
/// With [`CoincidentVertex::Duplicate`] the result always has one more vertex
/// than `ring`, even when `point` equals an existing vertex. With
/// [`CoincidentVertex::Merge`] a vertex within `tolerance` of `point` leaves
/// the ring as it is.
pub fn insert_coordinate(
    ring: &LineString<f64>,
    point: Coord<f64>,
    coincident: CoincidentVertex,
    tolerance: f64,
) -> Result<LineString<f64>, GeometryError> {
    let projection = project(ring, point)?;

    if coincident == CoincidentVertex::Merge
        && ring.coords().any(|c| coords_within(*c, point, tolerance))
    {
        return Ok(ring.clone());
    }

    let mut coords = ring.0.clone();
    coords.insert(projection.segment_index + 1, point);

    let mut result = LineString::new(coords);
    result.close();
    Ok(result)
}

/// Moves every vertex within `tolerance` of `from` to `to`. Returns the new
/// ring and the number of distinct vertices moved.
pub fn replace_vertex(
    ring: &LineString<f64>,
    from: Coord<f64>,
    to: Coord<f64>,
    tolerance: f64,
) -> Result<(LineString<f64>, usize), GeometryError> {
    validate_ring(ring)?;
    check_finite(to)?;

    let mut coords = ring.0.clone();
    let last = coords.len() - 1;
    let mut moved = 0;
    for coord in coords[..last].iter_mut() {
        if coords_within(*coord, from, tolerance) {
            *coord = to;
            moved += 1;
        }
    }
    coords[last] = coords[0];

    Ok((LineString::new(coords), moved))
}
