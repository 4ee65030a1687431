#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Boundary geometry handling for the police area import.
//!
//! Raw boundaries arrive as WGS84 longitude/latitude. They are validated,
//! reprojected to the OSGB National Grid, repaired once if they arrived
//! self-intersecting, and filtered down to what the map renderer can
//! actually show. Force boundaries are aggregated from their
//! neighbourhoods with a primary strategy and a fallback.

pub mod aggregate;
pub mod displayable;
pub mod projection;
pub mod validate;

use geo::{Geometry, MultiPolygon, Polygon};

pub use displayable::{DisplayableOutcome, make_displayable};
pub use validate::{InvalidityReason, RepairedGeometry, ValidityReport, validate_and_repair};

/// Errors from geometry validation and repair.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// Only polygons and multi-polygons are boundaries.
    #[error("Unsupported geometry type: {kind}")]
    UnsupportedGeometry { kind: &'static str },

    /// The geometry is invalid for a reason the repair step does not
    /// handle.
    #[error("Invalid geometry found before transforming, and not a self-intersection: {reason} ({coordinate_count} coordinates)")]
    NotSelfIntersection {
        reason: InvalidityReason,
        coordinate_count: usize,
    },

    #[error("Geometry still invalid after simplifying: {reason}")]
    StillInvalid { reason: String },
}

const fn kind_of(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// The polygons making up a polygon or multi-polygon.
///
/// # Errors
///
/// Returns [`GeometryError::UnsupportedGeometry`] for any other geometry
/// kind.
pub fn polygons_of(geometry: &Geometry<f64>) -> Result<Vec<Polygon<f64>>, GeometryError> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(vec![polygon.clone()]),
        Geometry::MultiPolygon(multi) => Ok(multi.0.clone()),
        other => Err(GeometryError::UnsupportedGeometry {
            kind: kind_of(other),
        }),
    }
}

/// Wraps polygons back up: `None` for none, a polygon for one, a
/// multi-polygon otherwise.
#[must_use]
pub fn to_geometry(mut polygons: Vec<Polygon<f64>>) -> Option<Geometry<f64>> {
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn to_geometry_unwraps_single_polygon() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert_eq!(to_geometry(vec![]), None);
        assert_eq!(
            to_geometry(vec![square.clone()]),
            Some(Geometry::Polygon(square.clone()))
        );
        assert!(matches!(
            to_geometry(vec![square.clone(), square]),
            Some(Geometry::MultiPolygon(multi)) if multi.0.len() == 2
        ));
    }

    #[test]
    fn polygons_of_rejects_points() {
        let err = polygons_of(&Geometry::Point(geo::Point::new(1.0, 2.0))).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported geometry type: Point");
    }
}
