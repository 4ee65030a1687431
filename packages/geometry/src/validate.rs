//! Polygon validity checks and the single permitted repair.
//!
//! Validity is `geo`'s OGC simple-features check. Only ring
//! self-intersections (and rings meeting along a line) count as
//! repairable; anything else is reported as is.

use std::fmt;

use geo::orient::Direction;
use geo::validation::InvalidPolygon;
use geo::{CoordsIter, Geometry, MultiPolygon, Orient, Polygon, RemoveRepeatedPoints, Validation};

use crate::projection::to_osgb;
use crate::{GeometryError, polygons_of, to_geometry};

/// Why a polygon is invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidityReason(pub InvalidPolygon);

impl InvalidityReason {
    /// Whether this reason is a self-intersection of some kind, the only
    /// class the repair step knows how to fix.
    #[must_use]
    pub const fn is_self_intersection(&self) -> bool {
        matches!(
            self.0,
            InvalidPolygon::SelfIntersection(_) | InvalidPolygon::IntersectingRingsOnALine(..)
        )
    }
}

impl fmt::Display for InvalidityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validity of a geometry as received.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityReport {
    pub valid: bool,
    pub reason: Option<InvalidityReason>,
    pub coordinate_count: usize,
}

/// Output of [`validate_and_repair`].
#[derive(Debug, Clone)]
pub struct RepairedGeometry {
    /// Valid geometry in National Grid coordinates.
    pub geometry: Geometry<f64>,
    pub was_initially_valid: bool,
    pub initial_reason: Option<InvalidityReason>,
    pub original_coordinate_count: usize,
}

/// Returns why `polygon` is invalid, or `None` when it is valid. An empty
/// polygon is valid.
///
/// A polygon can fail several checks at once. Any reason outside the
/// self-intersection class wins, so a polygon is only treated as
/// repairable when every problem with it is a self-intersection.
#[must_use]
pub fn polygon_invalidity(polygon: &Polygon<f64>) -> Option<InvalidityReason> {
    let mut reasons: Vec<InvalidityReason> = polygon
        .validation_errors()
        .into_iter()
        .map(InvalidityReason)
        .collect();
    if reasons.is_empty() {
        return None;
    }
    let worst = reasons
        .iter()
        .position(|reason| !reason.is_self_intersection())
        .unwrap_or(0);
    Some(reasons.swap_remove(worst))
}

/// Validates every polygon of a multi-polygon, reporting the worst
/// invalidity found.
#[must_use]
pub fn validate_polygons(polygons: &[Polygon<f64>]) -> ValidityReport {
    let reasons: Vec<InvalidityReason> = polygons.iter().filter_map(polygon_invalidity).collect();
    let reason = reasons
        .iter()
        .find(|reason| !reason.is_self_intersection())
        .or_else(|| reasons.first())
        .cloned();
    ValidityReport {
        valid: reason.is_none(),
        reason,
        coordinate_count: polygons.iter().map(CoordsIter::coords_count).sum(),
    }
}

/// Validates a polygon or multi-polygon.
///
/// # Errors
///
/// Returns [`GeometryError::UnsupportedGeometry`] for any other geometry
/// kind.
pub fn validate_geometry(geometry: &Geometry<f64>) -> Result<ValidityReport, GeometryError> {
    Ok(validate_polygons(&polygons_of(geometry)?))
}

/// Topology-discarding repair: drops repeated points and rings left with
/// fewer than three distinct points, orients every polygon the same way,
/// then lets the overlay engine rebuild the rings. A bow-tie keeps the
/// lobe wound the same way as the rest of its polygon.
///
/// `geo::unary_union` takes its fill rule from the first ring it sees, so
/// inputs must share one orientation or the odd ones out are dropped.
#[must_use]
pub fn repair(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    let cleaned: Vec<Polygon<f64>> = polygons
        .iter()
        .map(|polygon| polygon.remove_repeated_points())
        .filter(|polygon| polygon.exterior().0.len() >= 4)
        .map(|polygon| {
            let interiors = polygon
                .interiors()
                .iter()
                .filter(|ring| ring.0.len() >= 4)
                .cloned()
                .collect();
            Polygon::new(polygon.exterior().clone(), interiors).orient(Direction::Default)
        })
        .collect();
    geo::unary_union(cleaned.iter())
}

/// Validates a raw WGS84 boundary, reprojects it to the National Grid, and
/// repairs it once if it arrived with a self-intersection.
///
/// Reprojection is assumed not to change validity; the property tests
/// below check that assumption over generated shapes.
///
/// # Errors
///
/// * [`GeometryError::UnsupportedGeometry`] if the input is not a polygon
///   or multi-polygon
/// * [`GeometryError::NotSelfIntersection`] if the input is invalid for
///   any other reason, in which case no repair is attempted
/// * [`GeometryError::StillInvalid`] if the repaired geometry is invalid
///   or empty
pub fn validate_and_repair(raw: &Geometry<f64>) -> Result<RepairedGeometry, GeometryError> {
    let polygons = polygons_of(raw)?;
    let report = validate_polygons(&polygons);

    if let Some(reason) = &report.reason
        && !reason.is_self_intersection()
    {
        return Err(GeometryError::NotSelfIntersection {
            reason: reason.clone(),
            coordinate_count: report.coordinate_count,
        });
    }

    let projected: Vec<Polygon<f64>> = polygons.iter().map(to_osgb).collect();

    let repaired = if report.valid {
        projected
    } else {
        let repaired = repair(&projected).0;
        if let Some(reason) = repaired.iter().find_map(polygon_invalidity) {
            return Err(GeometryError::StillInvalid {
                reason: reason.to_string(),
            });
        }
        repaired
    };

    let geometry = to_geometry(repaired).ok_or_else(|| GeometryError::StillInvalid {
        reason: "repair produced an empty geometry".to_string(),
    })?;

    Ok(RepairedGeometry {
        geometry,
        was_initially_valid: report.valid,
        initial_reason: report.reason,
        original_coordinate_count: report.coordinate_count,
    })
}
