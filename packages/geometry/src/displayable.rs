//! Removes rings that would vanish when the map renderer simplifies
//! boundaries.
//!
//! The renderer reprojects to WGS84 and simplifies at
//! [`DISPLAY_TOLERANCE_DEGREES`]. Any ring that collapses under that
//! simplification is dropped here so no invisible slivers are stored.

use geo::{Area, Geometry, LineString, Polygon, RemoveRepeatedPoints, Simplify};

use crate::projection::osgb_to_wgs84;
use crate::{GeometryError, polygons_of, to_geometry};

/// Simplification tolerance used by the map renderer, in degrees.
pub const DISPLAY_TOLERANCE_DEGREES: f64 = 0.0001;

/// Result of [`make_displayable`].
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayableOutcome {
    /// Surviving polygons, or `None` when nothing is left to display.
    pub geometry: Option<Geometry<f64>>,
    pub holes_before: usize,
    /// Hole count over the survivors; `None` when nothing survived.
    pub holes_after: Option<usize>,
    /// Outer rings dropped together with their whole polygon.
    pub tiny_outer_rings: Vec<LineString<f64>>,
}

impl DisplayableOutcome {
    /// Whether the hole count changed. Also true when nothing survived,
    /// since there is then no geometry left to hold the holes.
    #[must_use]
    pub fn holes_changed(&self) -> bool {
        self.holes_after != Some(self.holes_before)
    }

    /// The surviving polygons.
    #[must_use]
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        match &self.geometry {
            Some(Geometry::Polygon(polygon)) => vec![polygon.clone()],
            Some(Geometry::MultiPolygon(multi)) => multi.0.clone(),
            _ => Vec::new(),
        }
    }
}

/// Whether a National Grid ring collapses when reprojected to WGS84 and
/// simplified at the display tolerance.
///
/// ```
/// use geo::LineString;
/// use police_areas_geometry::displayable::is_too_tiny;
///
/// let square = LineString::from(vec![(0.0, 0.0), (0.0, 100.0), (100.0, 100.0), (100.0, 0.0), (0.0, 0.0)]);
/// assert!(!is_too_tiny(&square));
///
/// let sliver = LineString::from(vec![
///     (533_176.767_605_294_1, 181_046.629_936_181_2),
///     (533_307.745_742_930_1, 181_040.885_936_471_28),
///     (533_176.767_605_298_2, 181_046.629_936_187_32),
///     (533_176.767_605_294_1, 181_046.629_936_181_2),
/// ]);
/// assert!(is_too_tiny(&sliver));
/// ```
#[must_use]
pub fn is_too_tiny(ring: &LineString<f64>) -> bool {
    let geographic: LineString<f64> = ring.coords().map(|c| osgb_to_wgs84(*c)).collect();
    let simplified = geographic
        .simplify(DISPLAY_TOLERANCE_DEGREES)
        .remove_repeated_points();
    // Closed, so three distinct points need four coordinates.
    simplified.0.len() < 4 || Polygon::new(simplified, vec![]).unsigned_area() == 0.0
}

/// Drops the holes that are too tiny to display; `None` when the outer
/// ring itself is too tiny.
#[must_use]
pub fn displayable_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    if is_too_tiny(polygon.exterior()) {
        return None;
    }
    let holes = polygon
        .interiors()
        .iter()
        .filter(|ring| !is_too_tiny(ring))
        .cloned()
        .collect();
    Some(Polygon::new(polygon.exterior().clone(), holes))
}

/// Applies [`displayable_polygon`] to every polygon of a polygon or
/// multi-polygon. One survivor comes back as a polygon, several as a
/// multi-polygon.
///
/// # Errors
///
/// Returns [`GeometryError::UnsupportedGeometry`] for any other geometry
/// kind.
pub fn make_displayable(geometry: &Geometry<f64>) -> Result<DisplayableOutcome, GeometryError> {
    let polygons = polygons_of(geometry)?;
    let holes_before = polygons.iter().map(|p| p.interiors().len()).sum();

    let mut survivors = Vec::with_capacity(polygons.len());
    let mut tiny_outer_rings = Vec::new();
    for polygon in &polygons {
        match displayable_polygon(polygon) {
            Some(kept) => survivors.push(kept),
            None => tiny_outer_rings.push(polygon.exterior().clone()),
        }
    }

    let holes_after = if survivors.is_empty() {
        None
    } else {
        Some(survivors.iter().map(|p| p.interiors().len()).sum())
    };

    Ok(DisplayableOutcome {
        geometry: to_geometry(survivors),
        holes_before,
        holes_after,
        tiny_outer_rings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, polygon};
    use proptest::prelude::*;

    fn square(x: f64, y: f64, size: f64) -> LineString<f64> {
        LineString::from(vec![
            (x, y),
            (x + size, y),
            (x + size, y + size),
            (x, y + size),
            (x, y),
        ])
    }

    fn sliver() -> LineString<f64> {
        LineString::from(vec![
            (533_176.767_605_294_1, 181_046.629_936_181_2),
            (533_307.745_742_930_1, 181_040.885_936_471_28),
            (533_176.767_605_298_2, 181_046.629_936_187_32),
            (533_176.767_605_294_1, 181_046.629_936_181_2),
        ])
    }

    #[test]
    fn three_valid_polygons_stay_three() {
        let multi = MultiPolygon::new(vec![
            Polygon::new(square(530_000.0, 180_000.0, 1_000.0), vec![]),
            Polygon::new(square(532_000.0, 180_000.0, 1_000.0), vec![]),
            Polygon::new(square(534_000.0, 180_000.0, 1_000.0), vec![]),
        ]);
        let outcome = make_displayable(&Geometry::MultiPolygon(multi)).unwrap();
        let Some(Geometry::MultiPolygon(result)) = &outcome.geometry else {
            panic!("expected a multi-polygon");
        };
        assert_eq!(result.0.len(), 3);
        assert!(outcome.tiny_outer_rings.is_empty());
        assert!(!outcome.holes_changed());
    }

    #[test]
    fn tiny_hole_is_dropped_and_large_hole_kept() {
        let polygon = Polygon::new(
            square(530_000.0, 180_000.0, 1_000.0),
            vec![
                square(530_100.0, 180_100.0, 3.0),
                square(530_400.0, 180_400.0, 200.0),
            ],
        );
        let outcome = make_displayable(&Geometry::Polygon(polygon)).unwrap();
        assert_eq!(outcome.holes_before, 2);
        assert_eq!(outcome.holes_after, Some(1));
        assert!(outcome.holes_changed());
        let Some(Geometry::Polygon(kept)) = outcome.geometry else {
            panic!("expected a single polygon");
        };
        assert_eq!(kept.interiors()[0], square(530_400.0, 180_400.0, 200.0));
    }

    #[test]
    fn tiny_outer_ring_drops_whole_polygon() {
        let multi = MultiPolygon::new(vec![
            Polygon::new(square(530_000.0, 180_000.0, 1_000.0), vec![]),
            Polygon::new(sliver(), vec![]),
        ]);
        let outcome = make_displayable(&Geometry::MultiPolygon(multi)).unwrap();
        assert_eq!(outcome.tiny_outer_rings, vec![sliver()]);
        assert!(matches!(outcome.geometry, Some(Geometry::Polygon(_))));
    }

    #[test]
    fn nothing_left_yields_none() {
        let outcome = make_displayable(&Geometry::Polygon(Polygon::new(sliver(), vec![]))).unwrap();
        assert_eq!(outcome.geometry, None);
        assert_eq!(outcome.holes_after, None);
        assert!(outcome.holes_changed());
        assert!(outcome.polygons().is_empty());
    }

    #[test]
    fn line_strings_are_unsupported() {
        let err = make_displayable(&Geometry::LineString(sliver())).unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedGeometry { .. }));
    }

    #[test]
    fn hundred_metre_square_is_displayable() {
        let polygon = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 100.0),
            (x: 100.0, y: 100.0),
            (x: 100.0, y: 0.0),
        ];
        assert_eq!(displayable_polygon(&polygon), Some(polygon));
    }

    fn ring_sizes() -> impl Strategy<Value = Vec<(f64, Vec<f64>)>> {
        prop::collection::vec(
            (1.0f64..400.0, prop::collection::vec(0.5f64..40.0, 0..4)),
            1..5,
        )
    }

    proptest! {
        #[test]
        fn make_displayable_is_idempotent(sizes in ring_sizes()) {
            let polygons: Vec<Polygon<f64>> = sizes
                .iter()
                .enumerate()
                .map(|(i, (outer, holes))| {
                    #[allow(clippy::cast_precision_loss)]
                    let x = 400_000.0 + 1_000.0 * i as f64;
                    let interiors = holes
                        .iter()
                        .enumerate()
                        .map(|(j, size)| {
                            #[allow(clippy::cast_precision_loss)]
                            let offset = 50.0 * j as f64;
                            square(x + offset, 300_000.0 + offset, *size)
                        })
                        .collect();
                    Polygon::new(square(x, 300_000.0, *outer), interiors)
                })
                .collect();

            let once = make_displayable(&Geometry::MultiPolygon(MultiPolygon::new(polygons))).unwrap();
            let Some(geometry) = once.geometry.clone() else {
                return Ok(());
            };
            let twice = make_displayable(&geometry).unwrap();
            prop_assert_eq!(twice.geometry, once.geometry);
            prop_assert!(twice.tiny_outer_rings.is_empty());
        }
    }
}
