//! Rebuilding a force's boundary from its neighbourhoods.

use std::collections::BTreeSet;

use geo::{Geometry, Polygon};
use police_areas_area_models::GeometryId;
use police_areas_database::AreaStore;
use police_areas_geometry::aggregate::{
    AggregationStrategy, CollectSimplifyStrategy, UnionStrategy, aggregate_with_fallback,
};
use police_areas_geometry::make_displayable;

use crate::ImportError;
use crate::problems::{Anomaly, AnomalyDetail, FORCE_SCOPE, ProblemSink};
use crate::reconcile::AreaHandle;

/// Unions a force's stored neighbourhood polygons, falling back to a
/// second strategy when the first produces nothing usable.
pub struct ForceAggregator {
    primary: Box<dyn AggregationStrategy>,
    fallback: Box<dyn AggregationStrategy>,
}

impl Default for ForceAggregator {
    fn default() -> Self {
        Self::with_strategies(
            Box::new(UnionStrategy),
            Box::new(CollectSimplifyStrategy::default()),
        )
    }
}

impl ForceAggregator {
    #[must_use]
    pub fn with_strategies(
        primary: Box<dyn AggregationStrategy>,
        fallback: Box<dyn AggregationStrategy>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Builds, filters, and stores the force's boundary.
    ///
    /// Polygons whose ids are in `excluded` are left out. Returns the
    /// stored geometry, or `None` when both strategies failed or nothing
    /// displayable remained; in either case the force keeps its previous
    /// polygons.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Database`] if reading or writing polygons
    /// fails.
    pub fn aggregate(
        &self,
        store: &mut dyn AreaStore,
        force: &AreaHandle,
        excluded: &BTreeSet<GeometryId>,
        sink: &mut dyn ProblemSink,
    ) -> Result<Option<Geometry<f64>>, ImportError> {
        let Some(force_id) = force.id else {
            return Ok(None);
        };

        let polygons: Vec<Polygon<f64>> = store
            .child_polygons(force_id)?
            .into_iter()
            .filter(|stored| !excluded.contains(&stored.id))
            .map(|stored| stored.polygon)
            .collect();
        log::info!(
            "Creating geometry for {} from {} neighbourhood polygons ({} excluded)",
            force.code,
            polygons.len(),
            excluded.len()
        );

        let report = aggregate_with_fallback(&polygons, &[&*self.primary, &*self.fallback]);
        for attempt in &report.attempts {
            if attempt.successful {
                log::info!("{}: {} succeeded", force.code, attempt.strategy);
            } else {
                log::warn!("{}: {} failed", force.code, attempt.strategy);
            }
            sink.record(Anomaly::new(
                &force.code,
                FORCE_SCOPE,
                AnomalyDetail::ForceGeometryCreationAttempt {
                    method: attempt.strategy.to_string(),
                    successful: attempt.successful,
                    invalid_reason: attempt.invalid_reason.clone(),
                },
            ));
        }

        let Some(merged) = report.geometry else {
            log::warn!(
                "Could not create a geometry for {}; it keeps its previous polygons",
                force.code
            );
            return Ok(None);
        };

        let outcome = make_displayable(&Geometry::MultiPolygon(merged))?;
        for ring in &outcome.tiny_outer_rings {
            sink.record(Anomaly::new(
                &force.code,
                FORCE_SCOPE,
                AnomalyDetail::OuterRingTooTiny {
                    ring: ring.coords().map(|c| [c.x, c.y]).collect(),
                },
            ));
        }
        if outcome.holes_changed() {
            sink.record(Anomaly::new(
                &force.code,
                FORCE_SCOPE,
                AnomalyDetail::RemovedHoles {
                    holes_before: outcome.holes_before,
                    holes_after: outcome.holes_after,
                },
            ));
        }

        if outcome.geometry.is_none() {
            log::warn!("No displayable geometry left for {}", force.code);
            sink.record(Anomaly::new(
                &force.code,
                FORCE_SCOPE,
                AnomalyDetail::PolygonsNotUpdated,
            ));
            return Ok(None);
        }

        store.replace_polygons(force_id, &outcome.polygons())?;
        Ok(outcome.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, LineString, MultiPolygon};
    use police_areas_area_models::{AreaDraft, AreaType, Country};
    use police_areas_database::memory::MemoryAreaStore;

    use crate::problems::{AnomalyKind, ProblemLog};

    struct FailingStrategy;

    impl AggregationStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "unionagg"
        }

        fn aggregate(&self, _polygons: &[Polygon<f64>]) -> Option<MultiPolygon<f64>> {
            None
        }
    }

    /// 1 km squares along a row in central England, in National Grid
    /// metres.
    fn square(i: u32) -> Polygon<f64> {
        let x = 400_000.0 + f64::from(i) * 1_000.0;
        let y = 300_000.0;
        Polygon::new(
            LineString::from(vec![
                (x, y),
                (x + 1_000.0, y),
                (x + 1_000.0, y + 1_000.0),
                (x, y + 1_000.0),
                (x, y),
            ]),
            Vec::new(),
        )
    }

    /// [`square`] wound clockwise.
    fn clockwise_square(i: u32) -> Polygon<f64> {
        let mut ring = square(i).exterior().clone();
        ring.0.reverse();
        Polygon::new(ring, Vec::new())
    }

    fn area(store: &mut MemoryAreaStore, area_type: AreaType, parent: Option<i64>) -> i64 {
        store
            .save_area(&AreaDraft {
                id: None,
                area_type,
                country: Some(Country::England),
                parent,
                generation_low: 1,
                generation_high: 1,
                name: String::new(),
            })
            .unwrap()
    }

    fn force_with_neighbourhoods(store: &mut MemoryAreaStore, count: u32) -> (AreaHandle, Vec<i64>) {
        let force_id = area(store, AreaType::Force, None);
        let mut polygon_ids = Vec::new();
        for i in 0..count {
            let nbh = area(store, AreaType::Neighbourhood, Some(force_id));
            let stored = store.replace_polygons(nbh, &[square(i)]).unwrap();
            polygon_ids.push(stored[0].id);
        }
        let handle = AreaHandle {
            id: Some(force_id),
            code: "staffordshire".to_string(),
            area_type: AreaType::Force,
            name: "Staffordshire Police".to_string(),
            created: false,
        };
        (handle, polygon_ids)
    }

    fn methods(log: &ProblemLog) -> Vec<(String, bool)> {
        log.channel(AnomalyKind::ForceGeometryCreationAttempts)
            .map(|a| match &a.detail {
                AnomalyDetail::ForceGeometryCreationAttempt {
                    method, successful, ..
                } => (method.clone(), *successful),
                other => panic!("unexpected detail {other:?}"),
            })
            .collect()
    }

    #[test]
    fn fallback_runs_when_primary_fails() {
        let mut store = MemoryAreaStore::new();
        let (force, _) = force_with_neighbourhoods(&mut store, 5);
        let aggregator = ForceAggregator::with_strategies(
            Box::new(FailingStrategy),
            Box::new(CollectSimplifyStrategy::default()),
        );
        let mut log = ProblemLog::new();

        let geometry = aggregator
            .aggregate(&mut store, &force, &BTreeSet::new(), &mut log)
            .unwrap();

        assert!(geometry.is_some());
        assert_eq!(
            methods(&log),
            [
                ("unionagg".to_string(), false),
                ("collect_simplify".to_string(), true)
            ]
        );
        assert!(!store.area_polygons(force.id.unwrap()).unwrap().is_empty());
    }

    #[test]
    fn primary_success_skips_fallback() {
        let mut store = MemoryAreaStore::new();
        let (force, _) = force_with_neighbourhoods(&mut store, 3);
        let mut log = ProblemLog::new();

        ForceAggregator::default()
            .aggregate(&mut store, &force, &BTreeSet::new(), &mut log)
            .unwrap();

        assert_eq!(methods(&log), [("unionagg".to_string(), true)]);
        let stored = store.area_polygons(force.id.unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn both_failing_leaves_previous_polygons() {
        let mut store = MemoryAreaStore::new();
        let (force, _) = force_with_neighbourhoods(&mut store, 2);
        let previous = store.replace_polygons(force.id.unwrap(), &[square(9)]).unwrap();
        let aggregator =
            ForceAggregator::with_strategies(Box::new(FailingStrategy), Box::new(FailingStrategy));
        let mut log = ProblemLog::new();

        let geometry = aggregator
            .aggregate(&mut store, &force, &BTreeSet::new(), &mut log)
            .unwrap();

        assert!(geometry.is_none());
        assert_eq!(log.count(AnomalyKind::ForceGeometryCreationAttempts), 2);
        assert_eq!(store.area_polygons(force.id.unwrap()).unwrap(), previous);
    }

    #[test]
    fn excluded_polygons_are_left_out() {
        let mut store = MemoryAreaStore::new();
        let (force, ids) = force_with_neighbourhoods(&mut store, 3);
        // Dropping the middle square leaves two disjoint pieces.
        let excluded = BTreeSet::from([ids[1]]);
        let mut log = ProblemLog::new();

        ForceAggregator::default()
            .aggregate(&mut store, &force, &excluded, &mut log)
            .unwrap();

        assert_eq!(store.area_polygons(force.id.unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn neighbourhoods_wound_either_way_all_count() {
        let mut store = MemoryAreaStore::new();
        let (force, _) = force_with_neighbourhoods(&mut store, 0);
        let force_id = force.id.unwrap();
        // Squares 0 and 1 touch; square 4 stands apart.
        for polygon in [clockwise_square(0), square(1), clockwise_square(4)] {
            let nbh = area(&mut store, AreaType::Neighbourhood, Some(force_id));
            store.replace_polygons(nbh, &[polygon]).unwrap();
        }
        let mut log = ProblemLog::new();

        ForceAggregator::default()
            .aggregate(&mut store, &force, &BTreeSet::new(), &mut log)
            .unwrap();

        assert_eq!(methods(&log), [("unionagg".to_string(), true)]);
        let stored = store.area_polygons(force_id).unwrap();
        assert_eq!(stored.len(), 2);
        let total: f64 = stored.iter().map(|p| p.polygon.unsigned_area()).sum();
        assert!((total - 3_000_000.0).abs() < 1.0, "area {total}");
    }
}
