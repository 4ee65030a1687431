//! Strategies for combining many polygons into one boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};

use geo::orient::Direction;
use geo::{BooleanOps, MultiPolygon, Orient, Polygon, Simplify};

use crate::validate::polygon_invalidity;

/// A way of combining polygons into one geometry.
///
/// Implementations return `None` when they cannot produce a result. A
/// panic inside the overlay engine is caught and reported the same way.
pub trait AggregationStrategy {
    /// Name recorded against each attempt.
    fn name(&self) -> &'static str;

    fn aggregate(&self, polygons: &[Polygon<f64>]) -> Option<MultiPolygon<f64>>;
}

/// Unions every polygon in one pass. Inputs are oriented first, since
/// `geo::unary_union` fills by the winding of the first ring it sees.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnionStrategy;

impl AggregationStrategy for UnionStrategy {
    fn name(&self) -> &'static str {
        "unionagg"
    }

    fn aggregate(&self, polygons: &[Polygon<f64>]) -> Option<MultiPolygon<f64>> {
        let oriented: Vec<Polygon<f64>> = polygons
            .iter()
            .map(|polygon| polygon.orient(Direction::Default))
            .collect();
        catch_unwind(AssertUnwindSafe(|| geo::unary_union(oriented.iter()))).ok()
    }
}

/// Collects the polygons, simplifies each, then merges them one at a time.
/// Lossier than [`UnionStrategy`], but a failing merge step only loses that
/// step rather than the whole result.
#[derive(Debug, Clone, Copy)]
pub struct CollectSimplifyStrategy {
    pub tolerance: f64,
}

impl Default for CollectSimplifyStrategy {
    fn default() -> Self {
        Self { tolerance: 0.0 }
    }
}

impl AggregationStrategy for CollectSimplifyStrategy {
    fn name(&self) -> &'static str {
        "collect_simplify"
    }

    fn aggregate(&self, polygons: &[Polygon<f64>]) -> Option<MultiPolygon<f64>> {
        let collected: Vec<Polygon<f64>> = polygons
            .iter()
            .map(|polygon| polygon.simplify(self.tolerance))
            .collect();

        let mut merged = MultiPolygon::new(Vec::new());
        for polygon in &collected {
            match catch_unwind(AssertUnwindSafe(|| merged.union(polygon))) {
                Ok(next) => merged = next,
                Err(_) => log::warn!("Skipping a polygon whose merge failed"),
            }
        }
        Some(merged)
    }
}

/// Outcome of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationAttempt {
    pub strategy: &'static str,
    pub successful: bool,
    /// Why the produced geometry was rejected, if one was produced.
    pub invalid_reason: Option<String>,
}

/// All attempts made and the accepted geometry, if any.
#[derive(Debug, Clone)]
pub struct AggregationReport {
    pub attempts: Vec<AggregationAttempt>,
    pub geometry: Option<MultiPolygon<f64>>,
}

/// Tries each strategy in order and keeps the first non-empty, valid
/// result.
#[must_use]
pub fn aggregate_with_fallback(
    polygons: &[Polygon<f64>],
    strategies: &[&dyn AggregationStrategy],
) -> AggregationReport {
    let mut attempts = Vec::with_capacity(strategies.len());

    for strategy in strategies {
        let (geometry, invalid_reason) = match strategy.aggregate(polygons) {
            None => (None, None),
            Some(result) if result.0.is_empty() => (None, None),
            Some(result) => match result.0.iter().find_map(polygon_invalidity) {
                Some(reason) => (None, Some(reason.to_string())),
                None => (Some(result), None),
            },
        };

        attempts.push(AggregationAttempt {
            strategy: strategy.name(),
            successful: geometry.is_some(),
            invalid_reason,
        });

        if geometry.is_some() {
            return AggregationReport { attempts, geometry };
        }
    }

    AggregationReport {
        attempts,
        geometry: None,
    }
}
