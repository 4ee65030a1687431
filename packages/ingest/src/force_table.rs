//! Force boundaries assembled from administrative areas.
//!
//! Before neighbourhood KML was published, force boundaries were built
//! from the counties, unitary authorities, and metropolitan districts each
//! force covers. The table is embedded at compile time.

use police_areas_area_models::{AreaRecord, AreaType, Country};
use police_areas_database::AreaStore;
use serde::Deserialize;

use crate::ImportError;
use crate::reconcile::AreaReconciler;

/// Number of forces in the embedded table. Enforced by a test.
#[cfg(test)]
const EXPECTED_FORCE_COUNT: usize = 43;

/// Type code of London boroughs.
pub const LONDON_BOROUGH_TYPE: &str = "LBO";

/// London boroughs policed by the Metropolitan Police: all of them except
/// the City of London.
pub const METROPOLITAN_BOROUGH_COUNT: usize = 32;

const FORCE_AREAS_TOML: &str = include_str!("../data/police_force_areas.toml");

/// One administrative area a force covers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdminLookup {
    /// Area type code (`CTY`, `UTA`, `MTD`, ...).
    #[serde(rename = "type")]
    pub type_code: String,
    /// Text the area's name must contain.
    pub name: String,
}

/// A force and the administrative areas it covers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForceArea {
    pub code: String,
    pub name: String,
    pub description: String,
    /// Covers every London borough except the City of London instead of
    /// the `lookup` list.
    #[serde(default)]
    pub london_boroughs: bool,
    #[serde(default)]
    pub lookup: Vec<AdminLookup>,
}

#[derive(Deserialize)]
struct ForceTable {
    force: Vec<ForceArea>,
}

/// Returns every force in the embedded table.
///
/// # Panics
///
/// Panics if the embedded TOML fails to parse. It is a compile-time
/// constant, so a failure is a development error caught by the tests.
#[must_use]
pub fn all_force_areas() -> Vec<ForceArea> {
    toml::de::from_str::<ForceTable>(FORCE_AREAS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse police force areas: {e}"))
        .force
}

fn resolve_areas(store: &dyn AreaStore, force: &ForceArea) -> Result<Vec<AreaRecord>, ImportError> {
    if force.london_boroughs {
        let boroughs: Vec<AreaRecord> = store
            .areas_of_type(&AreaType::from(LONDON_BOROUGH_TYPE))?
            .into_iter()
            .filter(|area| !area.name.contains("City of London"))
            .collect();
        if boroughs.len() != METROPOLITAN_BOROUGH_COUNT {
            return Err(ImportError::AdminLookup {
                message: format!(
                    "Expected {METROPOLITAN_BOROUGH_COUNT} London boroughs for {}, found {}",
                    force.code,
                    boroughs.len()
                ),
            });
        }
        return Ok(boroughs);
    }

    let mut areas = Vec::with_capacity(force.lookup.len());
    for lookup in &force.lookup {
        let mut matches =
            store.find_areas_by_name(&AreaType::from(lookup.type_code.as_str()), &lookup.name)?;
        match matches.len() {
            1 => areas.append(&mut matches),
            0 => {
                return Err(ImportError::AdminLookup {
                    message: format!(
                        "No {} area matching {:?} for {}",
                        lookup.type_code, lookup.name, force.code
                    ),
                });
            }
            n => {
                return Err(ImportError::AdminLookup {
                    message: format!(
                        "{n} {} areas matching {:?} for {}",
                        lookup.type_code, lookup.name, force.code
                    ),
                });
            }
        }
    }
    Ok(areas)
}

/// Creates or updates every force in the table and gives it the polygons
/// of the administrative areas it covers. Returns the number of forces
/// processed.
///
/// # Errors
///
/// * [`ImportError::Precondition`] if there is no pending generation
/// * [`ImportError::AdminLookup`] if a lookup matches no area or several
/// * [`ImportError::GenerationSkip`] if a force area is stale
/// * [`ImportError::Database`] if the store fails
pub fn forces_from_admin(store: &mut dyn AreaStore, commit: bool) -> Result<usize, ImportError> {
    let reconciler = AreaReconciler::from_store(store, commit)?;
    let forces = all_force_areas();

    for force in &forces {
        let areas = resolve_areas(store, force)?;
        let handle = reconciler.upsert(
            store,
            &force.code,
            &AreaType::Force,
            None,
            &force.name,
            Country::for_force(&force.code),
        )?;

        if let Some(force_id) = handle.id
            && commit
        {
            store.replace_polygons(force_id, &[])?;
            for area in &areas {
                let polygons: Vec<_> = store
                    .area_polygons(area.id)?
                    .into_iter()
                    .map(|stored| stored.polygon)
                    .collect();
                store.add_polygons(force_id, &polygons)?;
            }
        }

        log::info!(
            "{}: {} administrative areas ({})",
            force.code,
            areas.len(),
            areas
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if !commit {
        log::info!("(not saving force areas as --commit not specified)");
    }
    Ok(forces.len())
}
