//! Matching incoming boundaries to stored areas.
//!
//! An area is found by `(code, type, parent)`. An existing area must have
//! been seen in the active generation; its validity window is then
//! extended to the generation being imported. New areas start and end in
//! that generation. Nothing is written unless the run is committing.

use geo::Polygon;
use police_areas_area_models::{
    AreaDraft, AreaId, AreaType, Country, GeometryId, POLICE_CODE_TYPE, POLICE_NAME_TYPE,
};
use police_areas_database::AreaStore;

use crate::ImportError;

/// An area matched or created by [`AreaReconciler::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaHandle {
    /// `None` for a new area in a run that is not committing.
    pub id: Option<AreaId>,
    pub code: String,
    pub area_type: AreaType,
    pub name: String,
    /// Whether the area did not exist before this run.
    pub created: bool,
}

/// Upserts areas into the generation being imported.
#[derive(Debug, Clone, Copy)]
pub struct AreaReconciler {
    active: Option<i64>,
    new_generation: i64,
    commit: bool,
}

impl AreaReconciler {
    #[must_use]
    pub const fn new(active: Option<i64>, new_generation: i64, commit: bool) -> Self {
        Self {
            active,
            new_generation,
            commit,
        }
    }

    /// Reads the active and pending generations from the store.
    ///
    /// # Errors
    ///
    /// * [`ImportError::Precondition`] if there is no pending generation
    /// * [`ImportError::Database`] if the lookup fails
    pub fn from_store(store: &dyn AreaStore, commit: bool) -> Result<Self, ImportError> {
        let active = store.active_generation()?.map(|g| g.id);
        let Some(pending) = store.pending_generation()? else {
            return Err(ImportError::Precondition {
                message: "No new generation to be used for import!".to_string(),
            });
        };
        log::info!(
            "Importing into generation {} ({}), active generation {}",
            pending.id,
            pending.description,
            active.map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        Ok(Self::new(active, pending.id, commit))
    }

    #[must_use]
    pub const fn commit(&self) -> bool {
        self.commit
    }

    #[must_use]
    pub const fn new_generation(&self) -> i64 {
        self.new_generation
    }

    /// Finds or creates the area for `code` under `parent`, extends its
    /// generation window, and sets its police name and code.
    ///
    /// # Errors
    ///
    /// * [`ImportError::GenerationSkip`] if the existing area's
    ///   `generation_high` is older than the active generation
    /// * [`ImportError::Database`] if the store fails
    pub fn upsert(
        &self,
        store: &mut dyn AreaStore,
        code: &str,
        area_type: &AreaType,
        parent: Option<&AreaHandle>,
        name: &str,
        country: Country,
    ) -> Result<AreaHandle, ImportError> {
        let parent_id = parent.and_then(|p| p.id);
        let existing = match parent {
            Some(p) if p.id.is_none() => None,
            _ => store.find_area(code, area_type, parent_id)?,
        };

        let (draft, created) = if let Some(record) = existing {
            if let Some(active) = self.active
                && record.generation_high < active
            {
                return Err(ImportError::generation_skip(
                    code,
                    area_type,
                    record.generation_high,
                    active,
                ));
            }
            let mut draft = AreaDraft::from(&record);
            draft.generation_high = self.new_generation;
            draft.name = name.to_string();
            draft.country = Some(country);
            (draft, false)
        } else {
            let draft = AreaDraft {
                id: None,
                area_type: area_type.clone(),
                country: Some(country),
                parent: parent_id,
                generation_low: self.new_generation,
                generation_high: self.new_generation,
                name: name.to_string(),
            };
            (draft, true)
        };

        let id = if self.commit {
            let id = store.save_area(&draft)?;
            store.upsert_name(id, POLICE_NAME_TYPE, name)?;
            store.upsert_code(id, POLICE_CODE_TYPE, code)?;
            Some(id)
        } else {
            draft.id
        };

        log::debug!(
            "{} {area_type} {code} ({name})",
            if created { "Created" } else { "Updated" }
        );

        Ok(AreaHandle {
            id,
            code: code.to_string(),
            area_type: area_type.clone(),
            name: name.to_string(),
            created,
        })
    }

    /// Replaces an area's polygons, returning each polygon with its stored
    /// id. Ids are `None` when nothing was written.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Database`] if the store fails.
    pub fn attach_polygons(
        &self,
        store: &mut dyn AreaStore,
        area: &AreaHandle,
        polygons: Vec<Polygon<f64>>,
    ) -> Result<Vec<(Polygon<f64>, Option<GeometryId>)>, ImportError> {
        match area.id {
            Some(id) if self.commit => Ok(store
                .replace_polygons(id, &polygons)?
                .into_iter()
                .map(|stored| (stored.polygon, Some(stored.id)))
                .collect()),
            _ => Ok(polygons.into_iter().map(|p| (p, None)).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use police_areas_database::memory::MemoryAreaStore;

    fn force(reconciler: &AreaReconciler, store: &mut MemoryAreaStore) -> AreaHandle {
        reconciler
            .upsert(
                store,
                "kent",
                &AreaType::Force,
                None,
                "Kent Police",
                Country::England,
            )
            .unwrap()
    }

    #[test]
    fn upsert_twice_returns_same_area() {
        let mut store = MemoryAreaStore::new();
        let reconciler = AreaReconciler::new(None, 1, true);

        let first = force(&reconciler, &mut store);
        let second = force(&reconciler, &mut store);
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.areas().count(), 1);

        let id = first.id.unwrap();
        assert_eq!(store.name_of(id, POLICE_NAME_TYPE), Some("Kent Police"));
        assert_eq!(store.code_of(id, POLICE_CODE_TYPE), Some("kent"));
    }

    #[test]
    fn neighbourhood_codes_are_scoped_to_their_force() {
        let mut store = MemoryAreaStore::new();
        let reconciler = AreaReconciler::new(None, 1, true);
        let kent = force(&reconciler, &mut store);
        let essex = reconciler
            .upsert(
                &mut store,
                "essex",
                &AreaType::Force,
                None,
                "Essex Police",
                Country::England,
            )
            .unwrap();

        let a = reconciler
            .upsert(
                &mut store,
                "TC1",
                &AreaType::Neighbourhood,
                Some(&kent),
                "Town Centre",
                Country::England,
            )
            .unwrap();
        let b = reconciler
            .upsert(
                &mut store,
                "TC1",
                &AreaType::Neighbourhood,
                Some(&essex),
                "Town Centre",
                Country::England,
            )
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.areas().count(), 4);
    }

    #[test]
    fn generation_window_grows_forward() {
        let mut store = MemoryAreaStore::new();
        let id = force(&AreaReconciler::new(None, 1, true), &mut store)
            .id
            .unwrap();

        let handle = force(&AreaReconciler::new(Some(1), 2, true), &mut store);
        assert_eq!(handle.id, Some(id));
        let record = store.areas().next().unwrap();
        assert_eq!(record.generation_low, 1);
        assert_eq!(record.generation_high, 2);
    }

    #[test]
    fn stale_area_is_a_generation_skip() {
        let mut store = MemoryAreaStore::new();
        force(&AreaReconciler::new(None, 1, true), &mut store);

        let err = AreaReconciler::new(Some(2), 3, true)
            .upsert(
                &mut store,
                "kent",
                &AreaType::Force,
                None,
                "Kent Police",
                Country::England,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::GenerationSkip {
                generation_high: 1,
                active: 2,
                ..
            }
        ));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let mut store = MemoryAreaStore::new();
        let reconciler = AreaReconciler::new(None, 1, false);
        let kent = force(&reconciler, &mut store);
        assert_eq!(kent.id, None);

        let nbh = reconciler
            .upsert(
                &mut store,
                "K1",
                &AreaType::Neighbourhood,
                Some(&kent),
                "Harbour",
                Country::England,
            )
            .unwrap();
        assert!(nbh.created);

        let attached = reconciler
            .attach_polygons(
                &mut store,
                &nbh,
                vec![polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0)]],
            )
            .unwrap();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].1, None);
        assert_eq!(store.areas().count(), 0);
    }

    #[test]
    fn missing_pending_generation_is_a_precondition() {
        let store = MemoryAreaStore::new();
        assert!(matches!(
            AreaReconciler::from_store(&store, true),
            Err(ImportError::Precondition { .. })
        ));
    }
}
