//! In-memory [`AreaStore`].
//!
//! Holds everything in ordered maps. Used by dry runs that start from an
//! empty dataset and by tests.

use std::collections::BTreeMap;

use geo::Polygon;
use police_areas_area_models::{
    AreaDraft, AreaId, AreaRecord, AreaType, Generation, GeometryId, StoredPolygon,
};

use crate::{AreaStore, DbError};

/// An [`AreaStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryAreaStore {
    generations: Vec<Generation>,
    areas: BTreeMap<AreaId, AreaRecord>,
    names: BTreeMap<(AreaId, String), String>,
    codes: BTreeMap<(AreaId, String), String>,
    polygons: BTreeMap<GeometryId, StoredPolygon>,
    next_area_id: AreaId,
    next_polygon_id: GeometryId,
}

impl MemoryAreaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored area.
    pub fn areas(&self) -> impl Iterator<Item = &AreaRecord> {
        self.areas.values()
    }

    /// Returns the name of the given type attached to an area.
    #[must_use]
    pub fn name_of(&self, area: AreaId, name_type: &str) -> Option<&str> {
        self.names
            .get(&(area, name_type.to_string()))
            .map(String::as_str)
    }

    /// Returns the code of the given type attached to an area.
    #[must_use]
    pub fn code_of(&self, area: AreaId, code_type: &str) -> Option<&str> {
        self.codes
            .get(&(area, code_type.to_string()))
            .map(String::as_str)
    }

    fn has_code(&self, area: AreaId, code: &str) -> bool {
        self.codes
            .iter()
            .any(|((id, _), value)| *id == area && value == code)
    }

    fn insert_polygons(&mut self, area: AreaId, polygons: &[Polygon<f64>]) -> Vec<StoredPolygon> {
        polygons
            .iter()
            .map(|polygon| {
                self.next_polygon_id += 1;
                let stored = StoredPolygon {
                    id: self.next_polygon_id,
                    area_id: area,
                    polygon: polygon.clone(),
                };
                self.polygons.insert(stored.id, stored.clone());
                stored
            })
            .collect()
    }
}

impl AreaStore for MemoryAreaStore {
    fn active_generation(&self) -> Result<Option<Generation>, DbError> {
        Ok(crate::active_of(&self.generations).cloned())
    }

    fn pending_generation(&self) -> Result<Option<Generation>, DbError> {
        Ok(crate::pending_of(&self.generations).cloned())
    }

    fn create_generation(&mut self, description: &str) -> Result<Generation, DbError> {
        if let Some(pending) = crate::pending_of(&self.generations) {
            return Err(DbError::Conversion {
                message: format!("Generation {} is already pending", pending.id),
            });
        }
        let id = self.generations.iter().map(|g| g.id).max().unwrap_or(0) + 1;
        let generation = Generation {
            id,
            active: false,
            description: description.to_string(),
        };
        self.generations.push(generation.clone());
        Ok(generation)
    }

    fn activate_pending_generation(&mut self) -> Result<Option<Generation>, DbError> {
        let Some(id) = crate::pending_of(&self.generations).map(|g| g.id) else {
            return Ok(None);
        };
        let generation = self.generations.iter_mut().find(|g| g.id == id).map(|g| {
            g.active = true;
            g.clone()
        });
        Ok(generation)
    }

    fn find_area(
        &self,
        code: &str,
        area_type: &AreaType,
        parent: Option<AreaId>,
    ) -> Result<Option<AreaRecord>, DbError> {
        let mut matches = self.areas.values().filter(|area| {
            &area.area_type == area_type && area.parent == parent && self.has_code(area.id, code)
        });

        let found = matches.next().cloned();
        if matches.next().is_some() {
            return Err(DbError::Conversion {
                message: format!("More than one area of type {area_type} found with code {code}"),
            });
        }
        Ok(found)
    }

    fn find_areas_by_name(
        &self,
        area_type: &AreaType,
        fragment: &str,
    ) -> Result<Vec<AreaRecord>, DbError> {
        Ok(self
            .areas
            .values()
            .filter(|area| &area.area_type == area_type)
            .filter(|area| {
                area.name.contains(fragment)
                    || self
                        .names
                        .iter()
                        .any(|((id, _), name)| *id == area.id && name.contains(fragment))
            })
            .cloned()
            .collect())
    }

    fn areas_of_type(&self, area_type: &AreaType) -> Result<Vec<AreaRecord>, DbError> {
        Ok(self
            .areas
            .values()
            .filter(|area| &area.area_type == area_type)
            .cloned()
            .collect())
    }

    fn save_area(&mut self, draft: &AreaDraft) -> Result<AreaId, DbError> {
        let id = if let Some(id) = draft.id {
            if !self.areas.contains_key(&id) {
                return Err(DbError::Conversion {
                    message: format!("Area {id} does not exist"),
                });
            }
            id
        } else {
            self.next_area_id += 1;
            self.next_area_id
        };

        self.areas.insert(
            id,
            AreaRecord {
                id,
                area_type: draft.area_type.clone(),
                country: draft.country,
                parent: draft.parent,
                generation_low: draft.generation_low,
                generation_high: draft.generation_high,
                name: draft.name.clone(),
            },
        );
        Ok(id)
    }

    fn upsert_name(&mut self, area: AreaId, name_type: &str, name: &str) -> Result<(), DbError> {
        self.names
            .insert((area, name_type.to_string()), name.to_string());
        if let Some(record) = self.areas.get_mut(&area) {
            record.name = name.to_string();
        }
        Ok(())
    }

    fn upsert_code(&mut self, area: AreaId, code_type: &str, code: &str) -> Result<(), DbError> {
        self.codes
            .insert((area, code_type.to_string()), code.to_string());
        Ok(())
    }

    fn replace_polygons(
        &mut self,
        area: AreaId,
        polygons: &[Polygon<f64>],
    ) -> Result<Vec<StoredPolygon>, DbError> {
        self.polygons.retain(|_, stored| stored.area_id != area);
        Ok(self.insert_polygons(area, polygons))
    }

    fn add_polygons(
        &mut self,
        area: AreaId,
        polygons: &[Polygon<f64>],
    ) -> Result<Vec<StoredPolygon>, DbError> {
        Ok(self.insert_polygons(area, polygons))
    }

    fn area_polygons(&self, area: AreaId) -> Result<Vec<StoredPolygon>, DbError> {
        Ok(self
            .polygons
            .values()
            .filter(|stored| stored.area_id == area)
            .cloned()
            .collect())
    }

    fn child_polygons(&self, parent: AreaId) -> Result<Vec<StoredPolygon>, DbError> {
        Ok(self
            .polygons
            .values()
            .filter(|stored| {
                self.areas
                    .get(&stored.area_id)
                    .is_some_and(|area| area.parent == Some(parent))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use police_areas_area_models::Country;

    #[test]
    fn same_code_under_different_parents_is_distinct() {
        let mut store = MemoryAreaStore::new();
        let mut ids = Vec::new();
        for force in ["kent", "essex"] {
            let force_id = store
                .save_area(&AreaDraft {
                    id: None,
                    area_type: AreaType::Force,
                    country: Some(Country::England),
                    parent: None,
                    generation_low: 1,
                    generation_high: 1,
                    name: force.to_string(),
                })
                .unwrap();
            let nbh = store
                .save_area(&AreaDraft {
                    id: None,
                    area_type: AreaType::Neighbourhood,
                    country: Some(Country::England),
                    parent: Some(force_id),
                    generation_low: 1,
                    generation_high: 1,
                    name: "Town Centre".to_string(),
                })
                .unwrap();
            store.upsert_code(nbh, "police_id", "TC1").unwrap();
            ids.push((force_id, nbh));
        }

        for (force_id, nbh) in ids {
            let found = store
                .find_area("TC1", &AreaType::Neighbourhood, Some(force_id))
                .unwrap()
                .unwrap();
            assert_eq!(found.id, nbh);
        }
    }

    #[test]
    fn upsert_name_replaces_value() {
        let mut store = MemoryAreaStore::new();
        let id = store
            .save_area(&AreaDraft {
                id: None,
                area_type: AreaType::Force,
                country: None,
                parent: None,
                generation_low: 1,
                generation_high: 1,
                name: String::new(),
            })
            .unwrap();
        store.upsert_name(id, "P", "Old").unwrap();
        store.upsert_name(id, "P", "New").unwrap();
        assert_eq!(store.name_of(id, "P"), Some("New"));
        assert_eq!(store.find_areas_by_name(&AreaType::Force, "Ne").unwrap().len(), 1);
    }
}
