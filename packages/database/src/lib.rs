#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Area storage for police boundary imports.
//!
//! The importer talks to the area store only through the [`AreaStore`]
//! trait: find-or-create an area by code, type, and parent; attach names,
//! codes, and polygons; and read back the polygons of an area's children
//! for aggregation. [`area_db`] implements it on `DuckDB` with geometry
//! kept as `GeoJSON` text, and [`memory`] keeps everything in maps.

pub mod area_db;
pub mod memory;
pub mod paths;

use geo::Polygon;
use police_areas_area_models::{
    AreaDraft, AreaId, AreaRecord, AreaType, Generation, StoredPolygon,
};

/// Errors that can occur during area store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Filesystem error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// The generic geographic-areas store the importer writes into.
///
/// Areas are keyed by `(code, type, parent)`. Mutating methods are only
/// called when an import runs with `--commit`.
pub trait AreaStore {
    /// Returns the newest active generation, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn active_generation(&self) -> Result<Option<Generation>, DbError>;

    /// Returns the pending (not yet active) generation newer than the
    /// active one, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn pending_generation(&self) -> Result<Option<Generation>, DbError>;

    /// Creates a new pending generation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a pending generation already exists or the
    /// insert fails.
    fn create_generation(&mut self, description: &str) -> Result<Generation, DbError>;

    /// Marks the pending generation active and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    fn activate_pending_generation(&mut self) -> Result<Option<Generation>, DbError>;

    /// Finds the area carrying `code` with the given type and parent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails or more than one area
    /// matches.
    fn find_area(
        &self,
        code: &str,
        area_type: &AreaType,
        parent: Option<AreaId>,
    ) -> Result<Option<AreaRecord>, DbError>;

    /// Finds areas of a type whose name contains `fragment`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn find_areas_by_name(
        &self,
        area_type: &AreaType,
        fragment: &str,
    ) -> Result<Vec<AreaRecord>, DbError>;

    /// Returns every area of a type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn areas_of_type(&self, area_type: &AreaType) -> Result<Vec<AreaRecord>, DbError>;

    /// Inserts a new area or updates an existing one, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn save_area(&mut self, draft: &AreaDraft) -> Result<AreaId, DbError>;

    /// Sets the name of the given type on an area, replacing any previous
    /// name of that type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn upsert_name(&mut self, area: AreaId, name_type: &str, name: &str) -> Result<(), DbError>;

    /// Sets the code of the given type on an area, replacing any previous
    /// code of that type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn upsert_code(&mut self, area: AreaId, code_type: &str, code: &str) -> Result<(), DbError>;

    /// Deletes an area's polygons and stores `polygons` in their place.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn replace_polygons(
        &mut self,
        area: AreaId,
        polygons: &[Polygon<f64>],
    ) -> Result<Vec<StoredPolygon>, DbError>;

    /// Stores `polygons` on an area alongside any it already has.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn add_polygons(
        &mut self,
        area: AreaId,
        polygons: &[Polygon<f64>],
    ) -> Result<Vec<StoredPolygon>, DbError>;

    /// Returns the polygons of an area.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn area_polygons(&self, area: AreaId) -> Result<Vec<StoredPolygon>, DbError>;

    /// Returns the polygons of every direct child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn child_polygons(&self, parent: AreaId) -> Result<Vec<StoredPolygon>, DbError>;

    /// Starts a unit of work. Stores without transactions ignore this.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the transaction cannot be started.
    fn begin(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    /// Commits the current unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the commit fails.
    fn commit(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    /// Abandons the current unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the rollback fails.
    fn rollback(&mut self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Picks the pending generation out of a list: the newest inactive
/// generation newer than every active one.
#[must_use]
pub fn pending_of(generations: &[Generation]) -> Option<&Generation> {
    let active = active_of(generations).map_or(i64::MIN, |g| g.id);
    generations
        .iter()
        .filter(|g| !g.active && g.id > active)
        .max_by_key(|g| g.id)
}

/// Picks the newest active generation out of a list.
#[must_use]
pub fn active_of(generations: &[Generation]) -> Option<&Generation> {
    generations.iter().filter(|g| g.active).max_by_key(|g| g.id)
}
