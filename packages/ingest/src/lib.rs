#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Police force and neighbourhood boundary import.
//!
//! Reads a KML tree (`<root>/<force>/<neighbourhood>.kml`) and a names
//! directory, repairs and filters each boundary, reconciles it against
//! the area store, and finally rebuilds each force's boundary from its
//! neighbourhoods. Anomalies go to a [`problems::ProblemSink`].
//!
//! [`force_table`] is the alternative path that builds force boundaries
//! from administrative areas already in the store.

pub mod aggregate;
pub mod force_table;
pub mod kml;
pub mod pipeline;
pub mod problems;
pub mod progress;
pub mod reconcile;

use std::path::PathBuf;

use police_areas_area_models::AreaType;
use police_areas_database::DbError;
use police_areas_geometry::GeometryError;
use police_areas_names::NamesError;

pub use pipeline::{ImportStats, import, run};
pub use problems::{NullProblems, ProblemLog, ProblemSink};
pub use reconcile::{AreaHandle, AreaReconciler};

/// Errors that abort an import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The inputs or the store are not in a state an import can start
    /// from.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// A boundary that the single repair step cannot fix.
    #[error("Unrepairable geometry for {force_code}/{neighbourhood_code}: {source}")]
    UnrepairableGeometry {
        force_code: String,
        neighbourhood_code: String,
        source: GeometryError,
    },

    /// An existing area's validity window stops short of the active
    /// generation, so an earlier import was skipped.
    #[error(
        "Area {area} has generation_high {generation_high}, before the active generation {active}"
    )]
    GenerationSkip {
        area: String,
        generation_high: i64,
        active: i64,
    },

    /// An administrative-area lookup matched no area or several.
    #[error("Administrative area lookup failed: {message}")]
    AdminLookup { message: String },

    /// Names dataset error.
    #[error(transparent)]
    Names(#[from] NamesError),

    /// A KML file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Kml {
        path: PathBuf,
        source: kml::KmlError,
    },

    /// Geometry outside a neighbourhood context (force aggregation,
    /// administrative areas).
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Area store error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    pub(crate) fn generation_skip(
        code: &str,
        area_type: &AreaType,
        generation_high: i64,
        active: i64,
    ) -> Self {
        Self::GenerationSkip {
            area: format!("{area_type} {code}"),
            generation_high,
            active,
        }
    }
}

/// Options for a KML import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Persist changes. Without it the run only reports.
    pub commit: bool,
    /// Write anomaly reports at the end of the run.
    pub collect_debug_data: bool,
    /// Names files expected beyond one per KML force (`forces.json`).
    pub extra_name_files: usize,
    /// Where anomaly reports go; the default debug directory when `None`.
    pub debug_dir: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            commit: false,
            collect_debug_data: false,
            extra_name_files: 1,
            debug_dir: None,
        }
    }
}
