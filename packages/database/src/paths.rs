#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the data directory.
//!
//! All paths are relative to the project root's `data/` directory unless
//! overridden by environment variables.

use std::path::{Path, PathBuf};

/// Environment variable overriding the areas database path.
pub const DB_PATH_ENV: &str = "POLICE_AREAS_DB";

/// Environment variable overriding the anomaly report output root.
pub const DEBUG_DIR_ENV: &str = "POLICE_AREAS_DEBUG_DIR";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the `data/shared/` directory for shared databases.
#[must_use]
pub fn shared_dir() -> PathBuf {
    data_dir().join("shared")
}

/// Returns the path for the areas `DuckDB` file, honouring
/// `POLICE_AREAS_DB`.
#[must_use]
pub fn areas_db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .map_or_else(|| shared_dir().join("areas.duckdb"), PathBuf::from)
}

/// Returns the root directory for anomaly reports, honouring
/// `POLICE_AREAS_DEBUG_DIR`.
#[must_use]
pub fn debug_dir() -> PathBuf {
    std::env::var_os(DEBUG_DIR_ENV).map_or_else(|| data_dir().join("debug"), PathBuf::from)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
