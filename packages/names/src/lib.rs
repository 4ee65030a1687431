#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Names of police forces and neighbourhoods from the police API dataset.
//!
//! The dataset is a directory holding `forces.json` plus one
//! `<force>_neighbourhoods.json` per force, each an array of `{id, name}`
//! objects. It is fetched separately from the KML boundaries, so the two
//! are cross-checked with [`dataset::check_dataset_parity`] before an
//! import touches anything.

pub mod catalog;
pub mod dataset;

use std::path::PathBuf;

pub use catalog::{ForceNames, NameCatalog, NameLengths};
pub use dataset::check_dataset_parity;

/// Errors that can occur while reading the names dataset.
#[derive(Debug, thiserror::Error)]
pub enum NamesError {
    /// A dataset file could not be read.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A dataset file is not the expected JSON.
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The same code appears twice in one file.
    #[error("ID '{code}' found twice in {file}")]
    DuplicateCode { code: String, file: String },

    /// The KML tree and the names directory do not describe the same
    /// forces.
    #[error("Dataset mismatch: {message}")]
    DatasetMismatch {
        /// Description of what went wrong.
        message: String,
    },
}

/// Decodes HTML character entities. The API escapes ampersands and
/// apostrophes in some names.
///
/// Only entities are decoded: `<` is escaped before parsing, so text that
/// looks like markup is kept as written.
///
/// ```
/// use police_areas_names::decode_entities;
///
/// assert_eq!(
///     decode_entities("Clitheroe East, Salthill &amp; St Mary&#39;s"),
///     "Clitheroe East, Salthill & St Mary's"
/// );
/// ```
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    scraper::Html::parse_fragment(&text.replace('<', "&lt;"))
        .root_element()
        .text()
        .collect()
}
