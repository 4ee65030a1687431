//! Two-level lookup of force and neighbourhood names.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::{NamesError, decode_entities};

/// File listing every force.
pub const FORCES_FILE: &str = "forces.json";

/// File listing the neighbourhoods of `force`.
#[must_use]
pub fn neighbourhoods_file(force: &str) -> String {
    format!("{force}_neighbourhoods.json")
}

/// One `{id, name}` entry as served by the API.
#[derive(Debug, Deserialize)]
struct NameEntry {
    id: String,
    name: String,
}

/// A force's name and its neighbourhood names keyed by code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForceNames {
    pub name: String,
    pub neighbourhoods: BTreeMap<String, String>,
}

/// Longest code and name seen, for sizing storage columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameLengths {
    pub code: usize,
    pub name: usize,
}

impl NameLengths {
    fn observe(&mut self, code: &str, name: &str) {
        self.code = self.code.max(code.chars().count());
        self.name = self.name.max(name.chars().count());
    }
}

/// Force code -> force name and neighbourhood names.
#[derive(Debug, Clone, Default)]
pub struct NameCatalog {
    forces: BTreeMap<String, ForceNames>,
    lengths: NameLengths,
}

fn read_entries(names_dir: &Path, file: &str) -> Result<Vec<NameEntry>, NamesError> {
    let path = names_dir.join(file);
    let content = std::fs::read_to_string(&path).map_err(|source| NamesError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| NamesError::Json { path, source })
}

/// Reads one names file into `(code, decoded name)` pairs, rejecting
/// duplicate codes.
fn read_names(
    names_dir: &Path,
    file: &str,
    lengths: &mut NameLengths,
) -> Result<BTreeMap<String, String>, NamesError> {
    let mut names = BTreeMap::new();
    for entry in read_entries(names_dir, file)? {
        let name = decode_entities(&entry.name);
        lengths.observe(&entry.id, &name);
        if names.contains_key(&entry.id) {
            return Err(NamesError::DuplicateCode {
                code: entry.id,
                file: file.to_string(),
            });
        }
        names.insert(entry.id, name);
    }
    Ok(names)
}

impl NameCatalog {
    /// Reads `forces.json` and each force's neighbourhoods file.
    ///
    /// # Errors
    ///
    /// * [`NamesError::Io`] / [`NamesError::Json`] if a file is missing or
    ///   malformed
    /// * [`NamesError::DuplicateCode`] if a force code, or a neighbourhood
    ///   code within one force, appears twice
    pub fn build(names_dir: &Path) -> Result<Self, NamesError> {
        log::info!("Parsing names from {}", names_dir.display());

        let mut lengths = NameLengths::default();
        let mut forces = BTreeMap::new();
        for (code, name) in read_names(names_dir, FORCES_FILE, &mut lengths)? {
            let neighbourhoods = read_names(names_dir, &neighbourhoods_file(&code), &mut lengths)?;
            log::debug!("{code}: {} neighbourhood names", neighbourhoods.len());
            forces.insert(
                code,
                ForceNames {
                    name,
                    neighbourhoods,
                },
            );
        }

        log::info!(
            "Loaded names for {} forces (longest code {}, longest name {})",
            forces.len(),
            lengths.code,
            lengths.name
        );
        Ok(Self { forces, lengths })
    }

    #[must_use]
    pub fn force(&self, code: &str) -> Option<&ForceNames> {
        self.forces.get(code)
    }

    /// Force codes in sorted order.
    pub fn force_codes(&self) -> impl Iterator<Item = &str> {
        self.forces.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    #[must_use]
    pub const fn max_lengths(&self) -> NameLengths {
        self.lengths
    }
}
