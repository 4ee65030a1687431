//! Cross-checks between the KML tree and the names directory.

use std::path::Path;

use crate::NamesError;
use crate::catalog::{FORCES_FILE, neighbourhoods_file};

/// Whether a directory entry is incidental to the dataset (Finder
/// metadata, licence notes).
#[must_use]
pub fn is_ignored(entry: &str) -> bool {
    entry == ".DS_Store" || entry.starts_with("README")
}

/// Lists a directory's entry names, skipping ignored ones, sorted.
///
/// # Errors
///
/// Returns [`NamesError::Io`] if the directory cannot be read.
pub fn dataset_entries(dir: &Path) -> Result<Vec<String>, NamesError> {
    let io_err = |source| NamesError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let name = entry.map_err(io_err)?.file_name().to_string_lossy().into_owned();
        if !is_ignored(&name) {
            entries.push(name);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Checks that the names directory has one file per KML force plus
/// `extra_name_files` others (at least `forces.json`), and that every KML
/// force has its neighbourhoods file. Returns the KML force codes, sorted.
///
/// # Errors
///
/// Returns [`NamesError::DatasetMismatch`] if the counts differ or a file
/// is missing, and [`NamesError::Io`] if either directory cannot be read.
pub fn check_dataset_parity(
    kml_dir: &Path,
    names_dir: &Path,
    extra_name_files: usize,
) -> Result<Vec<String>, NamesError> {
    let forces = dataset_entries(kml_dir)?;
    let names = dataset_entries(names_dir)?;

    if forces.len() + extra_name_files != names.len() {
        return Err(NamesError::DatasetMismatch {
            message: format!(
                "The two datasets contain different numbers of forces: {} KML forces + {extra_name_files} != {} names files",
                forces.len(),
                names.len()
            ),
        });
    }

    if !names.iter().any(|n| n == FORCES_FILE) {
        return Err(NamesError::DatasetMismatch {
            message: format!("{FORCES_FILE} not found in {}", names_dir.display()),
        });
    }

    if let Some(force) = forces
        .iter()
        .find(|force| !names.contains(&neighbourhoods_file(force)))
    {
        return Err(NamesError::DatasetMismatch {
            message: format!(
                "{} not found for KML force {force}",
                neighbourhoods_file(force)
            ),
        });
    }

    log::info!("Both datasets describe {} forces", forces.len());
    Ok(forces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout(kml: &[&str], names: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("kml")).unwrap();
        fs::create_dir(root.path().join("names")).unwrap();
        for force in kml {
            fs::create_dir(root.path().join("kml").join(force)).unwrap();
        }
        for file in names {
            fs::write(root.path().join("names").join(file), "[]").unwrap();
        }
        root
    }

    #[test]
    fn matching_datasets_pass() {
        let root = layout(
            &["alpha", "beta"],
            &[
                "forces.json",
                "alpha_neighbourhoods.json",
                "beta_neighbourhoods.json",
            ],
        );
        let forces =
            check_dataset_parity(&root.path().join("kml"), &root.path().join("names"), 1).unwrap();
        assert_eq!(forces, ["alpha", "beta"]);
    }

    #[test]
    fn ignored_entries_do_not_count() {
        let root = layout(
            &["alpha"],
            &["forces.json", "alpha_neighbourhoods.json", "README.txt"],
        );
        fs::write(root.path().join("kml").join(".DS_Store"), "").unwrap();
        fs::write(root.path().join("kml").join("README"), "").unwrap();
        assert!(
            check_dataset_parity(&root.path().join("kml"), &root.path().join("names"), 1).is_ok()
        );
    }

    #[test]
    fn missing_neighbourhoods_file_is_a_mismatch() {
        let root = layout(
            &["alpha", "beta"],
            &["forces.json", "alpha_neighbourhoods.json"],
        );
        let err = check_dataset_parity(&root.path().join("kml"), &root.path().join("names"), 1)
            .unwrap_err();
        assert!(matches!(err, NamesError::DatasetMismatch { .. }));
    }

    #[test]
    fn renamed_neighbourhoods_file_is_a_mismatch() {
        let root = layout(
            &["alpha", "beta"],
            &[
                "forces.json",
                "alpha_neighbourhoods.json",
                "gamma_neighbourhoods.json",
            ],
        );
        let err = check_dataset_parity(&root.path().join("kml"), &root.path().join("names"), 1)
            .unwrap_err();
        assert!(err.to_string().contains("beta_neighbourhoods.json"));
    }

    #[test]
    fn extra_files_are_configurable() {
        let root = layout(
            &["alpha"],
            &[
                "forces.json",
                "alpha_neighbourhoods.json",
                "northern-ireland_neighbourhoods.json",
            ],
        );
        let (kml, names) = (root.path().join("kml"), root.path().join("names"));
        assert!(check_dataset_parity(&kml, &names, 1).is_err());
        assert!(check_dataset_parity(&kml, &names, 2).is_ok());
    }
}
