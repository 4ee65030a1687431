//! The KML import, force by force.
//!
//! Each force is one unit of work: when committing, a failure rolls back
//! only the force being imported and earlier forces stay saved.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use police_areas_area_models::{AreaType, BoundaryRecord, Country, GeometryId};
use police_areas_database::{AreaStore, paths};
use police_areas_geometry::validate::polygon_invalidity;
use police_areas_geometry::{make_displayable, validate_and_repair};
use police_areas_names::dataset::dataset_entries;
use police_areas_names::{ForceNames, NameCatalog, NamesError, check_dataset_parity};

use crate::aggregate::ForceAggregator;
use crate::kml::read_kml;
use crate::problems::{Anomaly, AnomalyDetail, NullProblems, ProblemLog, ProblemSink};
use crate::progress::ProgressCallback;
use crate::reconcile::{AreaHandle, AreaReconciler};
use crate::{ImportError, ImportOptions};

/// Counts for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub forces: usize,
    pub neighbourhoods: usize,
    pub areas_created: usize,
    /// Forces whose boundary was rebuilt from their neighbourhoods.
    pub force_geometries: usize,
}

/// What [`import`] hands back to the caller.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub stats: ImportStats,
    /// Where anomaly reports were written, when collected.
    pub report_dir: Option<PathBuf>,
    /// Summary lines, empty unless anomalies were collected.
    pub summary: Vec<String>,
}

/// Runs [`run`] and, if `options.collect_debug_data` is set, writes the
/// anomaly reports and builds the summary.
///
/// # Errors
///
/// Anything [`run`] returns, plus [`ImportError::Io`] /
/// [`ImportError::Json`] if the reports cannot be written.
pub fn import(
    store: &mut dyn AreaStore,
    kml_dir: &Path,
    names_dir: &Path,
    options: &ImportOptions,
    progress: &dyn ProgressCallback,
) -> Result<ImportOutcome, ImportError> {
    if !options.collect_debug_data {
        let stats = run(store, kml_dir, names_dir, options, &mut NullProblems, progress)?;
        return Ok(ImportOutcome {
            stats,
            report_dir: None,
            summary: Vec::new(),
        });
    }

    let mut problems = ProblemLog::new();
    let stats = run(store, kml_dir, names_dir, options, &mut problems, progress)?;

    let root = options.debug_dir.clone().unwrap_or_else(paths::debug_dir);
    let report_dir = problems.write_reports(&root, chrono::Local::now())?;
    log::info!("Anomaly reports written to {}", report_dir.display());

    Ok(ImportOutcome {
        stats,
        summary: problems.summary(Some(&report_dir)),
        report_dir: Some(report_dir),
    })
}

/// Imports every force under `kml_dir` using names from `names_dir`.
///
/// # Errors
///
/// * [`ImportError::Precondition`] if the datasets do not line up, a force
///   has no name, or the store has no pending generation. Nothing has been
///   written in that case.
/// * [`ImportError::UnrepairableGeometry`] for a boundary the repair step
///   cannot fix
/// * [`ImportError::GenerationSkip`] for a stale area
/// * [`ImportError::Kml`], [`ImportError::Names`], or
///   [`ImportError::Database`] when reading or writing fails
pub fn run(
    store: &mut dyn AreaStore,
    kml_dir: &Path,
    names_dir: &Path,
    options: &ImportOptions,
    sink: &mut dyn ProblemSink,
    progress: &dyn ProgressCallback,
) -> Result<ImportStats, ImportError> {
    let forces =
        check_dataset_parity(kml_dir, names_dir, options.extra_name_files).map_err(|e| match e {
            NamesError::DatasetMismatch { message } => ImportError::Precondition { message },
            other => ImportError::Names(other),
        })?;

    let catalog = NameCatalog::build(names_dir)?;
    sink.record_name_lengths(catalog.max_lengths());

    if let Some(missing) = forces.iter().find(|code| catalog.force(code).is_none()) {
        return Err(ImportError::Precondition {
            message: format!("Name for force {missing} not found"),
        });
    }

    let reconciler = AreaReconciler::from_store(store, options.commit)?;
    let aggregator = ForceAggregator::default();
    let mut stats = ImportStats::default();

    for code in &forces {
        let Some(names) = catalog.force(code) else {
            continue;
        };
        let force = ForceImport {
            code,
            names,
            dir: kml_dir.join(code),
            reconciler: &reconciler,
            aggregator: &aggregator,
        };

        if options.commit {
            store.begin()?;
        }
        match force.import(store, sink, progress, &mut stats) {
            Ok(()) => {
                if options.commit {
                    store.commit()?;
                }
            }
            Err(e) => {
                log::error!("Import of {code} failed: {e}");
                if options.commit {
                    store.rollback()?;
                }
                return Err(e);
            }
        }
        stats.forces += 1;
    }

    let done = format!(
        "Imported {} forces and {} neighbourhoods ({} new areas)",
        stats.forces, stats.neighbourhoods, stats.areas_created
    );
    log::info!("{done}");
    progress.finish(done);
    Ok(stats)
}

struct ForceImport<'a> {
    code: &'a str,
    names: &'a ForceNames,
    dir: PathBuf,
    reconciler: &'a AreaReconciler,
    aggregator: &'a ForceAggregator,
}

impl ForceImport<'_> {
    fn import(
        &self,
        store: &mut dyn AreaStore,
        sink: &mut dyn ProblemSink,
        progress: &dyn ProgressCallback,
        stats: &mut ImportStats,
    ) -> Result<(), ImportError> {
        let country = Country::for_force(self.code);
        let force = self.reconciler.upsert(
            store,
            self.code,
            &AreaType::Force,
            None,
            &self.names.name,
            country,
        )?;
        log::info!("{} ({})", force.name, self.code);
        stats.areas_created += usize::from(force.created);

        let files: Vec<String> = dataset_entries(&self.dir)?
            .into_iter()
            .filter(|f| Path::new(f).extension().is_some_and(|ext| ext == "kml"))
            .collect();
        progress.set_total(files.len() as u64);
        progress.set_message(self.code.to_string());

        let mut seen = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        for file in &files {
            let path = self.dir.join(file);
            let neighbourhood_code = file.trim_end_matches(".kml").to_string();
            let created = self.neighbourhood(
                store,
                sink,
                &force,
                &path,
                &neighbourhood_code,
                &mut excluded,
            )?;
            stats.areas_created += usize::from(created);
            stats.neighbourhoods += 1;
            seen.insert(neighbourhood_code);
            progress.inc(1);
        }

        for (code, name) in &self.names.neighbourhoods {
            if !seen.contains(code) {
                log::warn!("{}: name {code} ({name}) has no KML boundary", self.code);
                sink.record(Anomaly::new(
                    self.code,
                    code,
                    AnomalyDetail::ExtraName { name: name.clone() },
                ));
            }
        }

        if self.reconciler.commit() {
            if self
                .aggregator
                .aggregate(store, &force, &excluded, sink)?
                .is_some()
            {
                stats.force_geometries += 1;
            }
        } else {
            log::info!("(not trying to create force geometries as --commit not specified)");
        }

        Ok(())
    }

    /// Imports one neighbourhood file, returning whether its area is new.
    fn neighbourhood(
        &self,
        store: &mut dyn AreaStore,
        sink: &mut dyn ProblemSink,
        force: &AreaHandle,
        path: &Path,
        code: &str,
        excluded: &mut BTreeSet<GeometryId>,
    ) -> Result<bool, ImportError> {
        let name = if let Some(name) = self.names.neighbourhoods.get(code) {
            name.clone()
        } else {
            log::warn!("{}: no name for neighbourhood {code}, using the code", self.code);
            sink.record(Anomaly::new(self.code, code, AnomalyDetail::MissingName));
            code.to_string()
        };

        let feature = read_kml(path).map_err(|source| ImportError::Kml {
            path: path.to_path_buf(),
            source,
        })?;
        let record = BoundaryRecord {
            code: code.to_string(),
            area_type: AreaType::Neighbourhood,
            parent_code: Some(self.code.to_string()),
            name,
            raw_geometry: feature.geometry,
        };

        let unrepairable = |source| ImportError::UnrepairableGeometry {
            force_code: self.code.to_string(),
            neighbourhood_code: code.to_string(),
            source,
        };
        let repaired = validate_and_repair(&record.raw_geometry).map_err(unrepairable)?;
        if !repaired.was_initially_valid {
            let reason = repaired
                .initial_reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            log::warn!("{}/{code}: invalid before transformation: {reason}", self.code);
            sink.record(Anomaly::new(
                self.code,
                code,
                AnomalyDetail::InvalidBefore {
                    coordinate_count: repaired.original_coordinate_count,
                    reason,
                },
            ));
        }

        let area = self.reconciler.upsert(
            store,
            &record.code,
            &record.area_type,
            Some(force),
            &record.name,
            Country::for_force(self.code),
        )?;

        let outcome = make_displayable(&repaired.geometry).map_err(unrepairable)?;
        for ring in &outcome.tiny_outer_rings {
            log::warn!("{}/{code}: dropped a polygon too small to display", self.code);
            sink.record(Anomaly::new(
                self.code,
                code,
                AnomalyDetail::OuterRingTooTiny {
                    ring: ring.coords().map(|c| [c.x, c.y]).collect(),
                },
            ));
        }
        if outcome.holes_changed() {
            log::info!(
                "{}/{code}: holes {} -> {}",
                self.code,
                outcome.holes_before,
                outcome
                    .holes_after
                    .map_or_else(|| "none".to_string(), |n| n.to_string())
            );
            sink.record(Anomaly::new(
                self.code,
                code,
                AnomalyDetail::RemovedHoles {
                    holes_before: outcome.holes_before,
                    holes_after: outcome.holes_after,
                },
            ));
        }

        if outcome.geometry.is_none() {
            log::warn!(
                "{}/{code}: nothing displayable, keeping previous polygons",
                self.code
            );
            sink.record(Anomaly::new(
                self.code,
                code,
                AnomalyDetail::PolygonsNotUpdated,
            ));
            return Ok(area.created);
        }

        let polygons = outcome.polygons();
        let polygon_count = polygons.len();
        for (polygon, geometry_id) in self.reconciler.attach_polygons(store, &area, polygons)? {
            let Some(reason) = polygon_invalidity(&polygon) else {
                continue;
            };
            log::warn!(
                "{}/{code}: stored polygon is invalid ({reason}), excluding it from the force",
                self.code
            );
            sink.record(Anomaly::new(
                self.code,
                code,
                AnomalyDetail::InvalidPolygon {
                    geometry_id,
                    polygon_count,
                    reason: reason.to_string(),
                },
            ));
            if let Some(id) = geometry_id {
                excluded.insert(id);
            }
        }

        Ok(area.created)
    }
}
