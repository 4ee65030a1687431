//! Anomalies met during an import, kept for offline review.
//!
//! Every anomaly is an [`Anomaly`] keyed by force and neighbourhood code
//! (`"force"` stands in for the neighbourhood when the force's own
//! boundary is concerned). At the end of a run each kind is written to its
//! own JSON file and summarised in one line.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use police_areas_area_models::GeometryId;
use police_areas_names::NameLengths;
use serde::Serialize;

use crate::ImportError;

/// Stand-in neighbourhood code for anomalies about a force's own boundary.
pub const FORCE_SCOPE: &str = "force";

/// Prefix of the timestamped report directory.
pub const REPORT_DIR_PREFIX: &str = "police-debug-data_";

/// The channels anomalies are reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnomalyKind {
    InvalidBefore,
    InvalidPolygons,
    OuterRingTooTiny,
    RemovedHoles,
    MissingNames,
    ExtraNames,
    ForceGeometryCreationAttempts,
    PolygonsNotUpdated,
}

impl AnomalyKind {
    pub const ALL: [Self; 8] = [
        Self::InvalidBefore,
        Self::InvalidPolygons,
        Self::OuterRingTooTiny,
        Self::RemovedHoles,
        Self::MissingNames,
        Self::ExtraNames,
        Self::ForceGeometryCreationAttempts,
        Self::PolygonsNotUpdated,
    ];

    /// File stem the channel is written to.
    #[must_use]
    pub const fn basename(self) -> &'static str {
        match self {
            Self::InvalidBefore => "invalid_before",
            Self::InvalidPolygons => "invalid_polygons",
            Self::OuterRingTooTiny => "outer_ring_too_tiny",
            Self::RemovedHoles => "removed_holes",
            Self::MissingNames => "missing_names",
            Self::ExtraNames => "extra_names",
            Self::ForceGeometryCreationAttempts => "force_geometry_creation_attempts",
            Self::PolygonsNotUpdated => "polygons_not_updated",
        }
    }

    /// One-line summary for `count` anomalies of this kind.
    #[must_use]
    pub fn describe(self, count: usize) -> String {
        match self {
            Self::InvalidBefore => format!("{count} features invalid before transformation"),
            Self::InvalidPolygons => format!(
                "{count} neighbourhood polygons are invalid and were excluded from their forces' polygons"
            ),
            Self::OuterRingTooTiny => format!(
                "{count} polygons were too small to be displayed on the map and were not saved"
            ),
            Self::RemovedHoles => format!(
                "{count} polygons contained holes which were too small to be displayed on the map and were removed"
            ),
            Self::MissingNames => format!("Names were missing for {count} neighbourhoods"),
            Self::ExtraNames => format!("{count} extra neighbourhood names were found"),
            Self::ForceGeometryCreationAttempts => {
                format!("A total of {count} attempts were made to create force geometries")
            }
            Self::PolygonsNotUpdated => format!(
                "{count} areas had no displayable geometry and kept their previous polygons"
            ),
        }
    }
}

/// What went wrong, with the fields relevant to its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnomalyDetail {
    InvalidBefore {
        coordinate_count: usize,
        reason: String,
    },
    InvalidPolygon {
        /// `None` when the run is not committing.
        geometry_id: Option<GeometryId>,
        polygon_count: usize,
        reason: String,
    },
    OuterRingTooTiny {
        ring: Vec<[f64; 2]>,
    },
    RemovedHoles {
        holes_before: usize,
        holes_after: Option<usize>,
    },
    MissingName,
    ExtraName {
        name: String,
    },
    ForceGeometryCreationAttempt {
        method: String,
        successful: bool,
        invalid_reason: Option<String>,
    },
    PolygonsNotUpdated,
}

impl AnomalyDetail {
    /// Whether the kind alone says everything; such details are left out
    /// of the reports.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::MissingName | Self::PolygonsNotUpdated)
    }

    #[must_use]
    pub const fn kind(&self) -> AnomalyKind {
        match self {
            Self::InvalidBefore { .. } => AnomalyKind::InvalidBefore,
            Self::InvalidPolygon { .. } => AnomalyKind::InvalidPolygons,
            Self::OuterRingTooTiny { .. } => AnomalyKind::OuterRingTooTiny,
            Self::RemovedHoles { .. } => AnomalyKind::RemovedHoles,
            Self::MissingName => AnomalyKind::MissingNames,
            Self::ExtraName { .. } => AnomalyKind::ExtraNames,
            Self::ForceGeometryCreationAttempt { .. } => {
                AnomalyKind::ForceGeometryCreationAttempts
            }
            Self::PolygonsNotUpdated => AnomalyKind::PolygonsNotUpdated,
        }
    }
}

/// One recorded anomaly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub force_code: String,
    pub neighbourhood_code: String,
    #[serde(skip_serializing_if = "AnomalyDetail::is_empty")]
    pub detail: AnomalyDetail,
}

impl Anomaly {
    #[must_use]
    pub fn new(force_code: &str, neighbourhood_code: &str, detail: AnomalyDetail) -> Self {
        Self {
            force_code: force_code.to_string(),
            neighbourhood_code: neighbourhood_code.to_string(),
            detail,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> AnomalyKind {
        self.detail.kind()
    }
}

/// Where the pipeline reports anomalies.
///
/// Reporting is optional: the pipeline behaves the same whichever sink it
/// is given.
pub trait ProblemSink {
    fn record(&mut self, anomaly: Anomaly);

    /// Records the longest code and name in the names dataset.
    fn record_name_lengths(&mut self, _lengths: NameLengths) {}
}

/// Discards everything.
pub struct NullProblems;

impl ProblemSink for NullProblems {
    fn record(&mut self, _anomaly: Anomaly) {}
}

/// Accumulates anomalies for one run.
#[derive(Debug, Default)]
pub struct ProblemLog {
    anomalies: Vec<Anomaly>,
    name_lengths: Option<NameLengths>,
}

impl ProblemSink for ProblemLog {
    fn record(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }

    fn record_name_lengths(&mut self, lengths: NameLengths) {
        self.name_lengths = Some(lengths);
    }
}

impl ProblemLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, kind: AnomalyKind) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter().filter(move |a| a.kind() == kind)
    }

    #[must_use]
    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.channel(kind).count()
    }

    #[must_use]
    pub const fn name_lengths(&self) -> Option<NameLengths> {
        self.name_lengths
    }

    /// The initially-invalid feature with the fewest coordinates, the
    /// cheapest one to inspect by hand.
    #[must_use]
    pub fn simplest_invalid_before(&self) -> Option<&Anomaly> {
        self.channel(AnomalyKind::InvalidBefore)
            .min_by_key(|a| match a.detail {
                AnomalyDetail::InvalidBefore {
                    coordinate_count, ..
                } => coordinate_count,
                _ => usize::MAX,
            })
    }

    /// Writes one pretty-printed JSON array per channel into
    /// `<root>/police-debug-data_<timestamp>/`, returning that directory.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Io`] if the directory or a file cannot be
    /// written, and [`ImportError::Json`] if serialisation fails.
    pub fn write_reports(&self, root: &Path, now: DateTime<Local>) -> Result<PathBuf, ImportError> {
        let dir = root.join(format!(
            "{REPORT_DIR_PREFIX}{}",
            now.format("%Y-%m-%d_%H:%M:%S")
        ));
        std::fs::create_dir_all(&dir)?;

        for kind in AnomalyKind::ALL {
            let records: Vec<&Anomaly> = self.channel(kind).collect();
            let path = dir.join(format!("{}.json", kind.basename()));
            std::fs::write(&path, serde_json::to_string_pretty(&records)?)?;
            log::debug!("Wrote {} records to {}", records.len(), path.display());
        }

        Ok(dir)
    }

    /// Human-readable summary, one line or short block per item.
    #[must_use]
    pub fn summary(&self, report_dir: Option<&Path>) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(lengths) = self.name_lengths {
            lines.push(format!("Maximum code length: {}", lengths.code));
            lines.push(format!("Maximum name length: {}", lengths.name));
        }

        match self.simplest_invalid_before() {
            Some(Anomaly {
                force_code,
                neighbourhood_code,
                detail: AnomalyDetail::InvalidBefore {
                    coordinate_count, ..
                },
            }) => {
                let mut block =
                    String::from("Simplest polygon which was invalid straight after loading it from the KML:");
                let _ = write!(
                    block,
                    "\n  force code: {force_code}\n  neighbourhood code: {neighbourhood_code}\n  number of points: {coordinate_count}"
                );
                lines.push(block);
            }
            _ => lines.push(
                "Simplest polygon which was invalid straight after loading it from the KML: none"
                    .to_string(),
            ),
        }

        for kind in AnomalyKind::ALL {
            let mut line = kind.describe(self.count(kind));
            if let Some(dir) = report_dir {
                let _ = write!(
                    line,
                    "\n    (see {})",
                    dir.join(format!("{}.json", kind.basename())).display()
                );
            }
            lines.push(line);
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn invalid_before(nbh: &str, coordinate_count: usize) -> Anomaly {
        Anomaly::new(
            "lancashire",
            nbh,
            AnomalyDetail::InvalidBefore {
                coordinate_count,
                reason: "exterior ring has a self-intersection".to_string(),
            },
        )
    }

    #[test]
    fn empty_log_summarises_without_error() {
        let log = ProblemLog::new();
        let summary = log.summary(None);
        assert!(summary.iter().any(|l| l.ends_with("from the KML: none")));
        assert!(summary.contains(&"0 features invalid before transformation".to_string()));
        assert_eq!(summary.len(), 1 + AnomalyKind::ALL.len());
    }

    #[test]
    fn simplest_invalid_is_fewest_coordinates() {
        let mut log = ProblemLog::new();
        log.record(invalid_before("E1", 400));
        log.record(invalid_before("E2", 12));
        log.record(invalid_before("E3", 90));
        assert_eq!(log.simplest_invalid_before().unwrap().neighbourhood_code, "E2");
        assert!(log.summary(None)[0].contains("number of points: 12"));
    }

    #[test]
    fn channels_are_separate() {
        let mut log = ProblemLog::new();
        log.record(Anomaly::new("kent", "K1", AnomalyDetail::MissingName));
        log.record(Anomaly::new(
            "kent",
            "K9",
            AnomalyDetail::ExtraName {
                name: "Nowhere".to_string(),
            },
        ));
        log.record(Anomaly::new("kent", "K2", AnomalyDetail::MissingName));
        assert_eq!(log.count(AnomalyKind::MissingNames), 2);
        assert_eq!(log.count(AnomalyKind::ExtraNames), 1);
        assert_eq!(log.count(AnomalyKind::InvalidBefore), 0);
    }

    #[test]
    fn writes_one_file_per_channel() {
        let root = tempfile::tempdir().unwrap();
        let mut log = ProblemLog::new();
        log.record_name_lengths(NameLengths { code: 4, name: 30 });
        log.record(Anomaly::new(
            "kent",
            FORCE_SCOPE,
            AnomalyDetail::RemovedHoles {
                holes_before: 3,
                holes_after: Some(1),
            },
        ));

        let now = Local.with_ymd_and_hms(2012, 8, 16, 9, 30, 0).unwrap();
        let dir = log.write_reports(root.path(), now).unwrap();
        assert_eq!(
            dir.file_name().unwrap().to_string_lossy(),
            "police-debug-data_2012-08-16_09:30:00"
        );

        for kind in AnomalyKind::ALL {
            assert!(dir.join(format!("{}.json", kind.basename())).exists());
        }
        let holes: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("removed_holes.json")).unwrap())
                .unwrap();
        assert_eq!(holes[0]["force_code"], "kent");
        assert_eq!(holes[0]["neighbourhood_code"], "force");
        assert_eq!(holes[0]["detail"]["holes_before"], 3);

        let empty = std::fs::read_to_string(dir.join("invalid_before.json")).unwrap();
        assert_eq!(empty.trim(), "[]");

        let summary = log.summary(Some(&dir));
        assert_eq!(summary[0], "Maximum code length: 4");
        assert!(summary.iter().any(|l| l.contains("removed_holes.json")));
    }

    #[test]
    fn kind_only_details_are_left_out_of_reports() {
        let root = tempfile::tempdir().unwrap();
        let mut log = ProblemLog::new();
        log.record(Anomaly::new("kent", "K1", AnomalyDetail::MissingName));
        log.record(Anomaly::new(
            "kent",
            FORCE_SCOPE,
            AnomalyDetail::PolygonsNotUpdated,
        ));

        let now = Local.with_ymd_and_hms(2012, 8, 16, 9, 30, 0).unwrap();
        let dir = log.write_reports(root.path(), now).unwrap();

        for file in ["missing_names.json", "polygons_not_updated.json"] {
            let records: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(dir.join(file)).unwrap()).unwrap();
            assert_eq!(records[0]["force_code"], "kent");
            assert!(records[0].get("detail").is_none(), "{file}: {records}");
        }
    }
}
