#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area, generation, and boundary record types.
//!
//! These types describe areas as held by the area store (keyed by code,
//! type, and parent) and the ephemeral boundary records built from each
//! KML file during an import.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name type under which police names are stored.
pub const POLICE_NAME_TYPE: &str = "P";

/// Code type under which police force and neighbourhood codes are stored.
pub const POLICE_CODE_TYPE: &str = "police_id";

/// Police force codes whose areas lie in Wales. Every other force is in
/// England (no force crosses the border).
pub const WELSH_FORCES: &[&str] = &["dyfed-powys", "gwent", "north-wales", "south-wales"];

/// Primary key of a stored area.
pub type AreaId = i64;

/// Primary key of a stored polygon.
pub type GeometryId = i64;

/// The kind of area. Police imports only create forces and
/// neighbourhoods; other codes (`CTY`, `UTA`, `LBO`, ...) come from
/// administrative boundary imports and are only read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AreaType {
    /// Police force (`POF`).
    Force,
    /// Police neighbourhood (`PON`).
    Neighbourhood,
    /// Any other area type, by its type code.
    Other(String),
}

impl AreaType {
    /// Returns the short type code used by the area store.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Force => "POF",
            Self::Neighbourhood => "PON",
            Self::Other(code) => code,
        }
    }
}

impl From<&str> for AreaType {
    fn from(code: &str) -> Self {
        match code {
            "POF" => Self::Force,
            "PON" => Self::Neighbourhood,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for AreaType {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl From<AreaType> for String {
    fn from(area_type: AreaType) -> Self {
        area_type.code().to_string()
    }
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Country an area belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    /// England (`E`).
    England,
    /// Wales (`W`).
    Wales,
}

impl Country {
    /// Returns the single-letter country code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::England => "E",
            Self::Wales => "W",
        }
    }

    /// Parses a single-letter country code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "E" => Some(Self::England),
            "W" => Some(Self::Wales),
            _ => None,
        }
    }

    /// Returns the country a police force belongs to.
    #[must_use]
    pub fn for_force(force_code: &str) -> Self {
        if WELSH_FORCES.contains(&force_code) {
            Self::Wales
        } else {
            Self::England
        }
    }
}

/// A version marker for the whole area dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Monotonically increasing identifier.
    pub id: i64,
    /// Whether this is the live generation. At most one generation newer
    /// than the active one is pending at any time.
    pub active: bool,
    /// Free-text description given when the generation was created.
    pub description: String,
}

/// An area as held by the area store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRecord {
    /// Primary key.
    pub id: AreaId,
    /// Area type.
    pub area_type: AreaType,
    /// Country, when known.
    pub country: Option<Country>,
    /// Parent area, if any. Neighbourhoods have their force as parent.
    pub parent: Option<AreaId>,
    /// First generation this area is valid in.
    pub generation_low: i64,
    /// Last generation this area is valid in.
    pub generation_high: i64,
    /// Display name (mirrors the most recently attached name).
    pub name: String,
}

/// Fields needed to create or update an area. `id` is `None` for areas
/// that have never been saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaDraft {
    /// Primary key of an existing area.
    pub id: Option<AreaId>,
    /// Area type.
    pub area_type: AreaType,
    /// Country, when known.
    pub country: Option<Country>,
    /// Parent area, if any.
    pub parent: Option<AreaId>,
    /// First generation this area is valid in.
    pub generation_low: i64,
    /// Last generation this area is valid in.
    pub generation_high: i64,
    /// Display name.
    pub name: String,
}

impl From<&AreaRecord> for AreaDraft {
    fn from(record: &AreaRecord) -> Self {
        Self {
            id: Some(record.id),
            area_type: record.area_type.clone(),
            country: record.country,
            parent: record.parent,
            generation_low: record.generation_low,
            generation_high: record.generation_high,
            name: record.name.clone(),
        }
    }
}

/// A polygon held by the area store, with its primary key and owner.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPolygon {
    /// Primary key.
    pub id: GeometryId,
    /// Owning area.
    pub area_id: AreaId,
    /// Polygon in OSGB National Grid coordinates.
    pub polygon: geo::Polygon<f64>,
}

/// One incoming neighbourhood boundary, built from a single KML file and
/// discarded once its area is updated.
///
/// Identity is `(code, area_type, parent_code)`: neighbourhood codes are
/// only unique within their force.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    /// Force or neighbourhood code.
    pub code: String,
    /// Force or neighbourhood.
    pub area_type: AreaType,
    /// Code of the parent force, for neighbourhoods.
    pub parent_code: Option<String>,
    /// Display name.
    pub name: String,
    /// Geometry as read from the source, in WGS84 longitude/latitude.
    pub raw_geometry: geo::Geometry<f64>,
}

impl BoundaryRecord {
    /// Returns the `(code, type, parent code)` identity of this record.
    #[must_use]
    pub fn identity(&self) -> (&str, &AreaType, Option<&str>) {
        (&self.code, &self.area_type, self.parent_code.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_type_codes_roundtrip() {
        for code in ["POF", "PON", "CTY", "LBO"] {
            assert_eq!(AreaType::from(code).code(), code);
        }
        assert_eq!(AreaType::from("POF"), AreaType::Force);
        assert_eq!(AreaType::from("PON"), AreaType::Neighbourhood);
    }

    #[test]
    fn welsh_forces_are_in_wales() {
        assert_eq!(Country::for_force("gwent"), Country::Wales);
        assert_eq!(Country::for_force("south-wales"), Country::Wales);
        assert_eq!(Country::for_force("lancashire"), Country::England);
    }

    #[test]
    fn country_codes_roundtrip() {
        for country in [Country::England, Country::Wales] {
            assert_eq!(Country::from_code(country.code()), Some(country));
        }
        assert_eq!(Country::from_code("S"), None);
    }

    #[test]
    fn boundary_identity_includes_parent() {
        let record = BoundaryRecord {
            code: "E37".to_string(),
            area_type: AreaType::Neighbourhood,
            parent_code: Some("lancashire".to_string()),
            name: "Whalley".to_string(),
            raw_geometry: geo::Geometry::Point(geo::Point::new(-2.39, 53.82)),
        };
        assert_eq!(
            record.identity(),
            ("E37", &AreaType::Neighbourhood, Some("lancashire"))
        );
    }
}
