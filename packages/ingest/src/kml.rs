//! Reading neighbourhood boundaries from KML.
//!
//! Each neighbourhood file holds a single `Placemark` whose geometry is a
//! `Polygon` or a `MultiGeometry` of polygons. `ExtendedData` entries, in
//! either the `Data`/`value` or the `SchemaData`/`SimpleData` form, are
//! collected into a key/value map.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{Coord, Geometry, LineString, Polygon};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Errors that can occur while reading a KML file.
#[derive(Debug, thiserror::Error)]
pub enum KmlError {
    /// Malformed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// More than one `Placemark`. Never seen in the dataset, so it needs a
    /// human to look at it.
    #[error("More than one feature in layer ({count} placemarks)")]
    MultipleFeatures { count: usize },

    /// No `Placemark` with a polygon.
    #[error("No polygon found")]
    NoPolygon,

    /// A coordinate tuple that is not `lon,lat[,alt]`.
    #[error("Bad coordinate: {text:?}")]
    BadCoordinate { text: String },
}

/// The single feature of a neighbourhood KML file.
#[derive(Debug, Clone, PartialEq)]
pub struct KmlFeature {
    /// The `Placemark`'s `name`, if present.
    pub name: Option<String>,
    /// Polygon or multi-polygon in WGS84 longitude/latitude.
    pub geometry: Geometry<f64>,
    pub extended_data: BTreeMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RingRole {
    Outer,
    Inner,
}

#[derive(Default)]
struct PolygonBuilder {
    exterior: Option<LineString<f64>>,
    interiors: Vec<LineString<f64>>,
}

fn parse_coordinates(text: &str) -> Result<LineString<f64>, KmlError> {
    let mut coords = Vec::new();
    for tuple in text.split_whitespace() {
        let mut parts = tuple.split(',').map(str::parse::<f64>);
        let (Some(Ok(x)), Some(Ok(y))) = (parts.next(), parts.next()) else {
            return Err(KmlError::BadCoordinate {
                text: tuple.to_string(),
            });
        };
        coords.push(Coord { x, y });
    }
    Ok(LineString::new(coords))
}

fn name_attribute(element: &BytesStart<'_>) -> Result<Option<String>, KmlError> {
    let Some(attribute) = element
        .try_get_attribute("name")
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };
    let value = attribute
        .unescape_value()
        .map_err(quick_xml::Error::from)?;
    Ok(Some(value.into_owned()))
}

/// Parses the text of a KML document.
///
/// # Errors
///
/// * [`KmlError::Xml`] if the document is malformed
/// * [`KmlError::MultipleFeatures`] if it has more than one `Placemark`
/// * [`KmlError::NoPolygon`] if it has no polygon
/// * [`KmlError::BadCoordinate`] if a coordinate cannot be parsed
pub fn parse_kml(text: &str) -> Result<KmlFeature, KmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut placemarks = 0;
    let mut name = None;
    let mut extended_data = BTreeMap::new();
    let mut data_key: Option<String> = None;
    let mut polygons = Vec::new();
    let mut polygon: Option<PolygonBuilder> = None;
    let mut role = RingRole::Outer;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let local = element.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"Placemark" => placemarks += 1,
                    b"Polygon" => polygon = Some(PolygonBuilder::default()),
                    b"outerBoundaryIs" => role = RingRole::Outer,
                    b"innerBoundaryIs" => role = RingRole::Inner,
                    b"Data" | b"SimpleData" => data_key = name_attribute(&element)?,
                    _ => {}
                }
                path.push(local);
            }
            Event::Text(content) => {
                let text = content.unescape().map_err(quick_xml::Error::from)?;
                let parent = path.len().checked_sub(2).map(|i| path[i].as_slice());
                match (parent, path.last().map(Vec::as_slice)) {
                    (_, Some(b"coordinates")) => {
                        let ring = parse_coordinates(&text)?;
                        if let Some(builder) = polygon.as_mut() {
                            match role {
                                RingRole::Outer => builder.exterior = Some(ring),
                                RingRole::Inner => builder.interiors.push(ring),
                            }
                        }
                    }
                    (Some(b"Placemark"), Some(b"name")) => name = Some(text.into_owned()),
                    (Some(b"Data"), Some(b"value")) | (_, Some(b"SimpleData")) => {
                        if let Some(key) = data_key.take() {
                            extended_data.insert(key, text.into_owned());
                        }
                    }
                    _ => {}
                }
            }
            Event::End(element) => {
                if element.local_name().as_ref() == b"Polygon"
                    && let Some(PolygonBuilder {
                        exterior: Some(exterior),
                        interiors,
                    }) = polygon.take()
                {
                    polygons.push(Polygon::new(exterior, interiors));
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if placemarks > 1 {
        return Err(KmlError::MultipleFeatures { count: placemarks });
    }

    let geometry = police_areas_geometry::to_geometry(polygons).ok_or(KmlError::NoPolygon)?;
    Ok(KmlFeature {
        name,
        geometry,
        extended_data,
    })
}

/// Reads and parses a KML file.
///
/// # Errors
///
/// Returns [`KmlError::Io`] if the file cannot be read, otherwise as
/// [`parse_kml`].
pub fn read_kml(path: &Path) -> Result<KmlFeature, KmlError> {
    parse_kml(&std::fs::read_to_string(path)?)
}
