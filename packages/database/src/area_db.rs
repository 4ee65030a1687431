//! Area storage in `DuckDB`.
//!
//! Stores generations, areas, their names and codes, and their polygons.
//! Polygons are kept as `GeoJSON` TEXT in OSGB National Grid coordinates
//! (no spatial extension needed). The default database lives at
//! `data/shared/areas.duckdb`.

use std::path::Path;

use duckdb::{Connection, params};
use geo::Polygon;
use geojson::GeoJson;
use police_areas_area_models::{
    AreaDraft, AreaId, AreaRecord, AreaType, Country, Generation, GeometryId, StoredPolygon,
};

use crate::{AreaStore, DbError};

const AREA_COLUMNS: &str =
    "a.id, a.type_code, a.country, a.parent_id, a.generation_low, a.generation_high, a.name";

/// An [`AreaStore`] backed by a `DuckDB` connection.
pub struct DuckDbAreaStore {
    conn: Connection,
}

/// Opens (or creates) the areas `DuckDB` and ensures schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<DuckDbAreaStore, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    create_schema(&conn)?;

    Ok(DuckDbAreaStore { conn })
}

/// Opens the areas DB at the default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<DuckDbAreaStore, DbError> {
    open(&crate::paths::areas_db_path())
}

/// Opens a throwaway in-memory areas DB.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<DuckDbAreaStore, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(DuckDbAreaStore { conn })
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS generations_id_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS areas_id_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS polygons_id_seq START 1;

        CREATE TABLE IF NOT EXISTS generations (
            id BIGINT PRIMARY KEY,
            active BOOLEAN NOT NULL,
            description TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS areas (
            id BIGINT PRIMARY KEY,
            type_code TEXT NOT NULL,
            country TEXT,
            parent_id BIGINT,
            generation_low BIGINT NOT NULL,
            generation_high BIGINT NOT NULL,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS area_names (
            area_id BIGINT NOT NULL,
            name_type TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (area_id, name_type)
        );

        CREATE TABLE IF NOT EXISTS area_codes (
            area_id BIGINT NOT NULL,
            code_type TEXT NOT NULL,
            code TEXT NOT NULL,
            PRIMARY KEY (area_id, code_type)
        );

        CREATE TABLE IF NOT EXISTS polygons (
            id BIGINT PRIMARY KEY,
            area_id BIGINT NOT NULL,
            boundary_geojson TEXT NOT NULL
        );",
    )?;

    Ok(())
}

fn read_area(row: &duckdb::Row<'_>) -> duckdb::Result<AreaRecord> {
    let type_code: String = row.get(1)?;
    let country: Option<String> = row.get(2)?;
    Ok(AreaRecord {
        id: row.get(0)?,
        area_type: AreaType::from(type_code),
        country: country.as_deref().and_then(Country::from_code),
        parent: row.get(3)?,
        generation_low: row.get(4)?,
        generation_high: row.get(5)?,
        name: row.get(6)?,
    })
}

fn read_generation(row: &duckdb::Row<'_>) -> duckdb::Result<Generation> {
    Ok(Generation {
        id: row.get(0)?,
        active: row.get(1)?,
        description: row.get(2)?,
    })
}

/// Serializes a polygon as a `GeoJSON` geometry string.
///
/// # Errors
///
/// Returns [`DbError`] if serialization fails.
pub fn polygon_to_geojson(polygon: &Polygon<f64>) -> Result<String, DbError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(polygon));
    serde_json::to_string(&geometry).map_err(|e| DbError::Conversion {
        message: format!("Failed to serialize polygon: {e}"),
    })
}

/// Parses a `GeoJSON` geometry string holding a single polygon.
///
/// # Errors
///
/// Returns [`DbError`] if the text is not a `GeoJSON` polygon.
pub fn polygon_from_geojson(geojson_str: &str) -> Result<Polygon<f64>, DbError> {
    let conversion = |message: String| DbError::Conversion { message };

    let geojson: GeoJson = geojson_str
        .parse()
        .map_err(|e| conversion(format!("Invalid GeoJSON: {e}")))?;
    let GeoJson::Geometry(geom) = geojson else {
        return Err(conversion("Stored GeoJSON is not a bare geometry".to_string()));
    };
    let geo_geom: geo::Geometry<f64> = geom
        .try_into()
        .map_err(|e| conversion(format!("Unsupported GeoJSON geometry: {e}")))?;
    match geo_geom {
        geo::Geometry::Polygon(polygon) => Ok(polygon),
        other => Err(conversion(format!(
            "Stored geometry is not a polygon: {other:?}"
        ))),
    }
}

impl DuckDbAreaStore {
    fn generations(&self) -> Result<Vec<Generation>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, active, description FROM generations ORDER BY id")?;
        let generations = stmt
            .query_map([], read_generation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(generations)
    }

    fn query_areas(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<AreaRecord>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let areas = stmt
            .query_map(params, read_area)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(areas)
    }

    fn query_polygons(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<StoredPolygon>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut polygons = Vec::new();

        while let Some(row) = rows.next()? {
            let id: GeometryId = row.get(0)?;
            let area_id: AreaId = row.get(1)?;
            let geojson_str: String = row.get(2)?;
            polygons.push(StoredPolygon {
                id,
                area_id,
                polygon: polygon_from_geojson(&geojson_str)?,
            });
        }

        Ok(polygons)
    }
}

impl AreaStore for DuckDbAreaStore {
    fn active_generation(&self) -> Result<Option<Generation>, DbError> {
        Ok(crate::active_of(&self.generations()?).cloned())
    }

    fn pending_generation(&self) -> Result<Option<Generation>, DbError> {
        Ok(crate::pending_of(&self.generations()?).cloned())
    }

    fn create_generation(&mut self, description: &str) -> Result<Generation, DbError> {
        if let Some(pending) = self.pending_generation()? {
            return Err(DbError::Conversion {
                message: format!("Generation {} is already pending", pending.id),
            });
        }

        let id: i64 = self.conn.query_row(
            "INSERT INTO generations (id, active, description)
             VALUES (nextval('generations_id_seq'), false, ?)
             RETURNING id",
            params![description],
            |row| row.get(0),
        )?;
        log::info!("Created pending generation {id}: {description}");

        Ok(Generation {
            id,
            active: false,
            description: description.to_string(),
        })
    }

    fn activate_pending_generation(&mut self) -> Result<Option<Generation>, DbError> {
        let Some(mut pending) = self.pending_generation()? else {
            return Ok(None);
        };
        self.conn.execute(
            "UPDATE generations SET active = true WHERE id = ?",
            params![pending.id],
        )?;
        pending.active = true;
        log::info!("Activated generation {}", pending.id);
        Ok(Some(pending))
    }

    fn find_area(
        &self,
        code: &str,
        area_type: &AreaType,
        parent: Option<AreaId>,
    ) -> Result<Option<AreaRecord>, DbError> {
        let sql = format!(
            "SELECT DISTINCT {AREA_COLUMNS} FROM areas a
             JOIN area_codes c ON c.area_id = a.id
             WHERE c.code = ? AND a.type_code = ? AND a.parent_id IS NOT DISTINCT FROM ?"
        );
        let type_code = area_type.code();
        let mut areas = self.query_areas(&sql, &[&code, &type_code, &parent])?;

        if areas.len() > 1 {
            return Err(DbError::Conversion {
                message: format!(
                    "{} areas of type {area_type} found with code {code}",
                    areas.len()
                ),
            });
        }

        Ok(areas.pop())
    }

    fn find_areas_by_name(
        &self,
        area_type: &AreaType,
        fragment: &str,
    ) -> Result<Vec<AreaRecord>, DbError> {
        let sql = format!(
            "SELECT {AREA_COLUMNS} FROM areas a
             WHERE a.type_code = ?
               AND (contains(a.name, ?)
                    OR EXISTS (SELECT 1 FROM area_names n
                               WHERE n.area_id = a.id AND contains(n.name, ?)))
             ORDER BY a.id"
        );
        let type_code = area_type.code();
        self.query_areas(&sql, &[&type_code, &fragment, &fragment])
    }

    fn areas_of_type(&self, area_type: &AreaType) -> Result<Vec<AreaRecord>, DbError> {
        let sql = format!("SELECT {AREA_COLUMNS} FROM areas a WHERE a.type_code = ? ORDER BY a.id");
        let type_code = area_type.code();
        self.query_areas(&sql, &[&type_code])
    }

    fn save_area(&mut self, draft: &AreaDraft) -> Result<AreaId, DbError> {
        let country = draft.country.map(Country::code);

        if let Some(id) = draft.id {
            self.conn.execute(
                "UPDATE areas SET type_code = ?, country = ?, parent_id = ?,
                     generation_low = ?, generation_high = ?, name = ?
                 WHERE id = ?",
                params![
                    draft.area_type.code(),
                    country,
                    draft.parent,
                    draft.generation_low,
                    draft.generation_high,
                    draft.name,
                    id
                ],
            )?;
            return Ok(id);
        }

        let id: AreaId = self.conn.query_row(
            "INSERT INTO areas (id, type_code, country, parent_id, generation_low, generation_high, name)
             VALUES (nextval('areas_id_seq'), ?, ?, ?, ?, ?, ?)
             RETURNING id",
            params![
                draft.area_type.code(),
                country,
                draft.parent,
                draft.generation_low,
                draft.generation_high,
                draft.name
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    fn upsert_name(&mut self, area: AreaId, name_type: &str, name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO area_names (area_id, name_type, name) VALUES (?, ?, ?)",
            params![area, name_type, name],
        )?;
        self.conn.execute(
            "UPDATE areas SET name = ? WHERE id = ?",
            params![name, area],
        )?;
        Ok(())
    }

    fn upsert_code(&mut self, area: AreaId, code_type: &str, code: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO area_codes (area_id, code_type, code) VALUES (?, ?, ?)",
            params![area, code_type, code],
        )?;
        Ok(())
    }

    fn replace_polygons(
        &mut self,
        area: AreaId,
        polygons: &[Polygon<f64>],
    ) -> Result<Vec<StoredPolygon>, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM polygons WHERE area_id = ?", params![area])?;
        log::debug!("area {area}: removed {deleted} previous polygons");
        self.add_polygons(area, polygons)
    }

    fn add_polygons(
        &mut self,
        area: AreaId,
        polygons: &[Polygon<f64>],
    ) -> Result<Vec<StoredPolygon>, DbError> {
        let mut stored = Vec::with_capacity(polygons.len());

        for polygon in polygons {
            let geojson_str = polygon_to_geojson(polygon)?;
            let id: GeometryId = self.conn.query_row(
                "INSERT INTO polygons (id, area_id, boundary_geojson)
                 VALUES (nextval('polygons_id_seq'), ?, ?)
                 RETURNING id",
                params![area, geojson_str],
                |row| row.get(0),
            )?;
            stored.push(StoredPolygon {
                id,
                area_id: area,
                polygon: polygon.clone(),
            });
        }

        Ok(stored)
    }

    fn area_polygons(&self, area: AreaId) -> Result<Vec<StoredPolygon>, DbError> {
        self.query_polygons(
            "SELECT id, area_id, boundary_geojson FROM polygons WHERE area_id = ? ORDER BY id",
            &[&area],
        )
    }

    fn child_polygons(&self, parent: AreaId) -> Result<Vec<StoredPolygon>, DbError> {
        self.query_polygons(
            "SELECT p.id, p.area_id, p.boundary_geojson FROM polygons p
             JOIN areas a ON a.id = p.area_id
             WHERE a.parent_id = ?
             ORDER BY p.id",
            &[&parent],
        )
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x: f64, y: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + 100.0, y: y),
            (x: x + 100.0, y: y + 100.0),
            (x: x, y: y + 100.0),
        ]
    }

    fn draft(area_type: AreaType, parent: Option<AreaId>, name: &str) -> AreaDraft {
        AreaDraft {
            id: None,
            area_type,
            country: Some(Country::England),
            parent,
            generation_low: 1,
            generation_high: 1,
            name: name.to_string(),
        }
    }

    #[test]
    fn polygon_geojson_roundtrip() {
        let polygon = square(530_000.0, 180_000.0);
        let text = polygon_to_geojson(&polygon).unwrap();
        assert_eq!(polygon_from_geojson(&text).unwrap(), polygon);
    }

    #[test]
    fn rejects_non_polygon_geojson() {
        let text = r#"{"type":"Point","coordinates":[1.0,2.0]}"#;
        assert!(polygon_from_geojson(text).is_err());
    }

    #[test]
    fn finds_area_by_code_type_and_parent() {
        let mut store = open_in_memory().unwrap();
        let force = store.save_area(&draft(AreaType::Force, None, "Kent Police")).unwrap();
        store.upsert_code(force, "police_id", "kent").unwrap();

        let nbh = store
            .save_area(&draft(AreaType::Neighbourhood, Some(force), "Ashford"))
            .unwrap();
        store.upsert_code(nbh, "police_id", "A1").unwrap();

        let found = store
            .find_area("A1", &AreaType::Neighbourhood, Some(force))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, nbh);
        assert!(store
            .find_area("A1", &AreaType::Neighbourhood, None)
            .unwrap()
            .is_none());
        assert!(store
            .find_area("kent", &AreaType::Force, None)
            .unwrap()
            .is_some());
    }

    #[test]
    fn replace_polygons_drops_previous() {
        let mut store = open_in_memory().unwrap();
        let force = store.save_area(&draft(AreaType::Force, None, "Kent Police")).unwrap();
        let nbh = store
            .save_area(&draft(AreaType::Neighbourhood, Some(force), "Ashford"))
            .unwrap();

        store.add_polygons(nbh, &[square(0.0, 0.0), square(200.0, 0.0)]).unwrap();
        let stored = store.replace_polygons(nbh, &[square(500.0, 0.0)]).unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(store.area_polygons(nbh).unwrap().len(), 1);
        assert_eq!(store.child_polygons(force).unwrap().len(), 1);
    }

    #[test]
    fn generation_lifecycle() {
        let mut store = open_in_memory().unwrap();
        assert!(store.active_generation().unwrap().is_none());

        let first = store.create_generation("first import").unwrap();
        assert!(store.create_generation("second").is_err());
        assert_eq!(store.pending_generation().unwrap().map(|g| g.id), Some(first.id));

        store.activate_pending_generation().unwrap();
        assert_eq!(store.active_generation().unwrap().map(|g| g.id), Some(first.id));
        assert!(store.pending_generation().unwrap().is_none());
    }
}
