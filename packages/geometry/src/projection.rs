//! Conversion between WGS84 longitude/latitude (EPSG:4326) and the OSGB36
//! British National Grid (EPSG:27700).
//!
//! Uses a seven-parameter Helmert datum shift between the GRS80/WGS84 and
//! Airy 1830 ellipsoids followed by a Transverse Mercator projection. The
//! Helmert shift is accurate to a few metres, which is well within what
//! the displayability tolerance needs.

use geo::{Coord, MapCoords};

/// An ellipsoid given by its semi-major and semi-minor axes, in metres.
#[derive(Debug, Clone, Copy)]
struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    fn e2(self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }
}

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

const GRS80: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.314_245,
};

/// National Grid scale factor on the central meridian.
const F0: f64 = 0.999_601_271_7;
/// True origin latitude (49°N) and longitude (2°W), in degrees.
const LAT0_DEG: f64 = 49.0;
const LON0_DEG: f64 = -2.0;
/// False easting and northing of the true origin, in metres.
const E0: f64 = 400_000.0;
const N0: f64 = -100_000.0;

/// Helmert parameters WGS84 -> OSGB36: translations (m), scale (ppm),
/// rotations (arc seconds).
#[derive(Debug, Clone, Copy)]
struct Helmert {
    tx: f64,
    ty: f64,
    tz: f64,
    s_ppm: f64,
    rx_sec: f64,
    ry_sec: f64,
    rz_sec: f64,
}

const WGS84_TO_OSGB36: Helmert = Helmert {
    tx: -446.448,
    ty: 125.157,
    tz: -542.060,
    s_ppm: 20.4894,
    rx_sec: -0.1502,
    ry_sec: -0.2470,
    rz_sec: -0.8421,
};

impl Helmert {
    fn inverse(self) -> Self {
        Self {
            tx: -self.tx,
            ty: -self.ty,
            tz: -self.tz,
            s_ppm: -self.s_ppm,
            rx_sec: -self.rx_sec,
            ry_sec: -self.ry_sec,
            rz_sec: -self.rz_sec,
        }
    }

    fn apply(self, [x, y, z]: [f64; 3]) -> [f64; 3] {
        let arcsec = std::f64::consts::PI / (180.0 * 3600.0);
        let s1 = 1.0 + self.s_ppm * 1e-6;
        let rx = self.rx_sec * arcsec;
        let ry = self.ry_sec * arcsec;
        let rz = self.rz_sec * arcsec;
        [
            self.tx + s1 * x - rz * y + ry * z,
            self.ty + rz * x + s1 * y - rx * z,
            self.tz - ry * x + rx * y + s1 * z,
        ]
    }
}

fn to_cartesian(ellipsoid: Ellipsoid, lat: f64, lon: f64) -> [f64; 3] {
    let e2 = ellipsoid.e2();
    let nu = ellipsoid.a / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    [
        nu * lat.cos() * lon.cos(),
        nu * lat.cos() * lon.sin(),
        (1.0 - e2) * nu * lat.sin(),
    ]
}

fn from_cartesian(ellipsoid: Ellipsoid, [x, y, z]: [f64; 3]) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let p = x.hypot(y);
    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let nu = ellipsoid.a / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        let next = (z + e2 * nu * lat.sin()).atan2(p);
        if (next - lat).abs() < 1e-12 {
            lat = next;
            break;
        }
        lat = next;
    }
    (lat, y.atan2(x))
}

/// Meridional arc from the true origin latitude to `lat`.
fn meridional_arc(lat: f64) -> f64 {
    let Ellipsoid { a, b } = AIRY_1830;
    let n = (a - b) / (a + b);
    let (n2, n3) = (n * n, n * n * n);
    let lat0 = LAT0_DEG.to_radians();
    let (d, s) = (lat - lat0, lat + lat0);

    b * F0
        * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * d
            - (3.0 * n + 3.0 * n2 + 2.625 * n3) * d.sin() * s.cos()
            + (1.875 * n2 + 1.875 * n3) * (2.0 * d).sin() * (2.0 * s).cos()
            - (35.0 / 24.0) * n3 * (3.0 * d).sin() * (3.0 * s).cos())
}

/// Radii of curvature `(nu, rho, eta2)` on the Airy ellipsoid.
fn curvature(lat: f64) -> (f64, f64, f64) {
    let Ellipsoid { a, .. } = AIRY_1830;
    let e2 = AIRY_1830.e2();
    let denom = 1.0 - e2 * lat.sin().powi(2);
    let nu = a * F0 / denom.sqrt();
    let rho = a * F0 * (1.0 - e2) / denom.powf(1.5);
    (nu, rho, nu / rho - 1.0)
}

/// Projects OSGB36 latitude/longitude (radians) onto the National Grid.
fn grid_from_osgb36(lat: f64, lon: f64) -> (f64, f64) {
    let (nu, rho, eta2) = curvature(lat);
    let (sin, cos, tan) = (lat.sin(), lat.cos(), lat.tan());
    let tan2 = tan * tan;
    let tan4 = tan2 * tan2;

    let i = meridional_arc(lat) + N0;
    let ii = nu / 2.0 * sin * cos;
    let iii = nu / 24.0 * sin * cos.powi(3) * (5.0 - tan2 + 9.0 * eta2);
    let iiia = nu / 720.0 * sin * cos.powi(5) * (61.0 - 58.0 * tan2 + tan4);
    let iv = nu * cos;
    let v = nu / 6.0 * cos.powi(3) * (nu / rho - tan2);
    let vi = nu / 120.0
        * cos.powi(5)
        * (5.0 - 18.0 * tan2 + tan4 + 14.0 * eta2 - 58.0 * tan2 * eta2);

    let dl = lon - LON0_DEG.to_radians();
    let northing = i + ii * dl.powi(2) + iii * dl.powi(4) + iiia * dl.powi(6);
    let easting = E0 + iv * dl + v * dl.powi(3) + vi * dl.powi(5);
    (easting, northing)
}

/// Inverse of [`grid_from_osgb36`]; returns OSGB36 latitude/longitude in
/// radians.
fn osgb36_from_grid(easting: f64, northing: f64) -> (f64, f64) {
    let a = AIRY_1830.a;
    let lat0 = LAT0_DEG.to_radians();

    let mut lat = (northing - N0) / (a * F0) + lat0;
    let mut m = meridional_arc(lat);
    for _ in 0..20 {
        if (northing - N0 - m).abs() < 1e-5 {
            break;
        }
        lat += (northing - N0 - m) / (a * F0);
        m = meridional_arc(lat);
    }

    let (nu, rho, eta2) = curvature(lat);
    let tan = lat.tan();
    let (tan2, tan4, tan6) = (tan * tan, tan.powi(4), tan.powi(6));
    let sec = 1.0 / lat.cos();

    let vii = tan / (2.0 * rho * nu);
    let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
    let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
    let x = sec / nu;
    let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
    let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
    let xiia = sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan6);

    let de = easting - E0;
    let out_lat = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
    let out_lon = LON0_DEG.to_radians() + x * de - xi * de.powi(3) + xii * de.powi(5)
        - xiia * de.powi(7);
    (out_lat, out_lon)
}

/// Converts a WGS84 coordinate (`x` = longitude, `y` = latitude, degrees)
/// to National Grid easting/northing in metres.
#[must_use]
pub fn wgs84_to_osgb(coord: Coord<f64>) -> Coord<f64> {
    let cartesian = to_cartesian(GRS80, coord.y.to_radians(), coord.x.to_radians());
    let (lat, lon) = from_cartesian(AIRY_1830, WGS84_TO_OSGB36.apply(cartesian));
    let (easting, northing) = grid_from_osgb36(lat, lon);
    Coord {
        x: easting,
        y: northing,
    }
}

/// Converts a National Grid coordinate (`x` = easting, `y` = northing) to
/// WGS84 longitude/latitude in degrees.
#[must_use]
pub fn osgb_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    let (lat, lon) = osgb36_from_grid(coord.x, coord.y);
    let cartesian = to_cartesian(AIRY_1830, lat, lon);
    let (lat, lon) = from_cartesian(GRS80, WGS84_TO_OSGB36.inverse().apply(cartesian));
    Coord {
        x: lon.to_degrees(),
        y: lat.to_degrees(),
    }
}

/// Reprojects any geometry from WGS84 to the National Grid.
#[must_use]
pub fn to_osgb<G>(geometry: &G) -> G::Output
where
    G: MapCoords<f64, f64>,
{
    geometry.map_coords(wgs84_to_osgb)
}

/// Reprojects any geometry from the National Grid to WGS84.
#[must_use]
pub fn to_wgs84<G>(geometry: &G) -> G::Output
where
    G: MapCoords<f64, f64>,
{
    geometry.map_coords(osgb_to_wgs84)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dms(deg: f64, min: f64, sec: f64) -> f64 {
        deg + min / 60.0 + sec / 3600.0
    }

    #[test]
    fn projects_ordnance_survey_worked_example() {
        // OSGB36 52°39'27.2531"N 1°43'4.5177"E -> 651409.903, 313177.270
        let lat = dms(52.0, 39.0, 27.2531).to_radians();
        let lon = dms(1.0, 43.0, 4.5177).to_radians();
        let (easting, northing) = grid_from_osgb36(lat, lon);
        assert!((easting - 651_409.903).abs() < 0.01, "easting {easting}");
        assert!((northing - 313_177.270).abs() < 0.01, "northing {northing}");
    }

    #[test]
    fn inverts_ordnance_survey_worked_example() {
        let (lat, lon) = osgb36_from_grid(651_409.903, 313_177.270);
        assert!((lat.to_degrees() - dms(52.0, 39.0, 27.2531)).abs() < 1e-7);
        assert!((lon.to_degrees() - dms(1.0, 43.0, 4.5177)).abs() < 1e-7);
    }

    #[test]
    fn london_lands_in_london_grid_square() {
        // Trafalgar Square, roughly TQ 300 804.
        let grid = wgs84_to_osgb(Coord {
            x: -0.128_0,
            y: 51.508_0,
        });
        assert!((grid.x - 530_000.0).abs() < 500.0, "easting {}", grid.x);
        assert!((grid.y - 180_450.0).abs() < 500.0, "northing {}", grid.y);
    }

    proptest! {
        #[test]
        fn roundtrip_stays_within_ten_centimetres(lon in -6.0f64..2.0, lat in 50.0f64..58.0) {
            let back = osgb_to_wgs84(wgs84_to_osgb(Coord { x: lon, y: lat }));
            prop_assert!((back.x - lon).abs() < 1e-6);
            prop_assert!((back.y - lat).abs() < 1e-6);
        }
    }
}
