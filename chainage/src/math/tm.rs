//! Ellipsoidal transverse Mercator, forward and inverse.
//!
//! Series expansions from Snyder, *Map Projections: A Working
//! Manual* (USGS PP 1395), eqs. 8-9..8-25. Sub-millimeter agreement
//! with reference implementations inside a standard 6° zone, which
//! covers both UTM and the 2° Taiwan datum zones used here.

use crate::ChainageError;
use geo::geometry::Coord;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ellipsoid {
    /// Semi-major axis in meters.
    a: f64,
    /// Flattening.
    f: f64,
}

const GRS80: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    f: 1.0 / 298.257_222_101,
};

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    f: 1.0 / 298.257_223_563,
};

/// A transverse Mercator projection on a reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    ellipsoid: Ellipsoid,
    /// Central meridian, radians.
    lon0: f64,
    /// Scale factor at the central meridian.
    k0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl TransverseMercator {
    /// TWD97 / TM2 zone 121 (EPSG:3826), the common CRS for Taiwanese
    /// coastal survey data.
    pub fn twd97() -> Self {
        Self {
            ellipsoid: GRS80,
            lon0: 121.0_f64.to_radians(),
            k0: 0.9999,
            false_easting: 250_000.0,
            false_northing: 0.0,
        }
    }

    /// UTM zone `zone` (1..=60) on WGS84.
    pub fn utm(zone: u8, south: bool) -> Self {
        let lon0_deg = f64::from(zone) * 6.0 - 183.0;
        Self {
            ellipsoid: WGS84,
            lon0: lon0_deg.to_radians(),
            k0: 0.9996,
            false_easting: 500_000.0,
            false_northing: if south { 10_000_000.0 } else { 0.0 },
        }
    }

    /// Resolves the projections this crate knows how to compute.
    pub fn from_epsg(code: u32) -> Result<Self, ChainageError> {
        match code {
            3826 => Ok(Self::twd97()),
            32601..=32660 => Ok(Self::utm((code - 32600) as u8, false)),
            32701..=32760 => Ok(Self::utm((code - 32700) as u8, true)),
            other => Err(ChainageError::Epsg(other)),
        }
    }

    /// Projects geographic `(lon, lat)` degrees to `(easting, northing)`.
    #[allow(clippy::many_single_char_names)]
    pub fn forward(&self, lonlat: Coord<f64>) -> Coord<f64> {
        let Ellipsoid { a, f } = self.ellipsoid;
        let e2 = f * (2.0 - f);
        let ep2 = e2 / (1.0 - e2);

        let lat = lonlat.y.to_radians();
        let lon = lonlat.x.to_radians();

        let (sin_lat, cos_lat) = lat.sin_cos();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let t = (lat.tan()).powi(2);
        let c = ep2 * cos_lat * cos_lat;
        let big_a = (lon - self.lon0) * cos_lat;

        let m = meridian_arc(&self.ellipsoid, lat);

        let x = self.k0
            * n
            * (big_a
                + (1.0 - t + c) * big_a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * big_a.powi(5) / 120.0);
        let y = self.k0
            * (m + n
                * lat.tan()
                * (big_a.powi(2) / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * big_a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * big_a.powi(6)
                        / 720.0));

        Coord {
            x: self.false_easting + x,
            y: self.false_northing + y,
        }
    }

    /// Unprojects `(easting, northing)` to geographic `(lon, lat)` degrees.
    #[allow(clippy::many_single_char_names)]
    pub fn inverse(&self, en: Coord<f64>) -> Coord<f64> {
        let Ellipsoid { a, f } = self.ellipsoid;
        let e2 = f * (2.0 - f);
        let ep2 = e2 / (1.0 - e2);

        let m = (en.y - self.false_northing) / self.k0;
        let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));

        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let lat1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin_lat1, cos_lat1) = lat1.sin_cos();
        let c1 = ep2 * cos_lat1 * cos_lat1;
        let t1 = lat1.tan().powi(2);
        let n1 = a / (1.0 - e2 * sin_lat1 * sin_lat1).sqrt();
        let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_lat1 * sin_lat1).powf(1.5);
        let d = (en.x - self.false_easting) / (n1 * self.k0);

        let lat = lat1
            - (n1 * lat1.tan() / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                    * d.powi(5)
                    / 120.0)
                / cos_lat1;

        Coord {
            x: lon.to_degrees(),
            y: lat.to_degrees(),
        }
    }
}

/// Meridian arc length from the equator to `lat` (Snyder eq. 3-21).
fn meridian_arc(ellipsoid: &Ellipsoid, lat: f64) -> f64 {
    let Ellipsoid { a, f } = *ellipsoid;
    let e2 = f * (2.0 - f);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    a * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
