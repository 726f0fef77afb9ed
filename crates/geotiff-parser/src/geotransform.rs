//! Pixel-to-geographic transforms parsed from GeoTIFF geokeys.

use chip_common::GeoBounds;
use tracing::warn;

// WGS84 ellipsoid
const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

// UTM projection constants
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Coordinate reference system of a patch, as far as the loader needs to
/// understand it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsKind {
    /// Geographic lat/lon degrees (GTModelType = 2).
    Geographic,
    /// UTM on WGS84: EPSG 326xx (north) / 327xx (south).
    UtmWgs84 { zone: u8, south: bool },
    /// Anything else; bounds cannot be derived.
    Unknown(u16),
}

impl CrsKind {
    /// Classify from the GeoTIFF key directory values.
    pub fn from_geo_keys(model_type: Option<u16>, projected_cs: Option<u16>) -> Self {
        match model_type {
            Some(2) => CrsKind::Geographic,
            _ => match projected_cs {
                Some(code @ 32601..=32660) => CrsKind::UtmWgs84 {
                    zone: (code - 32600) as u8,
                    south: false,
                },
                Some(code @ 32701..=32760) => CrsKind::UtmWgs84 {
                    zone: (code - 32700) as u8,
                    south: true,
                },
                Some(code) => CrsKind::Unknown(code),
                None => CrsKind::Unknown(0),
            },
        }
    }
}

/// Affine pixel-to-CRS transform from ModelTiepoint + ModelPixelScale.
///
/// Only the axis-aligned form GeoTIFF writers emit for north-up rasters is
/// supported; the archive contains no rotated patches.
#[derive(Debug, Clone, Copy)]
pub struct GeoTransform {
    /// CRS x-coordinate of the upper-left corner of the upper-left pixel.
    pub origin_x: f64,
    /// CRS y-coordinate of the upper-left corner of the upper-left pixel.
    pub origin_y: f64,
    /// Pixel width in CRS units.
    pub pixel_width: f64,
    /// Pixel height in CRS units (positive; rows grow southward).
    pub pixel_height: f64,
    pub crs: CrsKind,
}

impl GeoTransform {
    /// Build from raw GeoTIFF tag values.
    ///
    /// `tiepoint` is the 6-value ModelTiepoint (i, j, k, x, y, z) and
    /// `pixel_scale` the 3-value ModelPixelScale (sx, sy, sz).
    pub fn from_tags(tiepoint: &[f64], pixel_scale: &[f64], crs: CrsKind) -> Option<Self> {
        if tiepoint.len() < 6 || pixel_scale.len() < 2 {
            return None;
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (sx, sy) = (pixel_scale[0], pixel_scale[1]);
        if sx <= 0.0 || sy <= 0.0 {
            return None;
        }
        // Shift the tiepoint back to pixel (0, 0)
        Some(Self {
            origin_x: x - i * sx,
            origin_y: y + j * sy,
            pixel_width: sx,
            pixel_height: sy,
            crs,
        })
    }

    /// CRS coordinates of a pixel corner.
    pub fn pixel_to_crs(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y - row * self.pixel_height,
        )
    }

    /// WGS84 bounds of a `width x height` raster under this transform.
    ///
    /// Returns `None` for CRSs the loader does not understand; the patch
    /// still renders, it just cannot be placed on the map.
    pub fn wgs84_bounds(&self, width: usize, height: usize) -> Option<GeoBounds> {
        let corners = [
            self.pixel_to_crs(0.0, 0.0),
            self.pixel_to_crs(width as f64, 0.0),
            self.pixel_to_crs(0.0, height as f64),
            self.pixel_to_crs(width as f64, height as f64),
        ];

        let mut lat_min = f64::INFINITY;
        let mut lat_max = f64::NEG_INFINITY;
        let mut lon_min = f64::INFINITY;
        let mut lon_max = f64::NEG_INFINITY;

        for (x, y) in corners {
            let (lat, lon) = match self.crs {
                CrsKind::Geographic => (y, x),
                CrsKind::UtmWgs84 { zone, south } => utm_to_wgs84(x, y, zone, south),
                CrsKind::Unknown(code) => {
                    warn!(epsg = code, "unrecognized CRS, patch bounds unavailable");
                    return None;
                }
            };
            lat_min = lat_min.min(lat);
            lat_max = lat_max.max(lat);
            lon_min = lon_min.min(lon);
            lon_max = lon_max.max(lon);
        }

        Some(GeoBounds::new(lat_min, lat_max, lon_min, lon_max))
    }
}

/// Inverse transverse Mercator: UTM easting/northing to WGS84 degrees.
///
/// Snyder's series inversion on the WGS84 ellipsoid. Accuracy is far below
/// a pixel for in-zone coordinates, which is all the archive contains.
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u8, south: bool) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let x = easting - UTM_FALSE_EASTING;
    let y = if south {
        northing - UTM_FALSE_NORTHING_SOUTH
    } else {
        northing
    };

    // Footpoint latitude from the meridional arc
    let m = y / UTM_K0;
    let mu = m / (WGS84_A
        * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let n1 = WGS84_A / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ep2
                    - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon = (d
        - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
            * d.powi(5)
            / 120.0)
        / cos_phi1;

    let lon0 = (zone as f64) * 6.0 - 183.0;
    (lat.to_degrees(), lon0 + lon.to_degrees())
}
