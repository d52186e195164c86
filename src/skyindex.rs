//! Spatial index over catalogue positions for fast cone (angular-radius) searches.
//!
//! `SkyIndex` bins positions on an equal-area sphere partition:
//! latitude is split into `3 * nside` bins in `z = sin(dec)`, and
//! longitude into `4 * nside` bins in right ascension, for a total of
//! `12 * nside^2` cells. Each cell maps to a compact slice of row indices.
//!
//! Query flow:
//! 1. Compute candidate cells intersecting the cone around a direction.
//! 2. Scan only rows in those cells.
//! 3. Apply exact angular filtering using a dot-product threshold.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::catalogue::Catalogue;
use crate::Vector3;

/// Upper bound on `nside`, keeping the cell table below ~13M cells.
const MAX_NSIDE: u32 = 1024;

/// Slack added to the cone extent to absorb rounding at bin edges.
const EDGE_MARGIN_RAD: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SkyIndex {
    nside: u32,
    n_lat: u32,
    n_lon: u32,
    uvecs: Vec<Vector3>,
    /// `cell_start[c]..cell_start[c + 1]` is the slice of `rows` in cell `c`.
    cell_start: Vec<u32>,
    rows: Vec<u32>,
}

impl SkyIndex {
    /// Build an index from unit vectors (row order is preserved in query results).
    ///
    /// `nside` must be greater than zero.
    pub fn new(nside: u32, uvecs: Vec<Vector3>) -> Self {
        assert!(nside > 0, "nside must be > 0");
        let n_lat = 3 * nside;
        let n_lon = 4 * nside;
        let n_cells = (n_lat * n_lon) as usize;

        // counting sort of rows by cell
        let cells: Vec<usize> = uvecs
            .iter()
            .map(|v| Self::cell_of(n_lat, n_lon, v))
            .collect();
        let mut cell_start = vec![0u32; n_cells + 1];
        for &cell in &cells {
            cell_start[cell + 1] += 1;
        }
        for c in 0..n_cells {
            cell_start[c + 1] += cell_start[c];
        }
        let mut fill = cell_start.clone();
        let mut rows = vec![0u32; uvecs.len()];
        for (row, &cell) in cells.iter().enumerate() {
            rows[fill[cell] as usize] = row as u32;
            fill[cell] += 1;
        }

        Self {
            nside,
            n_lat,
            n_lon,
            uvecs,
            cell_start,
            rows,
        }
    }

    /// Index a catalogue with a resolution chosen from its size and the search radius.
    pub fn for_catalogue(catalogue: &Catalogue, radius_rad: f64) -> Self {
        let uvecs: Vec<Vector3> = catalogue.entries().iter().map(|e| e.uvec()).collect();
        let nside = auto_nside(uvecs.len(), radius_rad);
        Self::new(nside, uvecs)
    }

    pub fn nside(&self) -> u32 {
        self.nside
    }

    pub fn len(&self) -> usize {
        self.uvecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uvecs.is_empty()
    }

    /// Rows within `radius_rad` (inclusive) of `dir`, sorted ascending.
    ///
    /// `dir` is normalized internally; `radius_rad` is clamped to `[0, π]`.
    /// A zero direction matches nothing.
    pub fn query(&self, dir: &Vector3, radius_rad: f64) -> Vec<usize> {
        let Some(dir) = dir.try_normalize(0.0) else {
            return Vec::new();
        };
        if self.is_empty() {
            return Vec::new();
        }
        let radius = radius_rad.clamp(0.0, PI);
        let cos_radius = radius.cos();

        // exact declination extent of the cone
        let dec_center = dir.z.clamp(-1.0, 1.0).asin();
        let dec_lo = dec_center - radius - EDGE_MARGIN_RAD;
        let dec_hi = dec_center + radius + EDGE_MARGIN_RAD;
        let lat_lo = Self::lat_bin(self.n_lat, dec_lo.max(-FRAC_PI_2).sin());
        let lat_hi = Self::lat_bin(self.n_lat, dec_hi.min(FRAC_PI_2).sin());

        // a cone containing a pole spans every longitude
        let lon_half_span = if dec_hi >= FRAC_PI_2 || dec_lo <= -FRAC_PI_2 {
            PI
        } else {
            (radius.sin() / dec_center.cos()).min(1.0).asin() + EDGE_MARGIN_RAD
        };
        let phi = dir.y.atan2(dir.x);

        let mut out = Vec::new();
        for lat in lat_lo..=lat_hi {
            for lon in self.lon_bins(phi, lon_half_span) {
                out.extend(
                    self.cell_rows(lat * self.n_lon + lon)
                        .iter()
                        .map(|&row| row as usize)
                        .filter(|&row| dir.dot(&self.uvecs[row]) >= cos_radius),
                );
            }
        }

        out.sort_unstable();
        out
    }

    fn cell_rows(&self, cell: u32) -> &[u32] {
        let cell = cell as usize;
        &self.rows[self.cell_start[cell] as usize..self.cell_start[cell + 1] as usize]
    }

    /// Longitude bins covering `center ± half_span`, walking eastward across 0 if needed.
    fn lon_bins(&self, center: f64, half_span: f64) -> impl Iterator<Item = u32> {
        let n_lon = self.n_lon;
        let (lon_min, lon_max) = (center - half_span, center + half_span);
        let first = Self::lon_bin(n_lon, lon_min);
        let last = Self::lon_bin(n_lon, lon_max);
        let count = if half_span >= PI {
            n_lon
        } else if first == last && lon_min.rem_euclid(TAU) > lon_max.rem_euclid(TAU) {
            // span wraps all the way round inside one bin
            n_lon
        } else {
            (last + n_lon - first) % n_lon + 1
        };
        (0..count).map(move |i| (first + i) % n_lon)
    }

    fn cell_of(n_lat: u32, n_lon: u32, v: &Vector3) -> usize {
        let lat = Self::lat_bin(n_lat, v.z);
        let lon = Self::lon_bin(n_lon, v.y.atan2(v.x));
        (lat * n_lon + lon) as usize
    }

    /// Equal-area latitude band of `z = sin(dec)`.
    fn lat_bin(n_lat: u32, z: f64) -> u32 {
        let u = (z.clamp(-1.0, 1.0) + 1.0) * 0.5;
        ((u * n_lat as f64) as u32).min(n_lat - 1)
    }

    /// Longitude bin of any angle, wrapped into `[0, 2π)`.
    fn lon_bin(n_lon: u32, phi: f64) -> u32 {
        let u = phi.rem_euclid(TAU) / TAU;
        ((u * n_lon as f64) as u32).min(n_lon - 1)
    }
}

/// Pick `nside` so cells hold about one row each, without making a cell's
/// latitude extent smaller than the search radius.
fn auto_nside(n_rows: usize, radius_rad: f64) -> u32 {
    let by_density = ((n_rows as f64) / 12.0).sqrt().ceil();
    let by_radius = if radius_rad > 0.0 {
        (2.0 / (3.0 * radius_rad)).floor()
    } else {
        f64::INFINITY
    };
    by_density.min(by_radius).clamp(1.0, MAX_NSIDE as f64) as u32
}
