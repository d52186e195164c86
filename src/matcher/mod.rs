//! Spatial matching of K catalogues into candidate associations.
//!
//! Every candidate is anchored on one entry of the primary (first) catalogue
//! and holds at most one entry from each other catalogue. Entries are admitted
//! together only if every pair of them lies strictly within the match radius,
//! so two entries that are both close to a third but far from each other never
//! end up in the same candidate.
//!
//! Each non-primary catalogue is indexed once with a [`SkyIndex`]; the primary
//! catalogue is streamed through cone queries against those indices.

pub mod combinations;

use tracing::{debug, info};

use crate::catalogue::{angular_separation, Catalogue};
use crate::error::{MatchError, Result};
use crate::skyindex::SkyIndex;
use crate::{Vector3, ARCSEC_PER_RAD};

use combinations::clique_combinations;

/// Number of unordered catalogue pairs for `k` catalogues.
pub fn num_pairs(k: usize) -> usize {
    k * k.saturating_sub(1) / 2
}

/// Position of the pair `(i, j)`, `i < j`, in the flattened pair order
/// `(0,1), (0,2), …, (0,k-1), (1,2), …`.
pub fn pair_index(k: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < k);
    i * (2 * k - i - 1) / 2 + (j - i - 1)
}

/// One proposed association: at most one row per catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Row index per catalogue, `None` where the catalogue is absent.
    /// The primary catalogue (index 0) is always present.
    pub members: Vec<Option<usize>>,
    /// Separation in arcsec for every catalogue pair in [`pair_index`] order,
    /// `NaN` where either side is absent.
    pub separations: Vec<f64>,
    /// Largest defined pairwise separation, arcsec.
    pub separation_max: f64,
}

impl Candidate {
    fn from_members(members: Vec<Option<usize>>, uvecs: &[Vec<Vector3>]) -> Self {
        let k = members.len();
        let mut separations = vec![f64::NAN; num_pairs(k)];
        let mut separation_max = f64::NAN;
        for i in 0..k {
            for j in (i + 1)..k {
                if let (Some(a), Some(b)) = (members[i], members[j]) {
                    let sep = angular_separation(&uvecs[i][a], &uvecs[j][b]) * ARCSEC_PER_RAD;
                    separations[pair_index(k, i, j)] = sep;
                    if separation_max.is_nan() || sep > separation_max {
                        separation_max = sep;
                    }
                }
            }
        }
        Self {
            members,
            separations,
            separation_max,
        }
    }

    /// Separation between catalogues `i` and `j` (any order), arcsec.
    /// `NaN` for `i == j` or when either side is absent.
    pub fn separation(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return f64::NAN;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        self.separations[pair_index(self.members.len(), lo, hi)]
    }

    /// Row of the primary catalogue entry.
    pub fn primary_row(&self) -> usize {
        self.members[0].unwrap_or_default()
    }

    /// Number of catalogues present.
    pub fn num_present(&self) -> usize {
        self.members.iter().filter(|m| m.is_some()).count()
    }
}

/// Output of the spatial matcher: the candidate rows plus matching metadata.
#[derive(Debug, Clone)]
pub struct Candidates {
    pub catalogue_names: Vec<String>,
    pub radius_arcsec: f64,
    pub rows: Vec<Candidate>,
}

impl Candidates {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct rows of catalogue `cat` that appear in a candidate with
    /// `separation_max` strictly below `max_separation_arcsec`, ascending.
    pub fn rows_within(&self, cat: usize, max_separation_arcsec: f64) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .rows
            .iter()
            .filter(|c| c.separation_max < max_separation_arcsec)
            .filter_map(|c| c.members[cat])
            .collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }
}

/// Find all candidate associations among `catalogues` within `radius_arcsec`.
///
/// The first catalogue is the primary. The radius is an exclusive bound on
/// every pairwise separation inside a candidate.
pub fn match_catalogues(catalogues: &[Catalogue], radius_arcsec: f64) -> Result<Candidates> {
    if catalogues.len() < 2 {
        return Err(MatchError::TooFewCatalogues(catalogues.len()));
    }
    if !(radius_arcsec.is_finite() && radius_arcsec > 0.0) {
        return Err(MatchError::InvalidRadius(radius_arcsec));
    }

    let radius_rad = radius_arcsec / ARCSEC_PER_RAD;
    // inclusive cone query, refined below with the exact strict bound
    let query_radius = radius_rad * (1.0 + 1e-6) + 1e-12;

    let indices: Vec<SkyIndex> = catalogues[1..]
        .iter()
        .map(|cat| {
            let index = SkyIndex::for_catalogue(cat, radius_rad);
            debug!(
                "Indexed catalogue {} ({} entries, nside={})",
                cat.name(),
                index.len(),
                index.nside()
            );
            index
        })
        .collect();

    let uvecs: Vec<Vec<Vector3>> = catalogues
        .iter()
        .map(|cat| cat.entries().iter().map(|e| e.uvec()).collect())
        .collect();

    let within = |a: &Vector3, b: &Vector3| angular_separation(a, b) < radius_rad;

    let mut rows = Vec::new();
    let mut matched_primaries = 0usize;
    for (p, dir) in uvecs[0].iter().enumerate() {
        let mut neighbours: Vec<Vec<usize>> = Vec::with_capacity(catalogues.len());
        neighbours.push(vec![p]);
        for (c, index) in indices.iter().enumerate() {
            let mut near = index.query(dir, query_radius);
            near.retain(|&row| within(dir, &uvecs[c + 1][row]));
            neighbours.push(near);
        }
        if neighbours[1..].iter().all(Vec::is_empty) {
            continue;
        }

        let combos = clique_combinations(&neighbours, |(ca, ra), (cb, rb)| {
            within(&uvecs[ca][ra], &uvecs[cb][rb])
        });
        if !combos.is_empty() {
            matched_primaries += 1;
        }
        rows.extend(
            combos
                .into_iter()
                .map(|members| Candidate::from_members(members, &uvecs)),
        );
    }

    info!(
        "Matched {} of {} primary entries into {} candidates (radius {} arcsec)",
        matched_primaries,
        catalogues[0].len(),
        rows.len(),
        radius_arcsec
    );

    Ok(Candidates {
        catalogue_names: catalogues.iter().map(|c| c.name().to_string()).collect(),
        radius_arcsec,
        rows,
    })
}
