//! End-to-end association pipeline.
//!
//! Stages run in a fixed order, each consuming the previous stage's output
//! without mutating it:
//!
//! 1. [`match_catalogues`] produces the candidate rows.
//! 2. [`evidence_stage`] adds the log10 Bayes factor per candidate.
//! 3. [`magnitude_stage`] fits and applies one bias column per magnitude spec.
//! 4. [`resolve`](crate::resolve) combines prior, evidence and biases into
//!    posteriors and flags.
//!
//! The joined result is a [`MatchTable`], optionally pruned by posterior.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalogue::Catalogue;
use crate::error::{MatchError, Result};
use crate::evidence::log_bayes_factor;
use crate::magnitude::{
    clean_magnitude, fit_weight, AdaptiveHistogram, MagnitudeWeight, DEFAULT_HISTOGRAM_EDGES,
};
use crate::matcher::{match_catalogues, Candidates};
use crate::resolve::{
    compute_prior, flag_candidates, posteriors, retained_rows, FlagPolicy, MatchFlag,
    DEFAULT_SECONDARY_FLOOR,
};

/// A `<catalogue>:<column>` reference to a magnitude column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnitudeSpec {
    pub catalogue: String,
    pub column: String,
}

impl FromStr for MagnitudeSpec {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((catalogue, column)) if !catalogue.is_empty() && !column.is_empty() => {
                Ok(Self {
                    catalogue: catalogue.to_string(),
                    column: column.to_string(),
                })
            }
            _ => Err(MatchError::MalformedMagnitudeSpec(s.to_string())),
        }
    }
}

impl fmt::Display for MagnitudeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.catalogue, self.column)
    }
}

/// A column resolved against the loaded catalogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub catalogue: usize,
    pub column: usize,
}

/// Parameters of an association run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Exclusive search radius for candidate pairs, arcsec. Default 10.
    pub radius_arcsec: f64,
    /// `Separation_max` bound selecting likely true matches for the
    /// magnitude histograms, arcsec. Default 3.
    pub mag_radius_arcsec: f64,
    /// Expected fraction of primary sources with a counterpart, in (0, 1]. Default 1.
    pub prior_completeness: f64,
    /// Magnitude columns used for biasing.
    pub magnitudes: Vec<MagnitudeSpec>,
    /// Posterior gap to the best solution within which secondaries are flagged. Default 0.005.
    pub acceptable_prob: f64,
    /// Rows with a lower posterior are dropped after flagging; 0 keeps all. Default 0.
    pub min_prob: f64,
    /// Secondaries need a posterior strictly above this. Default 0.1.
    pub secondary_floor: f64,
    /// Edge points of the adaptive magnitude histograms. Default 15.
    pub histogram_edges: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            radius_arcsec: 10.0,
            mag_radius_arcsec: 3.0,
            prior_completeness: 1.0,
            magnitudes: Vec::new(),
            acceptable_prob: 0.005,
            min_prob: 0.0,
            secondary_floor: DEFAULT_SECONDARY_FLOOR,
            histogram_edges: DEFAULT_HISTOGRAM_EDGES,
        }
    }
}

impl MatchConfig {
    /// Check the configuration against the catalogues and resolve the
    /// magnitude specs. Runs before any matching work.
    pub fn validate(&self, catalogues: &[Catalogue]) -> Result<Vec<ColumnRef>> {
        if catalogues.len() < 2 {
            return Err(MatchError::TooFewCatalogues(catalogues.len()));
        }
        for (i, cat) in catalogues.iter().enumerate() {
            if catalogues[..i].iter().any(|c| c.name() == cat.name()) {
                return Err(MatchError::DuplicateCatalogue(cat.name().to_string()));
            }
        }
        if !(self.radius_arcsec.is_finite() && self.radius_arcsec > 0.0) {
            return Err(MatchError::InvalidRadius(self.radius_arcsec));
        }
        if !(self.mag_radius_arcsec.is_finite() && self.mag_radius_arcsec > 0.0) {
            return Err(MatchError::InvalidMagRadius(self.mag_radius_arcsec));
        }
        if self.mag_radius_arcsec > self.radius_arcsec {
            warn!(
                "Magnitude radius {} arcsec exceeds match radius {} arcsec",
                self.mag_radius_arcsec, self.radius_arcsec
            );
        }
        if !(self.prior_completeness > 0.0 && self.prior_completeness <= 1.0) {
            return Err(MatchError::InvalidCompleteness(self.prior_completeness));
        }
        for (name, value) in [
            ("acceptable_prob", self.acceptable_prob),
            ("min_prob", self.min_prob),
            ("secondary_floor", self.secondary_floor),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MatchError::InvalidThreshold { name, value });
            }
        }
        if self.histogram_edges < 3 {
            return Err(MatchError::InvalidHistogramEdges(self.histogram_edges));
        }

        let primary = &catalogues[0];
        if let Some(row) = primary.entries().iter().position(|e| e.id.is_none()) {
            return Err(MatchError::MissingPrimaryId {
                catalogue: primary.name().to_string(),
                row,
            });
        }
        for cat in catalogues {
            cat.error_source()?;
        }

        self.magnitudes
            .iter()
            .map(|spec| resolve_spec(spec, catalogues))
            .collect()
    }

    fn flag_policy(&self) -> FlagPolicy {
        FlagPolicy {
            acceptable_prob: self.acceptable_prob,
            secondary_floor: self.secondary_floor,
        }
    }
}

fn resolve_spec(spec: &MagnitudeSpec, catalogues: &[Catalogue]) -> Result<ColumnRef> {
    let catalogue = catalogues
        .iter()
        .position(|c| c.name() == spec.catalogue)
        .ok_or_else(|| MatchError::UnknownCatalogue {
            spec: spec.to_string(),
            catalogue: spec.catalogue.clone(),
            known: catalogues
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(", "),
        })?;
    let cat = &catalogues[catalogue];
    let column = cat
        .column_index(&spec.column)
        .ok_or_else(|| MatchError::UnknownColumn {
            spec: spec.to_string(),
            catalogue: spec.catalogue.clone(),
            column: spec.column.clone(),
            known: cat.columns().join(", "),
        })?;
    Ok(ColumnRef { catalogue, column })
}

/// One fitted magnitude bias column.
#[derive(Debug, Clone)]
pub struct BiasColumn {
    pub spec: MagnitudeSpec,
    pub source: ColumnRef,
    /// Histograms the weight was fitted to, kept for diagnostics.
    pub histogram: AdaptiveHistogram,
    pub weight: MagnitudeWeight,
    /// log10 bias per candidate; 0 where the magnitude is undefined or absent.
    pub values: Vec<f64>,
}

impl BiasColumn {
    /// Output column name, `bias_<catalogue>_<column>`.
    pub fn name(&self) -> String {
        format!("bias_{}_{}", self.spec.catalogue, self.spec.column)
    }
}

/// Candidates joined with every derived column.
#[derive(Debug, Clone)]
pub struct MatchTable {
    pub candidates: Candidates,
    pub prior: f64,
    /// log10 Bayes factor.
    pub log_bf: Vec<f64>,
    /// Posterior from positional evidence alone.
    pub bf_post: Vec<f64>,
    pub biases: Vec<BiasColumn>,
    /// Final posterior including magnitude biases.
    pub post: Vec<f64>,
    pub flags: Vec<MatchFlag>,
}

impl MatchTable {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// A new table holding only rows with `post >= min_prob`.
    /// Flags are carried over unchanged.
    pub fn prune(&self, min_prob: f64) -> MatchTable {
        let keep = retained_rows(&self.post, min_prob);
        let pick = |col: &[f64]| keep.iter().map(|&r| col[r]).collect::<Vec<f64>>();
        MatchTable {
            candidates: Candidates {
                catalogue_names: self.candidates.catalogue_names.clone(),
                radius_arcsec: self.candidates.radius_arcsec,
                rows: keep
                    .iter()
                    .map(|&r| self.candidates.rows[r].clone())
                    .collect(),
            },
            prior: self.prior,
            log_bf: pick(&self.log_bf),
            bf_post: pick(&self.bf_post),
            biases: self
                .biases
                .iter()
                .map(|b| BiasColumn {
                    values: pick(&b.values),
                    ..b.clone()
                })
                .collect(),
            post: pick(&self.post),
            flags: keep.iter().map(|&r| self.flags[r]).collect(),
        }
    }
}

/// Log10 Bayes factor for every candidate.
///
/// Position errors are validated here, on first use.
pub fn evidence_stage(catalogues: &[Catalogue], candidates: &Candidates) -> Result<Vec<f64>> {
    let sources = catalogues
        .iter()
        .map(|c| c.error_source())
        .collect::<Result<Vec<_>>>()?;

    let mut errors = vec![None; catalogues.len()];
    candidates
        .rows
        .iter()
        .map(|cand| {
            for (i, member) in cand.members.iter().enumerate() {
                errors[i] = match member {
                    Some(row) => Some(sources[i].sigma(&catalogues[i], *row)?),
                    None => None,
                };
            }
            Ok(log_bayes_factor(&cand.separations, &errors))
        })
        .collect()
}

/// Fit the magnitude weight for one column and evaluate it for every candidate.
pub fn magnitude_stage(
    catalogues: &[Catalogue],
    candidates: &Candidates,
    spec: &MagnitudeSpec,
    source: ColumnRef,
    config: &MatchConfig,
) -> BiasColumn {
    let cat = &catalogues[source.catalogue];
    let sentinel = cat.mag_sentinel();
    let all: Vec<f64> = cat
        .column_values(source.column)
        .into_iter()
        .map(|v| clean_magnitude(v, sentinel))
        .collect();

    let rows = candidates.rows_within(source.catalogue, config.mag_radius_arcsec);
    let matched: Vec<f64> = rows.iter().map(|&r| all[r]).collect();
    let num_close = candidates
        .rows
        .iter()
        .filter(|c| c.separation_max < config.mag_radius_arcsec)
        .count();
    info!(
        "Magnitude histogramming {}: {} candidates in magnitude radius, {} rows used ({} valid)",
        spec,
        num_close,
        matched.len(),
        matched.iter().filter(|v| v.is_finite()).count()
    );

    let (histogram, weight) = fit_weight(&all, &matched, config.histogram_edges);
    if weight.is_degenerate() {
        warn!("Magnitude fit for {} is degenerate, bias set to zero", spec);
    } else {
        debug!(
            "Magnitude weight for {}: {} bins, knots {:?}",
            spec,
            histogram.num_bins(),
            weight.knots().collect::<Vec<_>>()
        );
    }

    let candidate_mags: Vec<f64> = candidates
        .rows
        .iter()
        .map(|c| c.members[source.catalogue].map_or(f64::NAN, |r| all[r]))
        .collect();
    let values = weight.apply(&candidate_mags);

    BiasColumn {
        spec: spec.clone(),
        source,
        histogram,
        weight,
        values,
    }
}

/// Run the full association pipeline.
///
/// The first catalogue is the primary; candidates are grouped by its entry
/// identifiers when flagging.
pub fn run(catalogues: &[Catalogue], config: &MatchConfig) -> Result<MatchTable> {
    let sources = config.validate(catalogues)?;

    let densities = catalogues
        .iter()
        .map(|c| {
            let density = c.source_density()?;
            info!("Catalogue {}: {} entries, density {:e}", c.name(), c.len(), density);
            Ok(density)
        })
        .collect::<Result<Vec<f64>>>()?;
    let prior = compute_prior(&densities, config.prior_completeness)?;
    info!(
        "Prior: {:e} x {:.2}% / {:e} = {:e}",
        densities[0],
        config.prior_completeness * 100.0,
        densities.iter().product::<f64>(),
        prior
    );

    let candidates = match_catalogues(catalogues, config.radius_arcsec)?;
    let log_bf = evidence_stage(catalogues, &candidates)?;

    let biases: Vec<BiasColumn> = config
        .magnitudes
        .iter()
        .zip(sources)
        .map(|(spec, source)| magnitude_stage(catalogues, &candidates, spec, source, config))
        .collect();

    let bf_post = posteriors(prior, &log_bf, &[]);
    let bias_values: Vec<Vec<f64>> = biases.iter().map(|b| b.values.clone()).collect();
    let post = posteriors(prior, &log_bf, &bias_values);

    let primary = &catalogues[0];
    info!("Grouping candidates by {} identifiers", primary.name());
    let keys: Vec<&str> = candidates
        .rows
        .iter()
        .map(|c| primary.entries()[c.primary_row()].id.as_deref().unwrap_or_default())
        .collect();
    let flags = flag_candidates(&keys, &post, &config.flag_policy());

    let table = MatchTable {
        candidates,
        prior,
        log_bf,
        bf_post,
        biases,
        post,
        flags,
    };

    if config.min_prob > 0.0 {
        let pruned = table.prune(config.min_prob);
        info!(
            "Cutting away {} candidates with posterior below {}",
            table.len() - pruned.len(),
            config.min_prob
        );
        return Ok(pruned);
    }
    Ok(table)
}
