//! Posterior resolution: prior odds, posterior probabilities and flagging of
//! the best and plausible secondary candidates per primary source.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::evidence::posterior_from_log_odds;

/// Default absolute posterior floor for secondary solutions.
pub const DEFAULT_SECONDARY_FLOOR: f64 = 0.1;

/// Classification of a candidate within its primary-source group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFlag {
    /// Neither the best nor a plausible alternative.
    Rejected,
    /// Highest posterior in the group (all ties included).
    Best,
    /// Close enough to the best to be a plausible alternative.
    Secondary,
}

impl MatchFlag {
    /// Numeric code written to output tables: 0, 1 or 2.
    pub fn code(self) -> u8 {
        match self {
            MatchFlag::Rejected => 0,
            MatchFlag::Best => 1,
            MatchFlag::Secondary => 2,
        }
    }
}

/// Prior probability of a true association:
/// `density(primary) × completeness / Π density(i)`.
///
/// Densities are full-sky-normalised source counts. The result must fall in
/// (0, 1) for the posterior to be defined.
pub fn compute_prior(densities: &[f64], completeness: f64) -> Result<f64> {
    if !(completeness > 0.0 && completeness <= 1.0) {
        return Err(MatchError::InvalidCompleteness(completeness));
    }
    let Some(&primary) = densities.first() else {
        return Err(MatchError::TooFewCatalogues(0));
    };
    // divide one factor at a time; the full product can overflow for many catalogues
    let prior = densities
        .iter()
        .fold(primary * completeness, |acc, &d| acc / d);
    if prior.is_finite() && prior > 0.0 && prior < 1.0 {
        Ok(prior)
    } else {
        Err(MatchError::InvalidPrior(prior))
    }
}

/// Posterior per candidate from the log10 Bayes factor plus the sum of
/// log10 magnitude biases. Pass no bias columns for the positional-only posterior.
pub fn posteriors(prior: f64, log_bf: &[f64], biases: &[Vec<f64>]) -> Vec<f64> {
    log_bf
        .iter()
        .enumerate()
        .map(|(row, &bf)| {
            let total = bf + biases.iter().map(|b| b[row]).sum::<f64>();
            posterior_from_log_odds(prior, total)
        })
        .collect()
}

/// Thresholds for flagging secondary solutions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagPolicy {
    /// Maximum posterior gap to the best for a secondary solution.
    pub acceptable_prob: f64,
    /// Secondary solutions need a posterior strictly above this.
    pub secondary_floor: f64,
}

impl Default for FlagPolicy {
    fn default() -> Self {
        Self {
            acceptable_prob: 0.005,
            secondary_floor: DEFAULT_SECONDARY_FLOOR,
        }
    }
}

/// Flag candidates grouped by primary key.
///
/// Within each group the candidates reaching the maximal posterior are
/// [`MatchFlag::Best`]; others with `best − post < acceptable_prob` and
/// `post > secondary_floor` are [`MatchFlag::Secondary`].
pub fn flag_candidates<K: Eq + Hash>(
    keys: &[K],
    posterior: &[f64],
    policy: &FlagPolicy,
) -> Vec<MatchFlag> {
    let mut groups: HashMap<&K, Vec<usize>> = HashMap::new();
    for (row, key) in keys.iter().enumerate() {
        groups.entry(key).or_default().push(row);
    }

    let mut flags = vec![MatchFlag::Rejected; posterior.len()];
    for rows in groups.values() {
        let best = rows
            .iter()
            .map(|&r| posterior[r])
            .fold(f64::NEG_INFINITY, f64::max);
        for &r in rows {
            let post = posterior[r];
            flags[r] = if post == best {
                MatchFlag::Best
            } else if best - post < policy.acceptable_prob && post > policy.secondary_floor {
                MatchFlag::Secondary
            } else {
                MatchFlag::Rejected
            };
        }
    }
    flags
}

/// Rows to keep when pruning at `min_prob`: those with `post >= min_prob`.
/// A threshold of 0 keeps everything.
pub fn retained_rows(posterior: &[f64], min_prob: f64) -> Vec<usize> {
    posterior
        .iter()
        .enumerate()
        .filter(|(_, &p)| min_prob <= 0.0 || p >= min_prob)
        .map(|(r, _)| r)
        .collect()
}
