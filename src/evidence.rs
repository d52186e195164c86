//! Positional evidence for multi-way associations.
//!
//! The Bayes factor compares the hypothesis that all present entries are
//! noisy observations of one source against the hypothesis that they are
//! unrelated. With precisions `w_i = 1/σ_i²` and `W = Σ w_i`, marginalising
//! the unknown true position gives (Budavári & Szalay 2008, eq. 18)
//!
//! ```text
//! B = 2^(k-1) · Π w_i / W · exp(−Σ_{i<j} w_i w_j ψ_ij² / 2W)
//! ```
//!
//! with `w_i` in radians⁻². Inputs here are in arcsec, and every quantity is
//! reported as a base-10 logarithm so positional evidence and magnitude biases
//! add directly.

use std::f64::consts::{LN_10, LN_2};

use crate::matcher::pair_index;
use crate::ARCSEC_PER_RAD;

/// log10 Bayes factor for one candidate.
///
/// `errors[i]` is the 1-sigma position error (arcsec) of catalogue `i`, or
/// `None` where the catalogue is absent. `separations` holds arcsec
/// separations in [`pair_index`] order; entries of absent pairs are ignored.
///
/// Errors must be positive and finite; validation happens where they are read.
/// Fewer than two present catalogues give `NaN`.
pub fn log_bayes_factor(separations: &[f64], errors: &[Option<f64>]) -> f64 {
    let k_total = errors.len();
    let weights: Vec<(usize, f64)> = errors
        .iter()
        .enumerate()
        .filter_map(|(i, sigma)| sigma.map(|s| (i, 1.0 / (s * s))))
        .collect();
    let k = weights.len();
    if k < 2 {
        return f64::NAN;
    }

    let wsum: f64 = weights.iter().map(|(_, w)| w).sum();
    let log_w: f64 = weights.iter().map(|(_, w)| w.ln()).sum();

    let mut q = 0.0;
    for (a, &(i, wi)) in weights.iter().enumerate() {
        for &(j, wj) in &weights[a + 1..] {
            let d = separations[pair_index(k_total, i, j)];
            q += wi * wj * d * d;
        }
    }

    let km1 = (k - 1) as f64;
    let norm = km1 * LN_2 + 2.0 * km1 * ARCSEC_PER_RAD.ln();
    let ln_bf = norm + log_w - wsum.ln() - q / (2.0 * wsum);
    ln_bf / LN_10
}

/// Posterior probability of association from a prior probability and a
/// log10 likelihood ratio `total`:
/// `1 / (1 + (1 − prior)/prior · 10^(−total))`.
///
/// Evaluated through the log-odds so it never overflows; results saturate
/// inside the open interval (0, 1). `prior` must lie in (0, 1).
pub fn posterior_from_log_odds(prior: f64, total: f64) -> f64 {
    let log_odds = (prior / (1.0 - prior)).log10() + total;
    let p = if log_odds >= 0.0 {
        1.0 / (1.0 + 10f64.powf(-log_odds))
    } else {
        let odds = 10f64.powf(log_odds);
        odds / (1.0 + odds)
    };
    p.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON / 2.0)
}
