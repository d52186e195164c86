//! Empirical magnitude weighting.
//!
//! True counterparts often have a different magnitude distribution than the
//! field population. Comparing the magnitudes of entries found in tight
//! matches (`matched`) against the whole catalogue (`all`) gives a
//! log-likelihood ratio as a function of magnitude, which biases the posterior.
//!
//! Fitting and applying are separate steps: [`fit_weight`] learns a
//! [`MagnitudeWeight`] once, and [`MagnitudeWeight::apply`] evaluates it for
//! any number of candidates.

/// Default number of bin edge points for [`AdaptiveHistogram::build`].
pub const DEFAULT_HISTOGRAM_EDGES: usize = 15;

/// Replace the catalogue's undefined-magnitude sentinel and non-finite values with `NaN`.
pub fn clean_magnitude(value: f64, sentinel: f64) -> f64 {
    if !value.is_finite() || value == sentinel {
        f64::NAN
    } else {
        value
    }
}

/// Normalised histograms of matched and all magnitudes on shared bins whose
/// interior edges follow the quantiles of the matched sample.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveHistogram {
    /// Strictly increasing bin edges; empty when either sample is empty.
    pub edges: Vec<f64>,
    /// Probability density of the matched sample per bin.
    pub matched: Vec<f64>,
    /// Probability density of the full sample per bin.
    pub all: Vec<f64>,
}

impl AdaptiveHistogram {
    /// Build histograms from finite values. Non-finite values are skipped.
    ///
    /// `n_edges` edge points are placed at evenly spaced quantiles of the
    /// matched values; the outermost two are then widened to the full range of
    /// both samples, and coincident edges collapse into one.
    pub fn build(all: &[f64], matched: &[f64], n_edges: usize) -> Self {
        let mut sorted_all: Vec<f64> = all.iter().copied().filter(|v| v.is_finite()).collect();
        let mut sorted_sel: Vec<f64> = matched.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted_all.is_empty() || sorted_sel.is_empty() {
            return Self {
                edges: Vec::new(),
                matched: Vec::new(),
                all: Vec::new(),
            };
        }
        sorted_all.sort_by(f64::total_cmp);
        sorted_sel.sort_by(f64::total_cmp);

        let n_edges = n_edges.max(2);
        let lo = sorted_all[0].min(sorted_sel[0]);
        let hi = sorted_all[sorted_all.len() - 1].max(sorted_sel[sorted_sel.len() - 1]);

        let mut edges = Vec::with_capacity(n_edges);
        edges.push(lo);
        for i in 1..n_edges - 1 {
            let q = quantile(&sorted_sel, i as f64 / (n_edges - 1) as f64);
            if q > edges[edges.len() - 1] && q < hi {
                edges.push(q);
            }
        }
        if hi > lo {
            edges.push(hi);
        } else {
            // a single distinct value: one unit-width bin around it
            edges = vec![lo - 0.5, hi + 0.5];
        }

        let matched = density_histogram(&edges, &sorted_sel);
        let all = density_histogram(&edges, &sorted_all);
        Self {
            edges,
            matched,
            all,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }
}

/// Linear-interpolated quantile of sorted values, `q` in [0, 1].
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let frac = pos - i as f64;
    if i + 1 < sorted.len() {
        sorted[i] + frac * (sorted[i + 1] - sorted[i])
    } else {
        sorted[i]
    }
}

/// Densities normalised so that `Σ density · width = 1`.
/// The last bin is closed on the right.
fn density_histogram(edges: &[f64], values: &[f64]) -> Vec<f64> {
    let nbins = edges.len() - 1;
    let mut counts = vec![0usize; nbins];
    for &v in values {
        if v < edges[0] || v > edges[nbins] {
            continue;
        }
        let bin = edges.partition_point(|&e| e <= v).saturating_sub(1).min(nbins - 1);
        counts[bin] += 1;
    }
    let total = values.len() as f64;
    counts
        .iter()
        .zip(edges.windows(2))
        .map(|(&c, w)| c as f64 / (total * (w[1] - w[0])))
        .collect()
}

/// Piecewise-linear log10 likelihood ratio of "true counterpart" versus
/// "field source" as a function of magnitude.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MagnitudeWeight {
    knots_x: Vec<f64>,
    knots_y: Vec<f64>,
}

impl MagnitudeWeight {
    /// Fit to the bin-wise `log10(matched / all)` at bin midpoints.
    ///
    /// Bins where either density is zero carry no finite ratio and are
    /// skipped, so the interpolation bridges them from their neighbours.
    pub fn fit(hist: &AdaptiveHistogram) -> Self {
        let mut knots_x = Vec::new();
        let mut knots_y = Vec::new();
        for (i, w) in hist.edges.windows(2).enumerate() {
            let ratio = (hist.matched[i] / hist.all[i]).log10();
            if ratio.is_finite() {
                knots_x.push(0.5 * (w[0] + w[1]));
                knots_y.push(ratio);
            }
        }
        Self { knots_x, knots_y }
    }

    /// `true` when no bin produced a usable ratio; the weight is then zero everywhere.
    pub fn is_degenerate(&self) -> bool {
        self.knots_x.is_empty()
    }

    /// Knots of the fitted function as `(magnitude, log10 ratio)` pairs.
    pub fn knots(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.knots_x.iter().copied().zip(self.knots_y.iter().copied())
    }

    /// log10 bias for one magnitude. Undefined magnitudes carry no information
    /// and map to 0; values outside the knots are clamped to the end values.
    pub fn evaluate(&self, mag: f64) -> f64 {
        if !mag.is_finite() || self.is_degenerate() {
            return 0.0;
        }
        let n = self.knots_x.len();
        if mag <= self.knots_x[0] {
            return self.knots_y[0];
        }
        if mag >= self.knots_x[n - 1] {
            return self.knots_y[n - 1];
        }
        let hi = self.knots_x.partition_point(|&x| x <= mag);
        let (x0, x1) = (self.knots_x[hi - 1], self.knots_x[hi]);
        let (y0, y1) = (self.knots_y[hi - 1], self.knots_y[hi]);
        y0 + (mag - x0) / (x1 - x0) * (y1 - y0)
    }

    /// Evaluate for every value.
    pub fn apply(&self, mags: &[f64]) -> Vec<f64> {
        mags.iter().map(|&m| self.evaluate(m)).collect()
    }
}

/// Learn a magnitude weight from all catalogue magnitudes and the
/// magnitudes of likely true matches. Inputs should already be cleaned
/// with [`clean_magnitude`].
pub fn fit_weight(
    all: &[f64],
    matched: &[f64],
    n_edges: usize,
) -> (AdaptiveHistogram, MagnitudeWeight) {
    let hist = AdaptiveHistogram::build(all, matched, n_edges);
    let weight = MagnitudeWeight::fit(&hist);
    (hist, weight)
}
