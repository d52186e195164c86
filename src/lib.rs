//! # nway
//!
//! Probabilistic **multi-way cross-identification** of astronomical source
//! catalogues.
//!
//! Given several catalogues of the same sky region, each with its own
//! positional uncertainty, `nway` proposes every combination of entries (at
//! most one per catalogue) that lie within a search radius of each other, and
//! computes the posterior probability that each combination is one physical
//! source. Per source of the primary (first) catalogue, the most likely
//! combination is flagged, along with plausible alternatives.
//!
//! ## Example
//!
//! ```no_run
//! use nway::{catalogs, MatchConfig, PositionError};
//!
//! let xray = catalogs::load_catalogue_csv("xray.csv", PositionError::Column("pos_err".into()))?;
//! let optical = catalogs::load_catalogue_csv("optical.csv", PositionError::Fixed(0.1))?;
//!
//! let config = MatchConfig {
//!     radius_arcsec: 10.0,
//!     mag_radius_arcsec: 3.0,
//!     magnitudes: vec!["optical:mag_r".parse()?],
//!     ..Default::default()
//! };
//! let table = nway::run(&[xray, optical], &config)?;
//! for (cand, post) in table.candidates.rows.iter().zip(&table.post) {
//!     println!("{:?} -> {post:.3}", cand.members);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Matching**: each secondary catalogue is indexed on an equal-area sky
//!    partition; every primary entry is cone-searched, and all combinations
//!    whose members are *pairwise* within the radius become candidates,
//!    including partial ones.
//! 2. **Evidence**: the multi-way Bayes factor of Budavári & Szalay (2008)
//!    from pairwise separations and position errors, in log10.
//! 3. **Magnitude weighting**: adaptive histograms of magnitudes of tight
//!    matches versus the whole catalogue give a learned log10 likelihood ratio.
//! 4. **Resolution**: the prior from source densities and completeness is
//!    combined with evidence and biases into posteriors, then each primary
//!    source's candidates are flagged best (1), secondary (2) or neither (0).

pub mod catalogs;
pub mod catalogue;
pub mod error;
pub mod evidence;
pub mod magnitude;
pub mod matcher;
pub mod output;
pub mod pipeline;
pub mod resolve;
pub mod skyindex;

pub use catalogue::{Catalogue, Entry, PositionError};
pub use error::MatchError;
pub use evidence::{log_bayes_factor, posterior_from_log_odds};
pub use magnitude::{fit_weight, AdaptiveHistogram, MagnitudeWeight};
pub use matcher::{match_catalogues, Candidate, Candidates};
pub use pipeline::{run, BiasColumn, MagnitudeSpec, MatchConfig, MatchTable};
pub use resolve::{FlagPolicy, MatchFlag};
pub use skyindex::SkyIndex;

/// Arcseconds per radian.
pub const ARCSEC_PER_RAD: f64 = 180.0 * 3600.0 / std::f64::consts::PI;

// Positions are handled as unit vectors in f64: separations of a few
// milliarcseconds are below f32 resolution.
pub type Vector3 = nalgebra::Vector3<f64>;
