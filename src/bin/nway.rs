//! nway CLI: multi-way association between astrometric catalogues.
//!
//! Example:
//!
//! ```text
//! nway --radius 10 --mag-radius 3 --prior-completeness 0.95 \
//!     --mag GOODS:mag_H --mag IRAC:mag_irac1 \
//!     --out out.csv cdfs4Ms.csv :Pos_error IRAC.csv 0.5 GOODS.csv 0.1
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nway::catalogs::load_catalogue_csv;
use nway::output::{write_match_table, Provenance};
use nway::{MagnitudeSpec, MatchConfig, PositionError};

#[derive(Debug, Parser)]
#[command(name = "nway")]
#[command(about = "Multi-way association between astrometric catalogues")]
#[command(version)]
struct Cli {
    /// Exclusive search radius in arcsec for initial matching.
    #[arg(long, default_value_t = 10.0)]
    radius: f64,

    /// Search radius in arcsec for magnitude histograms.
    #[arg(long, default_value_t = 3.0)]
    mag_radius: f64,

    /// Expected matching completeness of sources (prior).
    #[arg(long, default_value_t = 1.0)]
    prior_completeness: f64,

    /// <catalogue>:<column> used for magnitude biasing, e.g. GOODS:mag_H. Repeatable.
    #[arg(long = "mag")]
    mags: Vec<MagnitudeSpec>,

    /// Limit up to which secondary solutions are flagged.
    #[arg(long, default_value_t = 0.005)]
    acceptable_prob: f64,

    /// Lowest probability allowed in the final table; 0 disables trimming.
    #[arg(long, default_value_t = 0.0)]
    min_prob: f64,

    /// Output CSV file; provenance is written to <out>.meta.json.
    #[arg(long)]
    out: PathBuf,

    /// Catalogue files, each followed by its position error: a number in
    /// arcsec or :<column>. The first catalogue is the primary.
    #[arg(required = true, num_args = 4..)]
    catalogues: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if cli.catalogues.len() % 2 != 0 {
        bail!(
            "catalogues must be given as <file> <position error> pairs, got {} arguments",
            cli.catalogues.len()
        );
    }

    let mut inputs = Vec::new();
    let mut catalogues = Vec::new();
    for pair in cli.catalogues.chunks(2) {
        let (file, error) = (&pair[0], &pair[1]);
        let position_error: PositionError = error
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("position error for {file}"))?;
        catalogues.push(load_catalogue_csv(file, position_error)?);
        inputs.push(file.clone());
    }

    let config = MatchConfig {
        radius_arcsec: cli.radius,
        mag_radius_arcsec: cli.mag_radius,
        prior_completeness: cli.prior_completeness,
        magnitudes: cli.mags,
        acceptable_prob: cli.acceptable_prob,
        min_prob: cli.min_prob,
        ..Default::default()
    };

    let table = nway::run(&catalogues, &config)?;
    let provenance = Provenance::new(inputs, &catalogues, &table, &config);
    write_match_table(&cli.out, &catalogues, &table, &provenance)?;
    Ok(())
}
