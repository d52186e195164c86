//! Integration tests: run the full association pipeline on small hand-built
//! catalogues and on synthetic fields with known true counterparts.

use std::collections::HashMap;

use nway::catalogs::load_catalogue_csv;
use nway::output::{write_match_table, Provenance};
use nway::{Catalogue, Entry, MatchConfig, MatchFlag, PositionError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const ARCSEC_DEG: f64 = 1.0 / 3600.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn catalogue(name: &str, sigma: f64, positions: &[(f64, f64)]) -> Catalogue {
    let entries = positions
        .iter()
        .enumerate()
        .map(|(i, &(ra, dec))| Entry::new(Some(format!("{name}{i}")), ra, dec))
        .collect();
    Catalogue::new(name, 1.0, vec![], entries, PositionError::Fixed(sigma))
}

#[test]
fn close_pair_is_a_confident_match() {
    init_tracing();
    let a = catalogue("A", 0.5, &[(0.0, 0.0)]);
    let b = catalogue("B", 0.3, &[(0.0, 0.2 * ARCSEC_DEG)]);

    let table = nway::run(&[a, b], &MatchConfig::default()).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.log_bf[0] > 0.0, "log_bf = {}", table.log_bf[0]);
    assert!(table.post[0] > 0.5, "post = {}", table.post[0]);
    assert_eq!(table.post[0], table.bf_post[0]);
    assert_eq!(table.flags[0], MatchFlag::Best);
}

#[test]
fn pair_at_edge_of_radius_is_admitted_but_rejected() {
    init_tracing();
    let a = catalogue("A", 0.5, &[(0.0, 0.0)]);
    let b = catalogue("B", 0.3, &[(0.0, 9.9 * ARCSEC_DEG)]);

    let table = nway::run(&[a, b], &MatchConfig::default()).unwrap();
    assert_eq!(table.len(), 1);
    assert!((table.candidates.rows[0].separation_max - 9.9).abs() < 1e-6);
    assert!(table.log_bf[0] < 0.0);
    assert!(table.post[0] < 1e-6, "post = {}", table.post[0]);
}

#[test]
fn chained_triple_yields_only_pairs() {
    init_tracing();
    let a = catalogue("A", 0.5, &[(120.0, -30.0)]);
    let b = catalogue("B", 0.5, &[(120.0, -30.0 + 7.0 * ARCSEC_DEG)]);
    let c = catalogue("C", 0.5, &[(120.0, -30.0 - 7.0 * ARCSEC_DEG)]);

    let table = nway::run(&[a, b, c], &MatchConfig::default()).unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.candidates.rows.iter().all(|c| c.num_present() == 2));

    // separations differ by rounding only; just the larger posterior is best
    let best = table.post[0].max(table.post[1]);
    for r in 0..2 {
        let expected = if table.post[r] == best {
            MatchFlag::Best
        } else {
            MatchFlag::Rejected
        };
        assert!(table.post[r] <= 0.1);
        assert_eq!(table.flags[r], expected);
    }
    assert_eq!(table.flags.iter().filter(|&&f| f == MatchFlag::Best).count(), 1);
}

#[test]
fn mirrored_pairs_tie_as_best() {
    init_tracing();
    // +-7 arcsec in RA about RA 0 on the equator gives bit-identical separations
    let a = catalogue("A", 0.5, &[(0.0, 0.0)]);
    let b = catalogue("B", 0.5, &[(7.0 * ARCSEC_DEG, 0.0)]);
    let c = catalogue("C", 0.5, &[(-7.0 * ARCSEC_DEG, 0.0)]);

    let table = nway::run(&[a, b, c], &MatchConfig::default()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.post[0], table.post[1]);
    assert!(table.flags.iter().all(|&f| f == MatchFlag::Best));
}

#[test]
fn csv_round_trip_through_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let xray = dir.path().join("xray.csv");
    let optical = dir.path().join("optical.csv");
    std::fs::write(
        &xray,
        "# SKYAREA = 0.01\nID,RA,DEC,pos_err\nX1,150.0,2.0,0.8\nX2,150.02,2.02,1.2\n",
    )
    .unwrap();
    std::fs::write(
        &optical,
        "# SKYAREA = 0.01\n# NAME = OPT\nRA,DEC,mag\n150.0,2.0001,21.0\n150.0002,2.0,23.5\n150.2,2.2,-99\n",
    )
    .unwrap();

    let cats = vec![
        load_catalogue_csv(&xray, PositionError::Column("pos_err".into())).unwrap(),
        load_catalogue_csv(&optical, PositionError::Fixed(0.1)).unwrap(),
    ];
    assert_eq!(cats[0].name(), "xray");
    assert_eq!(cats[1].name(), "OPT");

    let config = MatchConfig {
        magnitudes: vec!["OPT:mag".parse().unwrap()],
        ..Default::default()
    };
    let table = nway::run(&cats, &config).unwrap();
    assert_eq!(table.len(), 2);

    let out = dir.path().join("out.csv");
    let provenance = Provenance::new(
        vec![xray.display().to_string(), optical.display().to_string()],
        &cats,
        &table,
        &config,
    );
    write_match_table(&out, &cats, &table, &provenance).unwrap();

    let mut rdr = csv::Reader::from_path(&out).unwrap();
    let header: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(
        header,
        vec![
            "xray_ID",
            "xray_RA",
            "xray_DEC",
            "xray_pos_err",
            "OPT_ID",
            "OPT_RA",
            "OPT_DEC",
            "OPT_mag",
            "Separation_OPT_xray",
            "Separation_max",
            "bf",
            "bfpost",
            "bias_OPT_mag",
            "post",
            "match_flag",
        ]
    );
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(&row[0], "X1");
        let flag: u8 = row[14].parse().unwrap();
        assert!(flag <= 2);
        let bias: f64 = row[12].parse().unwrap();
        assert!(bias > 0.0);
    }
    let flags: Vec<&str> = rows.iter().map(|r| r.get(14).unwrap()).collect();
    assert!(flags.contains(&"1"));

    let meta = std::fs::read_to_string(dir.path().join("out.csv.meta.json")).unwrap();
    let meta: serde_json::Value = serde_json::from_str(&meta).unwrap();
    assert_eq!(meta["tables"], serde_json::json!(["xray", "OPT"]));
    assert_eq!(meta["biasing"], serde_json::json!(["bias_OPT_mag"]));
    assert_eq!(meta["config"]["radius_arcsec"], serde_json::json!(10.0));
}

/// Synthetic field: primary sources with true counterparts scattered by the
/// position errors, plus unrelated faint field sources in the secondary catalogue.
struct SyntheticField {
    catalogues: Vec<Catalogue>,
    /// Row of the true counterpart in catalogue B for each primary row.
    truth: Vec<usize>,
}

fn synthetic_field(seed: u64, n_sources: usize, n_field: usize) -> SyntheticField {
    let mut rng = StdRng::seed_from_u64(seed);
    let (ra0, dec0, size) = (150.0, 2.0, 0.1);
    let sigma_a = 0.5;
    let sigma_b = 0.3;
    let offset_a = Normal::new(0.0, sigma_a * ARCSEC_DEG).unwrap();
    let offset_b = Normal::new(0.0, sigma_b * ARCSEC_DEG).unwrap();
    let bright = Normal::new(19.0, 1.0).unwrap();
    let faint = Normal::new(23.5, 1.0).unwrap();
    let cos_dec = f64::to_radians(dec0).cos();

    let mut a_entries = Vec::new();
    let mut b_entries = Vec::new();
    let mut truth = Vec::new();
    for i in 0..n_sources {
        let ra = ra0 + rng.gen_range(0.0..size);
        let dec = dec0 + rng.gen_range(0.0..size);
        a_entries.push(Entry::new(
            Some(format!("src{i}")),
            ra + offset_a.sample(&mut rng) / cos_dec,
            dec + offset_a.sample(&mut rng),
        ));
        truth.push(b_entries.len());
        b_entries.push(
            Entry::new(
                None,
                ra + offset_b.sample(&mut rng) / cos_dec,
                dec + offset_b.sample(&mut rng),
            )
            .with_values(vec![bright.sample(&mut rng)]),
        );
    }
    for _ in 0..n_field {
        let mag = if rng.gen_bool(0.05) { -99.0 } else { faint.sample(&mut rng) };
        b_entries.push(
            Entry::new(
                None,
                ra0 + rng.gen_range(0.0..size),
                dec0 + rng.gen_range(0.0..size),
            )
            .with_values(vec![mag]),
        );
    }

    let area = size * size * cos_dec;
    let a = Catalogue::new("A", area, vec![], a_entries, PositionError::Fixed(sigma_a));
    let b = Catalogue::new(
        "B",
        area,
        vec!["mag".into()],
        b_entries,
        PositionError::Fixed(sigma_b),
    );
    SyntheticField {
        catalogues: vec![a, b],
        truth,
    }
}

#[test]
fn synthetic_field_recovers_true_counterparts() {
    init_tracing();
    let field = synthetic_field(42, 300, 600);
    let table = nway::run(&field.catalogues, &MatchConfig::default()).unwrap();

    let mut best_hits = 0;
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (r, cand) in table.candidates.rows.iter().enumerate() {
        assert!(cand.separation_max < 10.0);
        groups.entry(cand.primary_row()).or_default().push(r);
        if table.flags[r] == MatchFlag::Secondary {
            assert!(table.post[r] > 0.1);
        }
    }
    for (&primary, rows) in &groups {
        let best = rows.iter().map(|&r| table.post[r]).fold(f64::NEG_INFINITY, f64::max);
        for &r in rows {
            assert_eq!(table.flags[r] == MatchFlag::Best, table.post[r] == best);
        }
        let truth = field.truth[primary];
        let found = rows.iter().any(|&r| {
            table.flags[r] == MatchFlag::Best && table.candidates.rows[r].members[1] == Some(truth)
        });
        if found {
            best_hits += 1;
        }
    }
    let n = field.truth.len();
    assert!(best_hits as f64 >= 0.9 * n as f64, "recovered {best_hits} of {n}");
}

#[test]
fn magnitude_bias_favours_bright_counterparts() {
    init_tracing();
    let field = synthetic_field(7, 300, 1500);
    let config = MatchConfig {
        magnitudes: vec!["B:mag".parse().unwrap()],
        ..Default::default()
    };
    let table = nway::run(&field.catalogues, &config).unwrap();
    let bias = &table.biases[0];
    assert!(!bias.weight.is_degenerate());
    assert!(bias.values.iter().all(|v| v.is_finite()));

    let (mut true_bias, mut n_true) = (0.0, 0);
    let (mut false_bias, mut n_false) = (0.0, 0);
    for (r, cand) in table.candidates.rows.iter().enumerate() {
        let Some(b_row) = cand.members[1] else { continue };
        if field.truth[cand.primary_row()] == b_row {
            true_bias += bias.values[r];
            n_true += 1;
        } else {
            false_bias += bias.values[r];
            n_false += 1;
        }
    }
    assert!(n_true > 0 && n_false > 0);
    assert!(true_bias / n_true as f64 > 0.0);
    assert!(true_bias / n_true as f64 > false_bias / n_false as f64);

    // rerunning yields identical derived columns
    let again = nway::run(&field.catalogues, &config).unwrap();
    assert_eq!(again.post, table.post);
    assert_eq!(again.flags, table.flags);
}
