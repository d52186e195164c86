//! CSV catalogue files.
//!
//! A catalogue file starts with `# KEY = value` header lines followed by a
//! regular CSV table:
//!
//! ```text
//! # SKYAREA = 0.11
//! # NAME = XMM
//! # UNDEFINED = -99
//! ID,RA,DEC,pos_err,mag_r
//! x1,53.1001,-27.8102,0.8,21.3
//! ```
//!
//! `SKYAREA` (square degrees) is required. `NAME` defaults to the file stem and
//! `UNDEFINED` to -99. The `RA` and `DEC` columns (degrees, any case) are
//! required, `ID` is optional; every other column is read as numbers, with
//! empty or unparseable cells stored as `NaN`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use tracing::info;

use crate::catalogue::{Catalogue, Entry, PositionError, DEFAULT_MAG_SENTINEL};

/// Parse `# KEY = value` lines preceding the table. Keys are upper-cased.
fn parse_header(data: &str) -> HashMap<String, String> {
    data.lines()
        .map(str::trim)
        .take_while(|line| line.starts_with('#') || line.is_empty())
        .filter_map(|line| {
            let (key, value) = line.trim_start_matches('#').split_once('=')?;
            Some((key.trim().to_uppercase(), value.trim().to_string()))
        })
        .collect()
}

/// Parse a catalogue from in-memory CSV text.
///
/// `default_name` is used when the header has no `NAME` entry.
pub fn parse_catalogue_csv(
    default_name: &str,
    data: &str,
    position_error: PositionError,
) -> anyhow::Result<Catalogue> {
    let header = parse_header(data);
    let name = header
        .get("NAME")
        .cloned()
        .unwrap_or_else(|| default_name.to_string());
    let sky_area: f64 = header
        .get("SKYAREA")
        .ok_or_else(|| {
            anyhow!(
                "catalogue {name} has no SKYAREA header, which should contain the area of the catalogue in square degrees"
            )
        })?
        .parse::<f64>()
        .with_context(|| format!("catalogue {name}: SKYAREA is not a number"))?;
    let sentinel = match header.get("UNDEFINED") {
        Some(v) => v
            .parse::<f64>()
            .with_context(|| format!("catalogue {name}: UNDEFINED is not a number"))?,
        None => DEFAULT_MAG_SENTINEL,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let headers = rdr
        .headers()
        .with_context(|| format!("catalogue {name}: cannot read column names"))?
        .clone();

    let find = |key: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(key));
    let ra_col = find("RA").ok_or_else(|| anyhow!("catalogue {name} has no RA column"))?;
    let dec_col = find("DEC").ok_or_else(|| anyhow!("catalogue {name} has no DEC column"))?;
    let id_col = find("ID");

    let value_cols: Vec<usize> = (0..headers.len())
        .filter(|&i| i != ra_col && i != dec_col && Some(i) != id_col)
        .collect();
    let columns: Vec<String> = value_cols.iter().map(|&i| headers[i].to_string()).collect();

    let entries = rdr
        .records()
        .enumerate()
        .map(|(row, record)| {
            let record = record.with_context(|| format!("catalogue {name}: bad row {row}"))?;
            let coord = |col: usize, what: &str| -> anyhow::Result<f64> {
                record
                    .get(col)
                    .unwrap_or("")
                    .parse::<f64>()
                    .with_context(|| format!("catalogue {name}: row {row} has invalid {what}"))
            };
            let ra = coord(ra_col, "RA")?;
            let dec = coord(dec_col, "DEC")?;
            if !(-90.0..=90.0).contains(&dec) {
                bail!("catalogue {name}: row {row} has DEC {dec} outside [-90, 90]");
            }
            let id = id_col
                .and_then(|c| record.get(c))
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let values = value_cols
                .iter()
                .map(|&c| record.get(c).unwrap_or("").parse::<f64>().unwrap_or(f64::NAN))
                .collect();
            Ok(Entry::new(id, ra, dec).with_values(values))
        })
        .collect::<anyhow::Result<Vec<Entry>>>()?;

    let catalogue = Catalogue::new(name, sky_area, columns, entries, position_error);
    Ok(catalogue.with_mag_sentinel(sentinel))
}

/// Load a catalogue from a CSV file, named by its `NAME` header or file stem.
pub fn load_catalogue_csv<P: AsRef<Path>>(
    path: P,
    position_error: PositionError,
) -> anyhow::Result<Catalogue> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read catalogue file {}", path.display()))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let catalogue = parse_catalogue_csv(&stem, &data, position_error)
        .with_context(|| format!("in file {}", path.display()))?;
    info!(
        "Loaded catalogue {} from {} ({} entries, {} deg^2)",
        catalogue.name(),
        path.display(),
        catalogue.len(),
        catalogue.sky_area_deg2()
    );
    Ok(catalogue)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# SKYAREA = 0.5\n# NAME = XMM\nID,RA,DEC,pos_err,mag\nx1,10.0,-5.0,0.8,21.3\nx2, 10.1 ,-5.1,,-99\n";

    #[test]
    fn parses_header_and_columns() {
        let cat = parse_catalogue_csv("fallback", SAMPLE, PositionError::Column("pos_err".into()))
            .unwrap();
        assert_eq!(cat.name(), "XMM");
        assert_eq!(cat.sky_area_deg2(), 0.5);
        assert_eq!(cat.columns(), &["pos_err".to_string(), "mag".to_string()]);
        assert_eq!(cat.len(), 2);

        let e = &cat.entries()[1];
        assert_eq!(e.id.as_deref(), Some("x2"));
        assert_eq!(e.ra_deg, 10.1);
        assert!(e.values[0].is_nan());
        assert_eq!(e.values[1], -99.0);
        assert_eq!(cat.mag_sentinel(), -99.0);
    }

    #[test]
    fn name_falls_back_and_ids_are_optional() {
        let data = "# skyarea = 2\nra,dec,m\n1,2,3\n";
        let cat = parse_catalogue_csv("opt", data, PositionError::Fixed(0.1)).unwrap();
        assert_eq!(cat.name(), "opt");
        assert!(cat.entries()[0].id.is_none());
        assert_eq!(cat.entries()[0].values, vec![3.0]);
    }

    #[test]
    fn missing_skyarea_is_an_error() {
        let err = parse_catalogue_csv("opt", "RA,DEC\n1,2\n", PositionError::Fixed(0.1))
            .unwrap_err();
        assert!(err.to_string().contains("SKYAREA"));
    }

    #[test]
    fn bad_coordinates_are_errors() {
        let data = "# SKYAREA = 1\nRA,DEC\n1,abc\n";
        assert!(parse_catalogue_csv("c", data, PositionError::Fixed(0.1)).is_err());
        let data = "# SKYAREA = 1\nRA,DEC\n1,95\n";
        assert!(parse_catalogue_csv("c", data, PositionError::Fixed(0.1)).is_err());
        let data = "# SKYAREA = 1\nX,DEC\n1,5\n";
        assert!(parse_catalogue_csv("c", data, PositionError::Fixed(0.1)).is_err());
    }
}
