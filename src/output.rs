//! Writing the final match table and its provenance record.
//!
//! The table is CSV with, in order: the identifier, position and value
//! columns of every catalogue (`<cat>_ID`, `<cat>_RA`, `<cat>_DEC`,
//! `<cat>_<col>`; empty where the catalogue is absent), one
//! `Separation_<b>_<a>` column per catalogue pair, `Separation_max`, `bf`,
//! `bfpost`, one `bias_<cat>_<col>` column per magnitude spec (as a linear
//! likelihood ratio), `post` and `match_flag`.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use crate::catalogue::Catalogue;
use crate::pipeline::{MatchConfig, MatchTable};

/// Run metadata written next to the table.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub method: String,
    pub inputs: Vec<String>,
    pub tables: Vec<String>,
    pub biasing: Vec<String>,
    pub prior: f64,
    pub rows: usize,
    pub config: MatchConfig,
}

impl Provenance {
    pub fn new(
        inputs: Vec<String>,
        catalogues: &[Catalogue],
        table: &MatchTable,
        config: &MatchConfig,
    ) -> Self {
        Self {
            method: "multi-way matching".to_string(),
            inputs,
            tables: catalogues.iter().map(|c| c.name().to_string()).collect(),
            biasing: table.biases.iter().map(|b| b.name()).collect(),
            prior: table.prior,
            rows: table.len(),
            config: config.clone(),
        }
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Column names of the output table.
pub fn table_header(catalogues: &[Catalogue], table: &MatchTable) -> Vec<String> {
    let mut header = Vec::new();
    for cat in catalogues {
        let name = cat.name();
        header.push(format!("{name}_ID"));
        header.push(format!("{name}_RA"));
        header.push(format!("{name}_DEC"));
        header.extend(cat.columns().iter().map(|col| format!("{name}_{col}")));
    }
    for i in 0..catalogues.len() {
        for j in (i + 1)..catalogues.len() {
            header.push(format!(
                "Separation_{}_{}",
                catalogues[j].name(),
                catalogues[i].name()
            ));
        }
    }
    header.push("Separation_max".to_string());
    header.push("bf".to_string());
    header.push("bfpost".to_string());
    header.extend(table.biases.iter().map(|b| b.name()));
    header.push("post".to_string());
    header.push("match_flag".to_string());
    header
}

/// Write the table as CSV to any writer.
pub fn write_match_table_to<W: Write>(
    writer: W,
    catalogues: &[Catalogue],
    table: &MatchTable,
) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table_header(catalogues, table))?;

    for (r, cand) in table.candidates.rows.iter().enumerate() {
        let mut record: Vec<String> = Vec::new();
        for (cat, member) in catalogues.iter().zip(&cand.members) {
            match member {
                Some(row) => {
                    let entry = &cat.entries()[*row];
                    record.push(entry.id.clone().unwrap_or_else(|| row.to_string()));
                    record.push(entry.ra_deg.to_string());
                    record.push(entry.dec_deg.to_string());
                    record.extend(entry.values.iter().map(|&v| format_value(v)));
                }
                None => {
                    record.extend(std::iter::repeat(String::new()).take(3 + cat.columns().len()));
                }
            }
        }
        record.extend(cand.separations.iter().map(|&s| format_value(s)));
        record.push(format_value(cand.separation_max));
        record.push(format_value(table.log_bf[r]));
        record.push(format_value(table.bf_post[r]));
        record.extend(table.biases.iter().map(|b| format_value(10f64.powf(b.values[r]))));
        record.push(format_value(table.post[r]));
        record.push(table.flags[r].code().to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the table to `path` and the provenance to `<path>.meta.json`.
pub fn write_match_table<P: AsRef<Path>>(
    path: P,
    catalogues: &[Catalogue],
    table: &MatchTable,
    provenance: &Provenance,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create output file {}", path.display()))?;
    write_match_table_to(std::io::BufWriter::new(file), catalogues, table)
        .with_context(|| format!("failed writing {}", path.display()))?;

    let meta_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.meta.json", ext.to_string_lossy()),
        None => "meta.json".to_string(),
    });
    let json = serde_json::to_string_pretty(provenance)?;
    std::fs::write(&meta_path, json)
        .with_context(|| format!("cannot write provenance {}", meta_path.display()))?;

    info!(
        "Wrote {} ({} rows, {} columns)",
        path.display(),
        table.len(),
        table_header(catalogues, table).len()
    );
    Ok(())
}
