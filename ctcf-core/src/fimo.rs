//! Best motif score per scanned region from FIMO output.
//!
//! A FIMO table reports every motif match with its p-value. Matches are
//! grouped by region and each region keeps its most significant match,
//! reported as `motif_score = -log10(p-value)`.

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{io::{Read, Write}, path::Path};

use crate::bed::GenomicRange;
use crate::error::{Error, Result};
use crate::utils::{
    column_index, line_of, open_file_for_read, open_file_for_write, require_columns,
    table_reader, table_writer,
};

pub const REGION: &str = "region";
pub const SEQUENCE_NAME: &str = "sequence_name";
pub const START: &str = "start";
pub const STOP: &str = "stop";
pub const P_VALUE: &str = "p-value";
pub const MOTIF_SCORE: &str = "motif_score";

/// The best motif match of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotifScore {
    pub region: String,
    pub motif_score: f64,
}

/// How the region key of a row is obtained.
enum KeyColumns {
    Region(usize),
    Sequence { name: usize, start: Option<usize>, stop: Option<usize> },
}

impl KeyColumns {
    fn resolve(headers: &csv::StringRecord, source_name: &str) -> Result<(Self, usize)> {
        let name_col = if column_index(headers, REGION).is_some() { REGION } else { SEQUENCE_NAME };
        let idx = require_columns(headers, &[name_col, P_VALUE], source_name)?;
        let key = if name_col == REGION {
            KeyColumns::Region(idx[0])
        } else {
            KeyColumns::Sequence {
                name: idx[0],
                start: column_index(headers, START),
                stop: column_index(headers, STOP),
            }
        };
        Ok((key, idx[1]))
    }

    fn key(&self, record: &csv::StringRecord, source_name: &str) -> Result<String> {
        let line = line_of(record);
        match *self {
            KeyColumns::Region(i) => {
                let region = &record[i];
                region.parse::<GenomicRange>().map_err(|_| Error::MalformedRegion {
                    line, region: region.to_string(),
                })?;
                Ok(region.to_string())
            },
            KeyColumns::Sequence { name, start, stop } => {
                let name = &record[name];
                // Sequences extracted from a genome are named after their region;
                // match coordinates are then relative to that sequence.
                if name.parse::<GenomicRange>().is_ok() {
                    return Ok(name.to_string());
                }
                let (start, stop) = match (start, stop) {
                    (Some(a), Some(b)) => (a, b),
                    (a, b) => return Err(Error::missing(
                        source_name,
                        [(START, a), (STOP, b)].into_iter()
                            .filter(|(_, i)| i.is_none()).map(|(c, _)| c),
                    )),
                };
                let start: u64 = lexical::parse(&record[start])
                    .map_err(|_| Error::invalid_value(line, START, &record[start]))?;
                let stop: u64 = lexical::parse(&record[stop])
                    .map_err(|_| Error::invalid_value(line, STOP, &record[stop]))?;
                Ok(format!("{}:{}-{}", name, start, stop))
            },
        }
    }
}

/// Convert a p-value into a motif score.
pub fn motif_score(p_value: f64) -> f64 {
    // `+ 0.0` turns the -0.0 of p = 1 into 0.0
    -p_value.log10() + 0.0
}

/// Read a FIMO table and keep the best match of every region. The result is
/// sorted by region key. Ties keep the first row seen.
pub fn extract_motif_scores<R: Read>(reader: R, source_name: &str) -> Result<Vec<MotifScore>> {
    let mut reader = table_reader(reader, b'\t');
    let headers = reader.headers()?.clone();
    let (key_columns, p_col) = KeyColumns::resolve(&headers, source_name)?;

    let mut best: IndexMap<String, f64> = IndexMap::new();
    let mut n_rows = 0usize;
    for record in reader.records() {
        let record = record?;
        n_rows += 1;
        let key = key_columns.key(&record, source_name)?;
        let raw = &record[p_col];
        let p: f64 = lexical::parse(raw)
            .ok()
            .filter(|p: &f64| p.is_finite() && *p > 0.0 && *p <= 1.0)
            .ok_or_else(|| Error::invalid_value(line_of(&record), P_VALUE, raw))?;
        let score = motif_score(p);
        best.entry(key)
            .and_modify(|s| if score > *s { *s = score; })
            .or_insert(score);
    }
    debug!("{}: {} matches in {} regions", source_name, n_rows, best.len());

    let mut scores: Vec<MotifScore> = best.into_iter()
        .map(|(region, motif_score)| MotifScore { region, motif_score })
        .collect();
    scores.sort_by(|a, b| a.region.cmp(&b.region));
    Ok(scores)
}

pub fn write_motif_scores<W: Write>(writer: W, scores: &[MotifScore]) -> Result<()> {
    let mut writer = table_writer(writer, b'\t');
    for score in scores {
        writer.serialize(score)?;
    }
    if scores.is_empty() {
        writer.write_record([REGION, MOTIF_SCORE])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a `region`/`motif_score` table as written by [`write_motif_scores`].
pub fn read_motif_scores<R: Read>(reader: R, source_name: &str) -> Result<Vec<MotifScore>> {
    let mut reader = table_reader(reader, b'\t');
    let headers = reader.headers()?.clone();
    let idx = require_columns(&headers, &[REGION, MOTIF_SCORE], source_name)?;
    reader.records().map(|record| {
        let record = record?;
        let raw = &record[idx[1]];
        let motif_score = lexical::parse(raw)
            .map_err(|_| Error::invalid_value(line_of(&record), MOTIF_SCORE, raw))?;
        Ok(MotifScore { region: record[idx[0]].to_string(), motif_score })
    }).collect()
}

/// Extract the best score per region from a FIMO file and save it as a
/// two-column table. Nothing is written if the input fails validation.
pub fn process_fimo<P: AsRef<Path>, Q: AsRef<Path>>(fimo_path: P, output: Q) -> Result<usize> {
    let source_name = fimo_path.as_ref().display().to_string();
    let scores = extract_motif_scores(open_file_for_read(fimo_path.as_ref())?, &source_name)?;
    let mut writer = open_file_for_write(output.as_ref())?;
    write_motif_scores(&mut writer, &scores)?;
    writer.finish()?;
    info!("Saved best motif scores for {} regions to {}", scores.len(), output.as_ref().display());
    Ok(scores.len())
}
