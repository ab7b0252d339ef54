//! Join motif hits and ChIP signal onto fixed-width regions.

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io::{Read, Write}, path::{Path, PathBuf}, str::FromStr};

use crate::bed::{io::Reader, tree::BedTree, GenomicRange, NamedRegion, ParseError};
use crate::error::{Error, Result};
use crate::utils::{line_of, open_file_for_read, open_file_for_write, require_columns, table_reader, table_writer};

pub const FEATURE_COLUMNS: [&str; 4] = ["region", "motif_score", "chip_signal", "label"];

/// A motif match interval and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct MotifHit {
    pub range: GenomicRange,
    pub motif_score: f64,
}

/// One row of a `bigWigAverageOverBed` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub region: String,
    pub size: u64,
    pub covered: u64,
    pub sum: f64,
    /// Mean over covered bases.
    pub mean: f64,
    /// Mean over all bases, uncovered bases counting as zero.
    pub mean0: f64,
}

impl FromStr for SignalRecord {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn field<'a, I, T>(fields: &mut I, name: &'static str) -> Result<T, ParseError>
        where
            I: Iterator<Item = &'a str>,
            T: lexical::FromLexical,
        {
            let s = fields.next().ok_or(ParseError::MissingField(name))?;
            lexical::parse(s).map_err(|_| ParseError::InvalidField(name, s.to_string()))
        }

        let mut fields = s.split('\t');
        let region = fields.next().filter(|x| !x.is_empty())
            .ok_or(ParseError::MissingName)?.to_string();
        Ok(SignalRecord {
            region,
            size: field(&mut fields, "size")?,
            covered: field(&mut fields, "covered")?,
            sum: field(&mut fields, "sum")?,
            mean: field(&mut fields, "mean")?,
            mean0: field(&mut fields, "mean0")?,
        })
    }
}

/// A region with its best motif score and ChIP signal, before labelling.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFeature {
    pub region: String,
    pub motif_score: f64,
    pub chip_signal: f64,
}

/// A labelled example. `label` is 1 for bound sites and 0 for background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub region: String,
    pub motif_score: f64,
    pub chip_signal: f64,
    pub label: u8,
}

impl FeatureRow {
    pub fn from_feature(feature: RegionFeature, label: u8) -> Self {
        FeatureRow {
            region: feature.region,
            motif_score: feature.motif_score,
            chip_signal: feature.chip_signal,
            label,
        }
    }
}

/// Files describing one labelled set of regions.
#[derive(Debug, Clone)]
pub struct FeatureInputs {
    /// `region`/`motif_score` table produced from FIMO output.
    pub motif_scores: PathBuf,
    /// Headerless BED4: chrom, start, end, region_id.
    pub regions: PathBuf,
    /// Headerless 6-column signal table keyed by region_id.
    pub signal: PathBuf,
}

pub fn read_motif_hits<R: Read>(reader: R, source_name: &str) -> Result<Vec<MotifHit>> {
    let mut reader = table_reader(reader, b'\t');
    let headers = reader.headers()?.clone();
    let idx = require_columns(&headers, &["region", "motif_score"], source_name)?;
    reader.records().map(|record| {
        let record = record?;
        let line = line_of(&record);
        let region = &record[idx[0]];
        let range = region.parse().map_err(|_| Error::MalformedRegion {
            line, region: region.to_string(),
        })?;
        let raw = &record[idx[1]];
        let motif_score = lexical::parse(raw).ok()
            .filter(|x: &f64| x.is_finite())
            .ok_or_else(|| Error::invalid_value(line, "motif_score", raw))?;
        Ok(MotifHit { range, motif_score })
    }).collect()
}

pub fn read_regions<R: std::io::BufRead>(reader: R) -> Result<Vec<NamedRegion>> {
    Reader::new(reader).records().collect()
}

pub fn read_signal<R: std::io::BufRead>(reader: R) -> Result<Vec<SignalRecord>> {
    Reader::new(reader).records().collect()
}

/// For every region id with at least one overlapping hit, the highest score
/// among those hits. Keys follow the order of first appearance in `regions`.
pub fn best_hits<'a>(hits: &[MotifHit], regions: &'a [NamedRegion]) -> IndexMap<&'a str, f64> {
    let tree: BedTree<f64> = hits.iter().map(|h| (h.range.clone(), h.motif_score)).collect();
    let mut best: IndexMap<&str, f64> = IndexMap::new();
    for region in regions {
        let max = tree.find(region).map(|(_, score)| *score).fold(None, |acc: Option<f64>, x| {
            Some(acc.map_or(x, |a| a.max(x)))
        });
        if let Some(score) = max {
            best.entry(region.name.as_str())
                .and_modify(|s| if score > *s { *s = score; })
                .or_insert(score);
        }
    }
    best
}

/// Overlap hits with regions, keep the best hit of every region and inner
/// join with the signal table on region id. The output follows region file
/// order.
pub fn build_feature_table(
    hits: &[MotifHit],
    regions: &[NamedRegion],
    signal: &[SignalRecord],
) -> Vec<RegionFeature> {
    let best = best_hits(hits, regions);

    let mut signal_index: HashMap<&str, f64> = HashMap::with_capacity(signal.len());
    for rec in signal {
        signal_index.entry(rec.region.as_str()).or_insert(rec.mean0);
    }

    let features: Vec<RegionFeature> = best.iter().filter_map(|(region, score)|
        signal_index.get(region).map(|chip_signal| RegionFeature {
            region: region.to_string(),
            motif_score: *score,
            chip_signal: *chip_signal,
        })
    ).collect();

    let (without_hit, unmatched_signal) = unmatched(regions, &best, &signal_index);
    if without_hit > 0 {
        warn!("{} regions have no overlapping motif hit and were dropped", without_hit);
    }
    let without_signal = best.len() - features.len();
    if without_signal > 0 {
        warn!("{} regions with a motif hit have no signal entry and were dropped", without_signal);
    }
    if unmatched_signal > 0 {
        debug!("{} signal entries match no region with a motif hit", unmatched_signal);
    }
    features
}

/// Region ids without any overlapping hit, and signal ids matching no
/// region with a hit.
fn unmatched(
    regions: &[NamedRegion],
    best: &IndexMap<&str, f64>,
    signal_index: &HashMap<&str, f64>,
) -> (usize, usize) {
    let without_hit = regions.iter().map(|r| r.name.as_str()).unique()
        .filter(|id| !best.contains_key(id))
        .count();
    let unmatched_signal = signal_index.keys().filter(|id| !best.contains_key(*id)).count();
    (without_hit, unmatched_signal)
}

/// Load the three inputs of one labelled set and build its feature table.
pub fn build_from_files(inputs: &FeatureInputs) -> Result<Vec<RegionFeature>> {
    let hits = read_motif_hits(
        open_file_for_read(&inputs.motif_scores)?,
        &inputs.motif_scores.display().to_string(),
    )?;
    let regions = read_regions(open_file_for_read(&inputs.regions)?)?;
    let signal = read_signal(open_file_for_read(&inputs.signal)?)?;

    let features = build_feature_table(&hits, &regions, &signal);
    info!(
        "{}: {} motif hits, {} regions, {} signal rows -> {} features",
        inputs.regions.display(), hits.len(), regions.len(), signal.len(), features.len(),
    );
    Ok(features)
}

/// Tag positive rows with 1 and negative rows with 0, positives first.
pub fn label_and_concat(pos: Vec<RegionFeature>, neg: Vec<RegionFeature>) -> Vec<FeatureRow> {
    pos.into_iter().map(|x| FeatureRow::from_feature(x, 1))
        .chain(neg.into_iter().map(|x| FeatureRow::from_feature(x, 0)))
        .collect()
}

pub fn write_feature_table<W: Write>(writer: W, rows: &[FeatureRow]) -> Result<()> {
    let mut writer = table_writer(writer, b',');
    if rows.is_empty() {
        writer.write_record(FEATURE_COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_feature_table<R: Read>(reader: R, source_name: &str) -> Result<Vec<FeatureRow>> {
    let mut reader = table_reader(reader, b',');
    let headers = reader.headers()?.clone();
    let idx = require_columns(&headers, &FEATURE_COLUMNS, source_name)?;
    reader.records().map(|record| {
        let record = record?;
        let line = line_of(&record);
        let number = |i: usize, name: &str| -> Result<f64> {
            lexical::parse(&record[idx[i]])
                .map_err(|_| Error::invalid_value(line, name, &record[idx[i]]))
        };
        let label = match &record[idx[3]] {
            "0" => 0,
            "1" => 1,
            other => return Err(Error::invalid_value(line, "label", other)),
        };
        Ok(FeatureRow {
            region: record[idx[0]].to_string(),
            motif_score: number(1, "motif_score")?,
            chip_signal: number(2, "chip_signal")?,
            label,
        })
    }).collect()
}

pub fn save_feature_table<P: AsRef<Path>>(path: P, rows: &[FeatureRow]) -> Result<()> {
    let mut writer = open_file_for_write(path.as_ref())?;
    write_feature_table(&mut writer, rows)?;
    writer.finish()
}

pub fn load_feature_table<P: AsRef<Path>>(path: P) -> Result<Vec<FeatureRow>> {
    read_feature_table(open_file_for_read(path.as_ref())?, &path.as_ref().display().to_string())
}
