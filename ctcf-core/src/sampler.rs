//! The seam to the external inference engine.

pub mod cmdstan;

use indexmap::IndexMap;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::{io::{Read, Write}, path::Path};

use crate::error::{Error, Result};
use crate::feature::FeatureRow;
use crate::model::ModelVariant;
use crate::utils::{line_of, open_file_for_read, open_file_for_write, table_reader, table_writer};

/// Data block handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelData {
    #[serde(rename = "N")]
    pub n: usize,
    pub motif_score: Vec<f64>,
    pub chip_signal: Vec<f64>,
    pub y: Vec<u8>,
}

impl ModelData {
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        ModelData {
            n: rows.len(),
            motif_score: rows.iter().map(|x| x.motif_score).collect(),
            chip_signal: rows.iter().map(|x| x.chip_signal).collect(),
            y: rows.iter().map(|x| x.label).collect(),
        }
    }
}

/// Anything able to draw from the posterior of a model variant.
pub trait PosteriorSampler {
    /// Fit `model` to `data`. Intermediate files go to `workdir`.
    fn sample(&self, model: &ModelVariant, data: &ModelData, workdir: &Path) -> Result<PosteriorSamples>;
}

/// Posterior draws by parameter name. All parameters have the same number
/// of draws.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorSamples(IndexMap<String, Vec<f64>>);

impl PosteriorSamples {
    pub fn new() -> Self { Self::default() }

    pub fn insert<S: Into<String>>(&mut self, name: S, draws: Vec<f64>) -> Result<()> {
        if let Some(n) = self.num_draws() {
            if n != draws.len() {
                return Err(Error::InvalidArgument(format!(
                    "parameter has {} draws, expected {}", draws.len(), n
                )));
            }
        }
        self.0.insert(name.into(), draws);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.0.get(name).map(|x| x.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|x| x.as_str())
    }

    pub fn num_draws(&self) -> Option<usize> {
        self.0.values().next().map(|x| x.len())
    }

    /// Append the draws of another run, e.g. another chain.
    pub fn extend(&mut self, other: PosteriorSamples) -> Result<()> {
        if self.0.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.0.len() != other.0.len() || other.0.keys().any(|k| !self.0.contains_key(k)) {
            return Err(Error::InvalidArgument("cannot merge draws of different parameters".to_string()));
        }
        for (name, draws) in other.0 {
            if let Some(x) = self.0.get_mut(&name) {
                x.extend(draws);
            }
        }
        Ok(())
    }

    /// Arithmetic mean of the draws of `name`.
    pub fn mean(&self, name: &str) -> Option<f64> {
        self.get(name).filter(|x| !x.is_empty()).map(|x| x.iter().mean())
    }

    /// Sample standard deviation (n - 1 denominator) of the draws of `name`.
    pub fn sd(&self, name: &str) -> Option<f64> {
        self.get(name).filter(|x| !x.is_empty()).map(|x| x.iter().std_dev())
    }

    /// One column per parameter, one row per draw.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = table_writer(writer, b',');
        writer.write_record(self.0.keys())?;
        for i in 0..self.num_draws().unwrap_or(0) {
            writer.write_record(self.0.values().map(|x| x[i].to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read draws written by [`PosteriorSamples::write_csv`] or a Stan CSV
    /// output file. Columns ending in `__` are sampler diagnostics and are
    /// skipped.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = table_reader(reader, b',');
        let headers = reader.headers()?.clone();
        let columns: Vec<(usize, &str)> = headers.iter().enumerate()
            .filter(|(_, name)| !name.ends_with("__"))
            .collect();
        let mut draws: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
        for record in reader.records() {
            let record = record?;
            for ((i, name), x) in columns.iter().zip(draws.iter_mut()) {
                let raw = &record[*i];
                x.push(lexical::parse(raw).map_err(|_| Error::invalid_value(line_of(&record), *name, raw))?);
            }
        }
        let mut samples = PosteriorSamples::new();
        for ((_, name), x) in columns.into_iter().zip(draws) {
            samples.insert(name, x)?;
        }
        Ok(samples)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = open_file_for_write(path)?;
        self.write_csv(&mut writer)?;
        writer.finish()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_csv(open_file_for_read(path)?)
    }
}
