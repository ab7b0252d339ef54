//! Fit several model variants to one dataset and compare their posteriors.

use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::feature::FeatureRow;
use crate::model::{ModelVariant, PARAMETERS};
use crate::posterior::{posterior_predictions, save_predictions, IndeterminatePolicy, PosteriorMeans};
use crate::sampler::{ModelData, PosteriorSampler, PosteriorSamples};
use crate::utils::{open_file_for_write, table_writer};

pub const POSTERIOR_DRAWS: &str = "posterior_draws.csv";
pub const POSTERIOR_PREDICTIONS: &str = "posterior_predictions.csv";
pub const SUMMARY: &str = "summary.csv";

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub version: String,
    pub param: String,
    pub mean: f64,
    pub sd: f64,
}

fn summarize(variant: &str, samples: &PosteriorSamples) -> Vec<SummaryRow> {
    PARAMETERS.iter().filter_map(|param| Some(SummaryRow {
        version: variant.to_string(),
        param: param.to_string(),
        mean: samples.mean(param)?,
        sd: samples.sd(param)?,
    })).collect()
}

/// Fit every variant in turn. Each variant gets its own directory under
/// `out_dir` with its draws and predictions; the parameter summaries of all
/// variants go to `out_dir/summary.csv`. The first failure aborts the run.
pub fn fit_variants<S, P>(
    sampler: &S,
    variants: &[ModelVariant],
    rows: &[FeatureRow],
    out_dir: P,
    policy: IndeterminatePolicy,
) -> Result<Vec<SummaryRow>>
where
    S: PosteriorSampler + ?Sized,
    P: AsRef<Path>,
{
    let out_dir = out_dir.as_ref();
    let data = ModelData::from_rows(rows);
    let mut summary = Vec::new();
    for variant in variants {
        variant.validate()?;
        let workdir = out_dir.join(&variant.name);
        std::fs::create_dir_all(&workdir)
            .map_err(|source| Error::File { path: workdir.clone(), source })?;

        info!("Fitting model variant '{}' to {} examples", variant.name, data.n);
        let samples = sampler.sample(variant, &data, &workdir)?;
        samples.save(workdir.join(POSTERIOR_DRAWS))?;

        let means = PosteriorMeans::from_samples(&samples)?;
        info!("Posterior means of '{}': {:?}", variant.name, means);
        let predictions = posterior_predictions(rows, &means, policy)?;
        save_predictions(workdir.join(POSTERIOR_PREDICTIONS), &predictions)?;

        summary.extend(summarize(&variant.name, &samples));
    }
    save_summary(out_dir.join(SUMMARY), &summary)?;
    Ok(summary)
}

/// Predictions from draws persisted by an earlier fit.
pub fn predict_from_draws<P: AsRef<Path>>(
    rows: &[FeatureRow],
    draws: P,
    policy: IndeterminatePolicy,
) -> Result<Vec<f64>> {
    let samples = PosteriorSamples::load(draws)?;
    let means = PosteriorMeans::from_samples(&samples)?;
    posterior_predictions(rows, &means, policy)
}

pub fn save_summary<P: AsRef<Path>>(path: P, summary: &[SummaryRow]) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut file = open_file_for_write(path)?;
    let mut writer = table_writer(&mut file, b',');
    for row in summary {
        writer.serialize(row)?;
    }
    writer.flush()?;
    drop(writer);
    file.finish()?;
    info!("Saved parameter summary to {}", path.display());
    Ok(path.to_path_buf())
}
