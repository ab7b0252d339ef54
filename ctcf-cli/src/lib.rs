use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use log::info;
use std::path::{Path, PathBuf};

use ctcf_core::{
    config::{FitConfig, SplitConfig},
    dataset::{build_dataset, downsample},
    feature::{load_feature_table, save_feature_table, FeatureInputs},
    fimo::process_fimo,
    inference::{fit_variants, predict_from_draws},
    model::ModelVariant,
    posterior::{save_predictions, IndeterminatePolicy},
    sampler::cmdstan::CmdStan,
};

pub const DEFAULT_DOWNSAMPLE_OUTPUT: &str = "training_data.csv";

/// Log to stderr. The level comes from `RUST_LOG` and defaults to `info`.
pub fn init_logger() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = pretty_env_logger::formatted_builder().parse_filters(&filters).try_init();
}

/// Keep the best FIMO match of every region as a two-column table.
#[derive(Parser, Debug, Clone)]
#[command(name = "process_fimo_scores", version, about = "Extract the best motif score of every region from FIMO output")]
pub struct ProcessFimoArgs {
    /// FIMO output table (tab-delimited)
    pub fimo_input_path: PathBuf,
    /// Where to write the region/motif_score table
    pub output_path: PathBuf,
}

impl ProcessFimoArgs {
    pub fn run(&self) -> Result<()> {
        process_fimo(&self.fimo_input_path, &self.output_path)
            .with_context(|| format!("failed to process {}", self.fimo_input_path.display()))?;
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct BuildDatasetArgs {
    /// Motif scores of the positive set
    #[arg(long)]
    pub pos_scores: PathBuf,
    /// Regions of the positive set (BED4)
    #[arg(long)]
    pub pos_regions: PathBuf,
    /// Signal table of the positive set
    #[arg(long)]
    pub pos_signal: PathBuf,
    #[arg(long)]
    pub neg_scores: PathBuf,
    #[arg(long)]
    pub neg_regions: PathBuf,
    #[arg(long)]
    pub neg_signal: PathBuf,
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,
    /// Fraction of rows held out for testing
    #[arg(long, default_value_t = 0.2)]
    pub test_size: f64,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl BuildDatasetArgs {
    pub fn run(&self) -> Result<()> {
        let positive = FeatureInputs {
            motif_scores: self.pos_scores.clone(),
            regions: self.pos_regions.clone(),
            signal: self.pos_signal.clone(),
        };
        let negative = FeatureInputs {
            motif_scores: self.neg_scores.clone(),
            regions: self.neg_regions.clone(),
            signal: self.neg_signal.clone(),
        };
        let split = SplitConfig { test_size: self.test_size, seed: self.seed };
        build_dataset(&positive, &negative, &self.out_dir, &split)
            .context("failed to build the feature dataset")?;
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct DownsampleArgs {
    /// Feature table to sample from
    pub input: PathBuf,
    /// Number of rows to keep
    #[arg(short = 'n', long, default_value_t = 5000)]
    pub num_rows: usize,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Defaults to training_data.csv next to the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl DownsampleArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            self.input.parent().unwrap_or(Path::new("")).join(DEFAULT_DOWNSAMPLE_OUTPUT)
        })
    }

    pub fn run(&self) -> Result<()> {
        let rows = load_feature_table(&self.input)
            .with_context(|| format!("cannot read {}", self.input.display()))?;
        let sample = downsample(&rows, self.num_rows, self.seed)?;
        let output = self.output_path();
        save_feature_table(&output, &sample)?;
        info!("Saved {} of {} rows to {}", sample.len(), rows.len(), output.display());
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    /// Feature table to fit
    pub data: PathBuf,
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,
    /// JSON file with sampler settings and model variants
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Model variants to fit, by name; repeatable
    #[arg(long = "variant", value_name = "NAME")]
    pub variants: Vec<String>,
    /// CmdStan installation directory
    #[arg(long, value_name = "DIR")]
    pub cmdstan: Option<PathBuf>,
    #[arg(long)]
    pub chains: Option<usize>,
    #[arg(long)]
    pub num_samples: Option<usize>,
    #[arg(long)]
    pub num_warmup: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// error, prior or nan
    #[arg(long, value_name = "POLICY")]
    pub on_indeterminate: Option<IndeterminatePolicy>,
}

impl FitArgs {
    /// The configuration file, if any, with command line overrides applied.
    pub fn fit_config(&self) -> Result<FitConfig> {
        let mut config = match &self.config {
            Some(path) => FitConfig::from_json_file(path)
                .with_context(|| format!("invalid configuration {}", path.display()))?,
            None => FitConfig::default(),
        };
        if let Some(x) = self.chains { config.sampler.chains = x; }
        if let Some(x) = self.num_samples { config.sampler.num_samples = x; }
        if let Some(x) = self.num_warmup { config.sampler.num_warmup = x; }
        if let Some(x) = self.seed { config.sampler.seed = x; }
        if let Some(x) = self.on_indeterminate { config.indeterminate = x; }
        if !self.variants.is_empty() {
            config.variants = self.variants.iter().map(|name| {
                config.variants.iter().find(|v| &v.name == name).cloned()
                    .or_else(|| ModelVariant::builtin(name))
                    .with_context(|| format!(
                        "unknown model variant '{}', built-in variants are: {}",
                        name, ModelVariant::BUILTIN.join(", "),
                    ))
            }).collect::<Result<_>>()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn run(&self) -> Result<()> {
        let config = self.fit_config()?;
        let rows = load_feature_table(&self.data)
            .with_context(|| format!("cannot read {}", self.data.display()))?;
        if rows.is_empty() {
            bail!("{} has no rows", self.data.display());
        }
        let sampler = CmdStan::locate(self.cmdstan.as_deref(), config.sampler.clone())?;
        info!("Using CmdStan at {}", sampler.home().display());
        let summary = fit_variants(&sampler, &config.variants, &rows, &self.out_dir, config.indeterminate)?;
        for row in summary {
            info!("{}\t{}\tmean = {:.4}\tsd = {:.4}", row.version, row.param, row.mean, row.sd);
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Feature table to score
    pub data: PathBuf,
    /// posterior_draws.csv of a fitted model variant
    #[arg(long)]
    pub draws: PathBuf,
    #[arg(short, long)]
    pub output: PathBuf,
    #[arg(long, value_name = "POLICY", default_value_t = IndeterminatePolicy::Error)]
    pub on_indeterminate: IndeterminatePolicy,
}

impl PredictArgs {
    pub fn run(&self) -> Result<()> {
        let rows = load_feature_table(&self.data)
            .with_context(|| format!("cannot read {}", self.data.display()))?;
        let predictions = predict_from_draws(&rows, &self.draws, self.on_indeterminate)
            .with_context(|| format!("cannot predict from {}", self.draws.display()))?;
        save_predictions(&self.output, &predictions)?;
        info!("Saved {} posterior predictions to {}", predictions.len(), self.output.display());
        Ok(())
    }
}
