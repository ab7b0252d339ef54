use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::ModelVariant;
use crate::posterior::IndeterminatePolicy;
use crate::utils::open_file_for_read;

/// Train/test split settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { test_size: 0.2, seed: 42 }
    }
}

/// Sampler run length. Chains run one after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    pub chains: usize,
    pub num_samples: usize,
    pub num_warmup: usize,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { chains: 4, num_samples: 1000, num_warmup: 1000, seed: 42 }
    }
}

/// Settings of a model fitting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    pub sampler: SamplerConfig,
    /// Model variants to fit, in order. Defaults to the baseline model only.
    pub variants: Vec<ModelVariant>,
    pub indeterminate: IndeterminatePolicy,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            variants: vec![ModelVariant::baseline()],
            indeterminate: IndeterminatePolicy::default(),
        }
    }
}

impl FitConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: FitConfig = serde_json::from_reader(open_file_for_read(path.as_ref())?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(Error::InvalidArgument("at least one model variant is required".to_string()));
        }
        if self.sampler.chains == 0 || self.sampler.num_samples == 0 {
            return Err(Error::InvalidArgument("chains and num_samples must be positive".to_string()));
        }
        let mut names: Vec<&str> = self.variants.iter().map(|v| v.name.as_str()).collect();
        names.sort();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::InvalidArgument(format!("duplicate model variant: {}", w[0])));
        }
        self.variants.iter().try_for_each(ModelVariant::validate)
    }
}
