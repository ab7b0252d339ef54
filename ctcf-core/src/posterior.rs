//! Point estimates of the posterior and the closed-form binding probability.

use log::warn;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use std::{fmt, io::Write, path::Path, str::FromStr};

use crate::error::{Error, Result};
use crate::feature::FeatureRow;
use crate::model::PARAMETERS;
use crate::sampler::PosteriorSamples;
use crate::utils::{open_file_for_write, table_writer};

pub const POSTERIOR_PREDICTION: &str = "posterior_prediction";

/// What to do with a row whose posterior probability is not a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndeterminatePolicy {
    /// Abort with [`Error::ArithmeticIndeterminate`].
    #[default]
    Error,
    /// Use the logistic binding probability alone.
    Prior,
    /// Emit NaN.
    Nan,
}

impl FromStr for IndeterminatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "prior" => Ok(Self::Prior),
            "nan" => Ok(Self::Nan),
            _ => Err(Error::InvalidArgument(format!(
                "unknown indeterminate policy '{}', expected one of: error, prior, nan", s
            ))),
        }
    }
}

impl fmt::Display for IndeterminatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Prior => write!(f, "prior"),
            Self::Nan => write!(f, "nan"),
        }
    }
}

/// Posterior means of the model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosteriorMeans {
    pub alpha: f64,
    pub beta_motif: f64,
    pub mu_0: f64,
    pub sigma_0: f64,
    pub mu_1: f64,
    pub sigma_1: f64,
}

impl PosteriorMeans {
    pub fn from_samples(samples: &PosteriorSamples) -> Result<Self> {
        let missing: Vec<&str> = PARAMETERS.iter().copied()
            .filter(|p| samples.mean(p).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::missing("posterior draws", missing));
        }
        let get = |name: &str| samples.mean(name).unwrap_or(f64::NAN);
        let means = PosteriorMeans {
            alpha: get("alpha"),
            beta_motif: get("beta_motif"),
            mu_0: get("mu_0"),
            sigma_0: get("sigma_0"),
            mu_1: get("mu_1"),
            sigma_1: get("sigma_1"),
        };
        means.validate()?;
        Ok(means)
    }

    fn validate(&self) -> Result<()> {
        for (name, sigma) in [("sigma_0", self.sigma_0), ("sigma_1", self.sigma_1)] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(Error::InvalidArgument(format!(
                    "posterior mean of {} must be positive, got {}", name, sigma
                )));
            }
        }
        Ok(())
    }

    /// Pr(label = 1) from the motif score alone.
    pub fn binding_prob(&self, motif_score: f64) -> f64 {
        sigmoid(self.alpha + self.beta_motif * motif_score)
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Bayes' rule with the logistic term as prior and the per-class normal
/// densities of `log1p(chip_signal)` as likelihoods. The density ratio is
/// taken in log space, so the result is NaN only when the inputs leave no
/// defined answer.
pub fn posterior_prob(means: &PosteriorMeans, motif_score: f64, chip_signal: f64) -> Result<f64> {
    let logit = means.alpha + means.beta_motif * motif_score;
    let x = chip_signal.ln_1p();
    let n0 = Normal::new(means.mu_0, means.sigma_0)
        .map_err(|e| Error::InvalidArgument(format!("negative class density: {}", e)))?;
    let n1 = Normal::new(means.mu_1, means.sigma_1)
        .map_err(|e| Error::InvalidArgument(format!("positive class density: {}", e)))?;
    Ok(sigmoid(logit + n1.ln_pdf(x) - n0.ln_pdf(x)))
}

/// Posterior binding probability of every row, in row order.
pub fn posterior_predictions(
    rows: &[FeatureRow],
    means: &PosteriorMeans,
    policy: IndeterminatePolicy,
) -> Result<Vec<f64>> {
    let mut n_fallback = 0;
    let result = rows.iter().enumerate().map(|(i, row)| -> Result<f64> {
        let p = posterior_prob(means, row.motif_score, row.chip_signal)?;
        if p.is_finite() {
            return Ok(p);
        }
        let indeterminate = || Error::ArithmeticIndeterminate { row: i + 1, region: row.region.clone() };
        match policy {
            IndeterminatePolicy::Error => Err(indeterminate()),
            IndeterminatePolicy::Prior => {
                let prior = means.binding_prob(row.motif_score);
                if prior.is_finite() {
                    n_fallback += 1;
                    Ok(prior)
                } else {
                    Err(indeterminate())
                }
            },
            IndeterminatePolicy::Nan => {
                n_fallback += 1;
                Ok(f64::NAN)
            },
        }
    }).collect::<Result<Vec<_>>>()?;
    if n_fallback > 0 {
        warn!("{} rows had an indeterminate posterior, applied policy '{}'", n_fallback, policy);
    }
    Ok(result)
}

pub fn write_predictions<W: Write>(writer: W, predictions: &[f64]) -> Result<()> {
    let mut writer = table_writer(writer, b',');
    writer.write_record([POSTERIOR_PREDICTION])?;
    for p in predictions {
        writer.write_record([p.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_predictions<P: AsRef<Path>>(path: P, predictions: &[f64]) -> Result<()> {
    let mut writer = open_file_for_write(path)?;
    write_predictions(&mut writer, predictions)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn row(region: &str, motif_score: f64, chip_signal: f64) -> FeatureRow {
        FeatureRow { region: region.to_string(), motif_score, chip_signal, label: 1 }
    }

    fn means(alpha: f64, beta_motif: f64, mu_0: f64, sigma_0: f64, mu_1: f64, sigma_1: f64) -> PosteriorMeans {
        PosteriorMeans { alpha, beta_motif, mu_0, sigma_0, mu_1, sigma_1 }
    }

    fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
        (-0.5 * ((x - mu) / sigma).powi(2)).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
    }

    #[test]
    fn test_uninformative_posterior() {
        let m = means(0.0, 0.0, 1.5, 0.7, 1.5, 0.7);
        let rows = vec![row("a", 0.0, 0.0), row("b", 12.0, 3.5), row("c", -3.0, 1e4)];
        for p in posterior_predictions(&rows, &m, IndeterminatePolicy::Error).unwrap() {
            assert_approx_eq!(p, 0.5, 1e-12);
        }
    }

    #[test]
    fn test_matches_linear_formula() {
        let m = means(1.0, 0.5, 1.0, 1.0, 3.0, 1.0);
        let p = posterior_prob(&m, 2.0, 10.0).unwrap();
        assert_approx_eq!(p, 0.9424479287920227, 1e-9);

        let prior = sigmoid(2.0);
        let x = 10.0f64.ln_1p();
        let (l0, l1) = (normal_pdf(x, 1.0, 1.0), normal_pdf(x, 3.0, 1.0));
        assert_approx_eq!(p, prior * l1 / (prior * l1 + (1.0 - prior) * l0), 1e-9);
    }

    #[test]
    fn test_underflowing_densities() {
        let m = means(0.0, 0.0, 0.0, 0.01, 0.5, 0.01);
        let chip = 50.0f64.exp_m1();
        assert_eq!(normal_pdf(chip.ln_1p(), 0.0, 0.01), 0.0);
        assert_eq!(normal_pdf(chip.ln_1p(), 0.5, 0.01), 0.0);
        let p = posterior_prob(&m, 1.0, chip).unwrap();
        assert!(p.is_finite());
        assert_approx_eq!(p, 1.0, 1e-12);
    }

    #[test]
    fn test_indeterminate_policy() {
        let m = means(1.0, 0.5, 1.0, 1.0, 3.0, 1.0);
        let rows = vec![row("ok", 2.0, 10.0), row("bad", 2.0, -1.0)];

        match posterior_predictions(&rows, &m, IndeterminatePolicy::Error) {
            Err(Error::ArithmeticIndeterminate { row, region }) => {
                assert_eq!(row, 2);
                assert_eq!(region, "bad");
            },
            other => panic!("unexpected: {:?}", other),
        }

        let p = posterior_predictions(&rows, &m, IndeterminatePolicy::Prior).unwrap();
        assert_approx_eq!(p[1], sigmoid(2.0), 1e-12);

        let p = posterior_predictions(&rows, &m, IndeterminatePolicy::Nan).unwrap();
        assert!(p[0].is_finite());
        assert!(p[1].is_nan());
    }

    #[test]
    fn test_means_from_samples() {
        let mut samples = PosteriorSamples::new();
        for (i, name) in PARAMETERS.iter().enumerate() {
            samples.insert(*name, vec![i as f64 + 0.5, i as f64 + 1.5]).unwrap();
        }
        let m = PosteriorMeans::from_samples(&samples).unwrap();
        assert_eq!(m, means(1.0, 2.0, 3.0, 4.0, 5.0, 6.0));

        let mut partial = PosteriorSamples::new();
        partial.insert("alpha", vec![0.0]).unwrap();
        match PosteriorMeans::from_samples(&partial) {
            Err(Error::MissingColumn { columns, .. }) => assert_eq!(columns.len(), 5),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Prior".parse::<IndeterminatePolicy>().unwrap(), IndeterminatePolicy::Prior);
        assert_eq!(IndeterminatePolicy::Nan.to_string(), "nan");
        assert!("clamp".parse::<IndeterminatePolicy>().is_err());
    }

    #[test]
    fn test_write_predictions() {
        let mut buf = Vec::new();
        write_predictions(&mut buf, &[0.25, f64::NAN]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "posterior_prediction\n0.25\nNaN\n");
    }
}
