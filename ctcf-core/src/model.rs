//! Model variants and their Stan programs.
//!
//! Every variant shares one likelihood: a logistic regression of the label
//! on the motif score, and a per-class normal distribution of
//! `log1p(chip_signal)`. Variants differ only in their priors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Model parameters, in the order they are reported.
pub const PARAMETERS: [&str; 6] = ["alpha", "beta_motif", "mu_0", "sigma_0", "mu_1", "sigma_1"];

/// A prior distribution. Priors on the standard deviations are truncated
/// at zero by the parameter constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prior {
    Normal(f64, f64),
    Cauchy(f64, f64),
    StudentT(f64, f64, f64),
    Exponential(f64),
}

impl Prior {
    fn validate(&self, param: &str) -> Result<()> {
        let (location, scales) = match *self {
            Prior::Normal(m, s) | Prior::Cauchy(m, s) => (vec![m], vec![s]),
            Prior::StudentT(nu, m, s) => (vec![m], vec![nu, s]),
            Prior::Exponential(rate) => (vec![], vec![rate]),
        };
        let valid = location.iter().all(|x| x.is_finite())
            && scales.iter().all(|x| x.is_finite() && *x > 0.0);
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!("invalid prior for {}: {}", param, self)))
        }
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prior::Normal(m, s) => write!(f, "normal({}, {})", m, s),
            Prior::Cauchy(m, s) => write!(f, "cauchy({}, {})", m, s),
            Prior::StudentT(nu, m, s) => write!(f, "student_t({}, {}, {})", nu, m, s),
            Prior::Exponential(rate) => write!(f, "exponential({})", rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Priors {
    pub alpha: Prior,
    pub beta_motif: Prior,
    pub mu_0: Prior,
    pub mu_1: Prior,
    pub sigma_0: Prior,
    pub sigma_1: Prior,
}

impl Default for Priors {
    fn default() -> Self {
        Priors {
            alpha: Prior::Normal(0.0, 5.0),
            beta_motif: Prior::Normal(0.0, 5.0),
            mu_0: Prior::Normal(0.0, 5.0),
            mu_1: Prior::Normal(0.0, 5.0),
            sigma_0: Prior::Exponential(1.0),
            sigma_1: Prior::Exponential(1.0),
        }
    }
}

impl Priors {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &Prior)> {
        [
            ("alpha", &self.alpha),
            ("beta_motif", &self.beta_motif),
            ("mu_0", &self.mu_0),
            ("mu_1", &self.mu_1),
            ("sigma_0", &self.sigma_0),
            ("sigma_1", &self.sigma_1),
        ].into_iter()
    }
}

/// A named prior specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelVariant {
    pub name: String,
    #[serde(default)]
    pub priors: Priors,
}

impl ModelVariant {
    pub const BUILTIN: [&'static str; 3] = ["baseline", "vague", "regularized"];

    pub fn new<S: Into<String>>(name: S, priors: Priors) -> Self {
        Self { name: name.into(), priors }
    }

    /// Weakly informative priors.
    pub fn baseline() -> Self {
        Self::new("baseline", Priors::default())
    }

    /// Wide priors that let the data dominate.
    pub fn vague() -> Self {
        Self::new("vague", Priors {
            alpha: Prior::Normal(0.0, 100.0),
            beta_motif: Prior::Normal(0.0, 100.0),
            mu_0: Prior::Normal(0.0, 100.0),
            mu_1: Prior::Normal(0.0, 100.0),
            sigma_0: Prior::Cauchy(0.0, 5.0),
            sigma_1: Prior::Cauchy(0.0, 5.0),
        })
    }

    /// Shrinks the coefficients towards zero.
    pub fn regularized() -> Self {
        Self::new("regularized", Priors {
            alpha: Prior::Normal(0.0, 1.0),
            beta_motif: Prior::Normal(0.0, 1.0),
            mu_0: Prior::Normal(0.0, 2.0),
            mu_1: Prior::Normal(0.0, 2.0),
            sigma_0: Prior::Normal(0.0, 1.0),
            sigma_1: Prior::Normal(0.0, 1.0),
        })
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "baseline" => Some(Self::baseline()),
            "vague" => Some(Self::vague()),
            "regularized" => Some(Self::regularized()),
            _ => None,
        }
    }

    /// Names become directory and file names, so they are restricted to
    /// ASCII letters, digits, '_' and '-'.
    pub fn validate(&self) -> Result<()> {
        let valid_name = !self.name.is_empty() && self.name.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(Error::InvalidArgument(format!("invalid model variant name: '{}'", self.name)));
        }
        self.priors.iter().try_for_each(|(param, prior)| prior.validate(param))
    }

    /// Render the Stan program of this variant.
    pub fn stan_program(&self) -> String {
        let priors: String = self.priors.iter()
            .map(|(param, prior)| format!("  {} ~ {};\n", param, prior))
            .collect();
        format!("\
// model variant: {name}
data {{
  int<lower=0> N;
  vector[N] motif_score;
  vector<lower=0>[N] chip_signal;
  array[N] int<lower=0, upper=1> y;
}}
transformed data {{
  vector[N] log_chip = log1p(chip_signal);
}}
parameters {{
  real alpha;
  real beta_motif;
  real mu_0;
  real mu_1;
  real<lower=0> sigma_0;
  real<lower=0> sigma_1;
}}
model {{
{priors}
  y ~ bernoulli_logit(alpha + beta_motif * motif_score);
  for (n in 1:N) {{
    if (y[n] == 1) {{
      log_chip[n] ~ normal(mu_1, sigma_1);
    }} else {{
      log_chip[n] ~ normal(mu_0, sigma_0);
    }}
  }}
}}
", name = self.name, priors = priors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_variants() {
        for name in ModelVariant::BUILTIN {
            let v = ModelVariant::builtin(name).unwrap();
            assert_eq!(v.name, name);
            v.validate().unwrap();
        }
        assert!(ModelVariant::builtin("unknown").is_none());
    }

    #[test]
    fn test_stan_program() {
        let program = ModelVariant::vague().stan_program();
        assert!(program.contains("  alpha ~ normal(0, 100);\n"));
        assert!(program.contains("  sigma_1 ~ cauchy(0, 5);\n"));
        assert!(program.contains("y ~ bernoulli_logit(alpha + beta_motif * motif_score);"));
        assert!(program.contains("log_chip[n] ~ normal(mu_0, sigma_0);"));
        assert_eq!(program.matches('{').count(), program.matches('}').count());
        for param in PARAMETERS {
            assert!(program.contains(&format!("{};\n", param)));
        }
        assert!(program.contains("\
model {
  alpha ~ normal(0, 100);
  beta_motif ~ normal(0, 100);
  mu_0 ~ normal(0, 100);
  mu_1 ~ normal(0, 100);
  sigma_0 ~ cauchy(0, 5);
  sigma_1 ~ cauchy(0, 5);

  y ~ bernoulli_logit"));
    }

    #[test]
    fn test_validation() {
        let mut v = ModelVariant::baseline();
        v.name = "../escape".to_string();
        assert!(v.validate().is_err());

        let mut v = ModelVariant::baseline();
        v.priors.sigma_0 = Prior::Exponential(0.0);
        assert!(v.validate().is_err());

        let mut v = ModelVariant::baseline();
        v.priors.alpha = Prior::StudentT(3.0, f64::NAN, 1.0);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_prior_json() {
        let p: Prior = serde_json::from_str(r#"{"student_t": [3.0, 0.0, 2.5]}"#).unwrap();
        assert_eq!(p, Prior::StudentT(3.0, 0.0, 2.5));
        assert_eq!(p.to_string(), "student_t(3, 0, 2.5)");
    }
}
