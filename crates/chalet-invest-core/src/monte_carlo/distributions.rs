use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF, LogNormal, Normal};

use crate::error::ChaletError;
use crate::ChaletResult;

/// Probability distribution of one uncertain input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McDistribution {
    Uniform {
        min: f64,
        max: f64,
    },
    Normal {
        mean: f64,
        std_dev: f64,
    },
    Triangular {
        min: f64,
        mode: f64,
        max: f64,
    },
    /// Beta(alpha, beta) rescaled onto [min, max]
    Beta {
        alpha: f64,
        beta: f64,
        #[serde(default)]
        min: f64,
        #[serde(default = "unit_max")]
        max: f64,
    },
    /// `mu` and `sigma` of the underlying normal
    #[serde(rename = "lognormal")]
    LogNormal {
        mu: f64,
        sigma: f64,
    },
}

fn unit_max() -> f64 {
    1.0
}

/// Inclusive clipping range applied after the quantile transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// A single variable to simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McVariable {
    pub name: String,
    pub distribution: McDistribution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl McVariable {
    pub fn new(name: impl Into<String>, distribution: McDistribution) -> Self {
        McVariable {
            name: name.into(),
            distribution,
            bounds: None,
        }
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some(Bounds { min, max });
        self
    }

    /// Validate parameters and build the quantile function.
    pub fn compile(&self) -> ChaletResult<Marginal> {
        let bad = |reason: String| ChaletError::InvalidDistribution {
            variable: self.name.clone(),
            reason,
        };
        let finite = |values: &[f64]| values.iter().all(|v| v.is_finite());

        let quantile = match self.distribution {
            McDistribution::Uniform { min, max } => {
                if !finite(&[min, max]) || min >= max {
                    return Err(bad(format!("uniform needs min < max (got {min}, {max})")));
                }
                Quantile::Uniform { min, max }
            }
            McDistribution::Normal { mean, std_dev } => {
                if !finite(&[mean, std_dev]) || std_dev <= 0.0 {
                    return Err(bad(format!("normal needs std_dev > 0 (got {std_dev})")));
                }
                Quantile::Normal(Normal::new(mean, std_dev).map_err(|e| bad(e.to_string()))?)
            }
            McDistribution::Triangular { min, mode, max } => {
                if !finite(&[min, mode, max]) || min >= max || mode < min || mode > max {
                    return Err(bad(format!(
                        "triangular needs min <= mode <= max and min < max (got {min}, {mode}, {max})"
                    )));
                }
                Quantile::Triangular { min, mode, max }
            }
            McDistribution::Beta {
                alpha,
                beta,
                min,
                max,
            } => {
                if !finite(&[alpha, beta, min, max]) || alpha <= 0.0 || beta <= 0.0 {
                    return Err(bad(format!(
                        "beta needs positive shapes (got {alpha}, {beta})"
                    )));
                }
                if min >= max {
                    return Err(bad(format!("beta scale needs min < max (got {min}, {max})")));
                }
                Quantile::Beta {
                    dist: Beta::new(alpha, beta).map_err(|e| bad(e.to_string()))?,
                    min,
                    max,
                }
            }
            McDistribution::LogNormal { mu, sigma } => {
                if !finite(&[mu, sigma]) || sigma <= 0.0 {
                    return Err(bad(format!("lognormal needs sigma > 0 (got {sigma})")));
                }
                Quantile::LogNormal(LogNormal::new(mu, sigma).map_err(|e| bad(e.to_string()))?)
            }
        };

        if let Some(b) = self.bounds {
            if !finite(&[b.min, b.max]) || b.min > b.max {
                return Err(bad(format!(
                    "bounds need min <= max (got {}, {})",
                    b.min, b.max
                )));
            }
        }

        Ok(Marginal {
            name: self.name.clone(),
            quantile,
            bounds: self.bounds,
        })
    }
}

#[derive(Debug, Clone)]
enum Quantile {
    Uniform { min: f64, max: f64 },
    Normal(Normal),
    Triangular { min: f64, mode: f64, max: f64 },
    Beta { dist: Beta, min: f64, max: f64 },
    LogNormal(LogNormal),
}

/// A validated variable, ready to turn uniforms into samples.
#[derive(Debug, Clone)]
pub struct Marginal {
    pub name: String,
    quantile: Quantile,
    bounds: Option<Bounds>,
}

const UNIT_EPS: f64 = 1e-12;

/// Keep a probability strictly inside (0, 1) so quantiles stay finite.
pub(crate) fn clamp_unit(u: f64) -> f64 {
    if u.is_nan() {
        return 0.5;
    }
    u.clamp(UNIT_EPS, 1.0 - UNIT_EPS)
}

impl Marginal {
    /// Inverse CDF at `u`, clipped to the variable's bounds.
    pub fn quantile(&self, u: f64) -> f64 {
        let u = clamp_unit(u);
        let x = match &self.quantile {
            Quantile::Uniform { min, max } => min + u * (max - min),
            Quantile::Normal(d) => d.inverse_cdf(u),
            Quantile::Triangular { min, mode, max } => triangular_quantile(*min, *mode, *max, u),
            Quantile::Beta { dist, min, max } => min + dist.inverse_cdf(u) * (max - min),
            Quantile::LogNormal(d) => d.inverse_cdf(u),
        };
        self.clip(x)
    }

    pub fn clip(&self, x: f64) -> f64 {
        match self.bounds {
            Some(b) => x.clamp(b.min, b.max),
            None => x,
        }
    }

    /// One independent draw.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.quantile(rng.gen::<f64>())
    }
}

fn triangular_quantile(min: f64, mode: f64, max: f64, u: f64) -> f64 {
    let width = max - min;
    let split = (mode - min) / width;
    if u < split {
        min + (u * width * (mode - min)).sqrt()
    } else {
        max - ((1.0 - u) * width * (max - mode)).sqrt()
    }
}
