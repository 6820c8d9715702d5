use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::distributions::{clamp_unit, Marginal};
use crate::error::ChaletError;
use crate::ChaletResult;

/// How the underlying uniforms are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    #[default]
    Random,
    /// One draw per equal-probability stratum, strata shuffled per variable
    LatinHypercube,
}

/// Sampled parameter vectors, one row per trial in `names` order.
#[derive(Debug, Clone)]
pub struct SampleMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl SampleMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.names.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|r| r[j]).collect())
    }
}

fn standard_normal() -> ChaletResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| ChaletError::InvalidDistribution {
        variable: "standard_normal".into(),
        reason: e.to_string(),
    })
}

/// n x k uniforms on (0, 1).
fn uniforms<R: Rng + ?Sized>(
    n: usize,
    k: usize,
    method: SamplingMethod,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let mut rows = vec![vec![0.0; k]; n];
    match method {
        SamplingMethod::Random => {
            for row in rows.iter_mut() {
                for u in row.iter_mut() {
                    *u = rng.gen::<f64>();
                }
            }
        }
        SamplingMethod::LatinHypercube => {
            let mut strata: Vec<usize> = (0..n).collect();
            for j in 0..k {
                strata.shuffle(rng);
                for (i, row) in rows.iter_mut().enumerate() {
                    row[j] = (strata[i] as f64 + rng.gen::<f64>()) / n as f64;
                }
            }
        }
    }
    rows
}

/// Draw `n` parameter vectors. With a Cholesky factor the uniforms are
/// pushed through a Gaussian copula first; each column is then mapped
/// through its own marginal's quantile function.
pub fn sample_variables<R: Rng + ?Sized>(
    marginals: &[Marginal],
    lower: Option<&[Vec<f64>]>,
    n: usize,
    method: SamplingMethod,
    rng: &mut R,
) -> ChaletResult<SampleMatrix> {
    let k = marginals.len();
    if let Some(l) = lower {
        if l.len() != k {
            return Err(ChaletError::InvalidCorrelation(format!(
                "factor is {}x{} but {k} variables are sampled",
                l.len(),
                l.len()
            )));
        }
    }

    let mut rows = uniforms(n, k, method, rng);

    if let Some(l) = lower {
        let phi = standard_normal()?;
        let mut z = vec![0.0; k];
        for row in rows.iter_mut() {
            for (zj, u) in z.iter_mut().zip(row.iter()) {
                *zj = phi.inverse_cdf(clamp_unit(*u));
            }
            // X = Z * L^T
            for i in 0..k {
                let x: f64 = (0..=i).map(|j| l[i][j] * z[j]).sum();
                row[i] = phi.cdf(x);
            }
        }
    }

    for row in rows.iter_mut() {
        for (value, m) in row.iter_mut().zip(marginals) {
            *value = m.quantile(*value);
        }
    }

    Ok(SampleMatrix {
        names: marginals.iter().map(|m| m.name.clone()).collect(),
        rows,
    })
}
