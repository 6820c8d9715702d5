use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ChaletError;
use crate::ChaletResult;

/// Added to the diagonal when a matrix is not positive-definite.
pub const REGULARIZATION: f64 = 1e-6;

const SYMMETRY_TOL: f64 = 1e-9;

/// Named correlation matrix. Row/column order follows `variables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub variables: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn identity(variables: &[String]) -> Self {
        let k = variables.len();
        let matrix = (0..k)
            .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        CorrelationMatrix {
            variables: variables.to_vec(),
            matrix,
        }
    }

    /// Shape, symmetry, unit diagonal and entry range.
    pub fn validate(&self) -> ChaletResult<()> {
        let k = self.variables.len();
        if self.matrix.len() != k || self.matrix.iter().any(|row| row.len() != k) {
            return Err(ChaletError::InvalidCorrelation(format!(
                "matrix must be {k}x{k} to match its variable list"
            )));
        }
        for i in 0..k {
            if (self.matrix[i][i] - 1.0).abs() > SYMMETRY_TOL {
                return Err(ChaletError::InvalidCorrelation(format!(
                    "diagonal entry for '{}' must be 1 (got {})",
                    self.variables[i], self.matrix[i][i]
                )));
            }
            for j in 0..k {
                let v = self.matrix[i][j];
                if !v.is_finite() || !(-1.0..=1.0).contains(&v) {
                    return Err(ChaletError::InvalidCorrelation(format!(
                        "entry ({i}, {j}) must lie in [-1, 1] (got {v})"
                    )));
                }
                if (v - self.matrix[j][i]).abs() > SYMMETRY_TOL {
                    return Err(ChaletError::InvalidCorrelation(format!(
                        "matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The matrix reordered to `names`, which must be exactly this
    /// matrix's variables in any order.
    pub fn aligned_to(&self, names: &[String]) -> ChaletResult<Vec<Vec<f64>>> {
        self.validate()?;
        if names.len() != self.variables.len() {
            return Err(ChaletError::InvalidCorrelation(format!(
                "matrix lists {} variables but {} are active",
                self.variables.len(),
                names.len()
            )));
        }
        let index: Vec<usize> = names
            .iter()
            .map(|n| {
                self.variables.iter().position(|v| v == n).ok_or_else(|| {
                    ChaletError::InvalidCorrelation(format!(
                        "active variable '{n}' is missing from the matrix"
                    ))
                })
            })
            .collect::<ChaletResult<_>>()?;
        Ok(index
            .iter()
            .map(|&i| index.iter().map(|&j| self.matrix[i][j]).collect())
            .collect())
    }
}

/// Lower-triangular Cholesky factor, or `None` if the matrix is not
/// positive-definite.
pub fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = matrix[i][i] - sum;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }
    Some(l)
}

/// Cholesky factor result; `regularized` is set when the diagonal had
/// to be lifted.
#[derive(Debug, Clone)]
pub struct Factorization {
    pub lower: Vec<Vec<f64>>,
    pub regularized: bool,
}

/// Factorise, retrying once with a lifted diagonal. Fails as a whole if
/// the retry also fails.
pub fn factorize(matrix: &[Vec<f64>]) -> ChaletResult<Factorization> {
    if let Some(lower) = cholesky(matrix) {
        return Ok(Factorization {
            lower,
            regularized: false,
        });
    }

    let lifted: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, v)| if i == j { v + REGULARIZATION } else { *v })
                .collect()
        })
        .collect();

    match cholesky(&lifted) {
        Some(lower) => {
            warn!(
                dimension = matrix.len(),
                epsilon = REGULARIZATION,
                "correlation matrix not positive-definite; regularized diagonal"
            );
            Ok(Factorization {
                lower,
                regularized: true,
            })
        }
        None => Err(ChaletError::InvalidCorrelation(format!(
            "matrix is not positive-definite even after adding {REGULARIZATION} to the diagonal"
        ))),
    }
}

/// Which season a seasonal variable belongs to, by naming convention.
fn season_kind(name: &str) -> Option<&'static str> {
    if name.contains("winter") {
        Some("winter")
    } else if name.contains("summer") {
        Some("summer")
    } else {
        None
    }
}

fn pair_correlation(a: &str, b: &str) -> Option<f64> {
    const PAIRS: &[(&str, &str, f64)] = &[
        ("occupancy_rate", "daily_rate", 0.4),
        ("inflation_rate", "property_appreciation", 0.2),
        ("utilities_annual", "inflation_rate", 0.3),
        ("maintenance_rate", "inflation_rate", 0.3),
        ("occupancy_rate", "ota_booking_percentage", -0.3),
        ("ota_booking_percentage", "ota_fee_rate", 0.1),
        ("daily_rate", "average_length_of_stay", -0.2),
        ("occupancy_rate", "cleaning_cost_per_stay", 0.4),
        ("average_length_of_stay", "cleaning_cost_per_stay", -0.3),
        ("avg_guests_per_night", "cleaning_cost_per_stay", 0.2),
        ("property_appreciation", "marginal_tax_rate", 0.1),
    ];
    PAIRS
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, rho)| *rho)
}

#[derive(PartialEq)]
enum SeasonField {
    Occupancy,
    Rate,
}

fn season_var<'a>(name: &str, seasons: &'a [String]) -> Option<(&'a str, SeasonField)> {
    seasons.iter().find_map(|s| {
        let rest = name.strip_prefix(s.as_str())?;
        match rest {
            "_occupancy" => Some((s.as_str(), SeasonField::Occupancy)),
            "_rate" => Some((s.as_str(), SeasonField::Rate)),
            _ => None,
        }
    })
}

fn seasonal_correlation(a: (&str, SeasonField), b: (&str, SeasonField)) -> Option<f64> {
    if a.0 == b.0 {
        return (a.1 != b.1).then_some(0.5);
    }
    let (ka, kb) = (season_kind(a.0)?, season_kind(b.0)?);
    if ka == kb || a.1 != b.1 {
        return None;
    }
    Some(match a.1 {
        SeasonField::Occupancy => 0.3,
        SeasonField::Rate => 0.2,
    })
}

/// Default correlation matrix over `variables`. Pairs whose variables
/// are absent are ignored; everything else is uncorrelated.
pub fn default_correlations(variables: &[String], seasons: &[String]) -> CorrelationMatrix {
    let mut m = CorrelationMatrix::identity(variables);
    for i in 0..variables.len() {
        for j in 0..i {
            let (a, b) = (&variables[i], &variables[j]);
            let rho = match (season_var(a, seasons), season_var(b, seasons)) {
                (Some(sa), Some(sb)) => seasonal_correlation(sa, sb),
                (None, None) => pair_correlation(a, b),
                _ => None,
            };
            if let Some(rho) = rho {
                m.matrix[i][j] = rho;
                m.matrix[j][i] = rho;
            }
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let m = vec![vec![1.0, 0.7], vec![0.7, 1.0]];
        let l = cholesky(&m).unwrap();
        assert!((l[0][0] - 1.0).abs() < 1e-12);
        assert!((l[1][0] - 0.7).abs() < 1e-12);
        assert!((l[1][1] - (1.0 - 0.49_f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_regularized() {
        // perfectly correlated: PSD but not PD
        let m = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        let f = factorize(&m).unwrap();
        assert!(f.regularized);
    }

    #[test]
    fn test_indefinite_matrix_fails_loudly() {
        let m = vec![
            vec![1.0, 0.9, -0.9],
            vec![0.9, 1.0, 0.9],
            vec![-0.9, 0.9, 1.0],
        ];
        assert!(matches!(
            factorize(&m),
            Err(ChaletError::InvalidCorrelation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_asymmetric_and_wrong_shape() {
        let asym = CorrelationMatrix {
            variables: names(&["a", "b"]),
            matrix: vec![vec![1.0, 0.2], vec![0.3, 1.0]],
        };
        assert!(asym.validate().is_err());

        let shape = CorrelationMatrix {
            variables: names(&["a", "b"]),
            matrix: vec![vec![1.0, 0.2, 0.0], vec![0.2, 1.0, 0.0]],
        };
        assert!(shape.validate().is_err());

        let range = CorrelationMatrix {
            variables: names(&["a", "b"]),
            matrix: vec![vec![1.0, 1.5], vec![1.5, 1.0]],
        };
        assert!(range.validate().is_err());
    }

    #[test]
    fn test_alignment_reorders() {
        let m = CorrelationMatrix {
            variables: names(&["a", "b", "c"]),
            matrix: vec![
                vec![1.0, 0.1, 0.2],
                vec![0.1, 1.0, 0.3],
                vec![0.2, 0.3, 1.0],
            ],
        };
        let aligned = m.aligned_to(&names(&["c", "a", "b"])).unwrap();
        assert_eq!(aligned[0][1], 0.2);
        assert_eq!(aligned[0][2], 0.3);
        assert_eq!(aligned[1][2], 0.1);
        assert!(m.aligned_to(&names(&["a", "b"])).is_err());
        assert!(m.aligned_to(&names(&["a", "b", "d"])).is_err());
    }

    #[test]
    fn test_default_pairs() {
        let vars = names(&[
            "occupancy_rate",
            "daily_rate",
            "winter_peak_occupancy",
            "winter_peak_rate",
            "summer_peak_occupancy",
            "summer_peak_rate",
            "offpeak_occupancy",
            "offpeak_rate",
            "inflation_rate",
        ]);
        let seasons = names(&["winter_peak", "summer_peak", "offpeak"]);
        let m = default_correlations(&vars, &seasons);
        assert_eq!(m.matrix[0][1], 0.4);
        assert_eq!(m.matrix[2][3], 0.5);
        assert_eq!(m.matrix[6][7], 0.5);
        assert_eq!(m.matrix[2][4], 0.3);
        assert_eq!(m.matrix[3][5], 0.2);
        // offpeak is neither winter nor summer
        assert_eq!(m.matrix[2][6], 0.0);
        // daily_rate is not a season variable
        assert_eq!(m.matrix[1][3], 0.0);
        assert_eq!(m.matrix[0][8], 0.0);
        assert!(m.validate().is_ok());
    }
}
