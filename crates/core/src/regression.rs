//! Ridge-regularised linear regression and evaluation metrics.
//!
//! The system is small (a dozen time features plus one column per garage), so
//! the closed-form normal equations are solved directly. The intercept is not
//! penalised.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Pivot magnitude below which the normal matrix is treated as singular.
const PIVOT_EPSILON: f64 = 1e-12;

/// A fitted linear model `y = intercept + weights · x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub intercept: f64,
    pub weights: Vec<f64>,
    pub lambda: f64,
}

impl RidgeRegression {
    /// Fit on `rows` (all the same width) against `targets`.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], lambda: f64) -> Result<Self, CoreError> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(CoreError::Internal(format!(
                "regression needs matching non-empty inputs, got {} rows and {} targets",
                rows.len(),
                targets.len()
            )));
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(CoreError::Internal("ragged feature rows".into()));
        }

        // Augmented dimension: column 0 is the bias term.
        let dim = width + 1;
        let mut gram = vec![vec![0.0; dim]; dim];
        let mut rhs = vec![0.0; dim];

        for (row, &y) in rows.iter().zip(targets) {
            let x = |i: usize| if i == 0 { 1.0 } else { row[i - 1] };
            for i in 0..dim {
                let xi = x(i);
                rhs[i] += xi * y;
                for j in i..dim {
                    gram[i][j] += xi * x(j);
                }
            }
        }
        for i in 0..dim {
            for j in 0..i {
                gram[i][j] = gram[j][i];
            }
            if i > 0 {
                gram[i][i] += lambda;
            }
        }

        let solution = solve(gram, rhs)?;
        Ok(Self {
            intercept: solution[0],
            weights: solution[1..].to_vec(),
            lambda,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, CoreError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(CoreError::Internal(
                "singular normal matrix; increase regularisation".into(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Error metrics on an evaluation split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl EvalMetrics {
    /// Compute MAE, RMSE and R² for paired predictions and actuals.
    ///
    /// R² is 1.0 for a perfect fit and 0.0 when the actuals have no variance
    /// but the fit is imperfect.
    pub fn compute(predicted: &[f64], actual: &[f64]) -> Self {
        let n = predicted.len().min(actual.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                r2: 0.0,
            };
        }
        let nf = n as f64;
        let mean = actual[..n].iter().sum::<f64>() / nf;

        let (mut abs_sum, mut sq_sum, mut tot_sum) = (0.0, 0.0, 0.0);
        for (p, a) in predicted.iter().zip(actual).take(n) {
            let err = p - a;
            abs_sum += err.abs();
            sq_sum += err * err;
            tot_sum += (a - mean) * (a - mean);
        }

        let r2 = if tot_sum > 0.0 {
            1.0 - sq_sum / tot_sum
        } else if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mae: abs_sum / nf,
            rmse: (sq_sum / nf).sqrt(),
            r2,
        }
    }
}
