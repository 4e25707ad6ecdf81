//! Ridge regression on the normal equations.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Linear model `y ≈ weights · x + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearFit {
    #[inline]
    pub fn predict(&self, x: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(x.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.bias
    }
}

/// Solve `(Xaᵗ Xa + Λ) β = Xaᵗ y` where `Xa` is `rows` with a trailing
/// column of ones and `Λ = diag(λ, …, λ, 0)`. The bias is not regularized.
///
/// Returns `None` when the system is singular.
pub fn ridge_solve(rows: &[&[f64]], y: &[f64], lambda: f64) -> Option<LinearFit> {
    let taps = rows.first()?.len();
    let dim = taps + 1;

    let mut lhs = DMatrix::<f64>::zeros(dim, dim);
    let mut rhs = DVector::<f64>::zeros(dim);
    let mut xa = vec![1.0f64; dim];

    for (row, &target) in rows.iter().zip(y.iter()) {
        xa[..taps].copy_from_slice(row);
        for a in 0..dim {
            rhs[a] += xa[a] * target;
            for b in a..dim {
                lhs[(a, b)] += xa[a] * xa[b];
            }
        }
    }
    // mirror the upper triangle
    for a in 0..dim {
        for b in 0..a {
            lhs[(a, b)] = lhs[(b, a)];
        }
    }
    for t in 0..taps {
        lhs[(t, t)] += lambda;
    }

    let beta = lhs.lu().solve(&rhs)?;
    if beta.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(LinearFit {
        weights: beta.rows(0, taps).iter().copied().collect(),
        bias: beta[taps],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_rows() -> Vec<Vec<f64>> {
        // deterministic but well conditioned
        (0..40)
            .map(|i| {
                let f = i as f64;
                vec![(f * 0.7).sin(), (f * 1.3).cos(), ((f * 0.37) % 1.0) - 0.5]
            })
            .collect()
    }

    #[test]
    fn ols_recovers_exact_linear_model() {
        let rows = synthetic_rows();
        let true_w = [0.5, -1.25, 2.0];
        let true_b = 0.3;
        let y: Vec<f64> = rows
            .iter()
            .map(|r| r.iter().zip(true_w.iter()).map(|(a, b)| a * b).sum::<f64>() + true_b)
            .collect();

        let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
        let fit = ridge_solve(&refs, &y, 0.0).unwrap();
        for (w, t) in fit.weights.iter().zip(true_w.iter()) {
            assert!((w - t).abs() < 1e-9, "{} vs {}", w, t);
        }
        assert!((fit.bias - true_b).abs() < 1e-9);

        let residual: f64 = refs
            .iter()
            .zip(y.iter())
            .map(|(r, t)| (fit.predict(r) - t).powi(2))
            .sum();
        assert!(residual < 1e-16);
    }

    #[test]
    fn ridge_shrinks_weights_but_not_bias() {
        // constant rows: only bias + sum(w) is identifiable
        let rows = vec![vec![1.0, 1.0]; 10];
        let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
        let y = vec![3.0; 10];
        let fit = ridge_solve(&refs, &y, 1e3).unwrap();
        // heavy ridge pushes the explanation into the unpenalized bias
        assert!(fit.weights.iter().all(|w| w.abs() < 0.01));
        assert!((fit.bias - 3.0).abs() < 0.05);
    }

    #[test]
    fn singular_ols_system_is_reported() {
        let rows = vec![vec![1.0, 1.0]; 5];
        let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
        assert!(ridge_solve(&refs, &[1.0; 5], 0.0).is_none());
    }

    #[test]
    fn empty_bucket_has_no_solution() {
        assert!(ridge_solve(&[], &[], 1e-3).is_none());
    }
}
