//! Top-K eigenpairs of a symmetric positive-semidefinite matrix via power
//! iteration with deflation.
//!
//! Each round runs power iteration on the working matrix until the iterate
//! stops moving, takes the Rayleigh quotient as the eigenvalue, then deflates
//! `C ← C − λ v vᵀ` so the next round converges to the next-largest pair.
//! Rounds are strictly sequential: round `i + 1` runs on the matrix deflated by
//! round `i`.

use crate::error::{EigenfaceError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Deserialize;

const DEFAULT_TOLERANCE: f64 = 1e-10;
const DEFAULT_MAX_ITERATIONS: usize = 1000;
const DEFAULT_RANK_TOLERANCE: f64 = 1e-10;
/// Amplitude of the sinusoidal perturbation added to the all-ones start vector.
/// Must be large: a centered Gram matrix annihilates the all-ones direction.
const START_PERTURBATION: f64 = 0.5;

/// Convergence knobs for [`PowerIteration`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Stop a round once `‖v' − v‖` (sign-insensitive) drops below this.
    pub tolerance: f64,
    /// Iteration cap per round.
    pub max_iterations: usize,
    /// Eigenvalues at or below `rank_tolerance × λ₁` count as numerically zero.
    pub rank_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
        }
    }
}

/// Non-fatal conditions met while solving.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverWarning {
    /// The matrix ran out of non-trivial eigenvalues before `requested` pairs.
    InsufficientRank { requested: usize, found: usize },
    /// Round `round` hit the iteration cap; its best estimate was kept.
    DidNotConverge { round: usize, residual: f64 },
}

impl SolverWarning {
    pub fn into_error(self) -> EigenfaceError {
        match self {
            SolverWarning::InsufficientRank { requested, found } => {
                EigenfaceError::InsufficientRank { requested, found }
            }
            SolverWarning::DidNotConverge { round, residual } => {
                EigenfaceError::EigensolverDidNotConverge { round, residual }
            }
        }
    }
}

/// Eigenpairs in descending eigenvalue order.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    pub values: Array1<f64>,
    /// One unit eigenvector per column.
    pub vectors: Array2<f64>,
    pub warnings: Vec<SolverWarning>,
}

impl EigenDecomposition {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fail on the first warning instead of accepting a degraded result.
    pub fn into_strict(mut self) -> Result<Self> {
        if self.warnings.is_empty() {
            Ok(self)
        } else {
            Err(self.warnings.swap_remove(0).into_error())
        }
    }
}

/// Power-iteration eigensolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerIteration {
    config: SolverConfig,
}

impl PowerIteration {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Extract up to `k` leading eigenpairs of the symmetric matrix `matrix`.
    pub fn solve(&self, matrix: ArrayView2<'_, f64>, k: usize) -> Result<EigenDecomposition> {
        self.solve_above(matrix, k, 0.0)
    }

    /// Like [`solve`](Self::solve), but eigenvalues at or below `noise_floor`
    /// also count as numerically zero, including the very first one.
    ///
    /// Callers that know the scale of the data behind `matrix` use this to
    /// reject rounding residue that `matrix` alone cannot tell apart from
    /// signal.
    pub fn solve_above(
        &self,
        matrix: ArrayView2<'_, f64>,
        k: usize,
        noise_floor: f64,
    ) -> Result<EigenDecomposition> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(EigenfaceError::DimensionMismatch {
                context: "eigensolver input must be square",
                expected: rows,
                actual: cols,
            });
        }
        if k == 0 {
            return Err(EigenfaceError::InvalidK(k));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(EigenfaceError::NonFiniteInput("eigensolver input matrix"));
        }

        let n = rows;
        let target = k.min(n);
        let mut warnings = Vec::new();
        let mut work = matrix.to_owned();
        let mut values: Vec<f64> = Vec::with_capacity(target);
        let mut vectors: Vec<Array1<f64>> = Vec::with_capacity(target);

        for round in 0..target {
            let Some((lambda, v, converged, residual)) = self.dominant_pair(&work) else {
                break;
            };

            let relative = values.first().map_or(0.0, |first| first * self.config.rank_tolerance);
            if lambda <= relative.max(noise_floor) || lambda <= 0.0 {
                tracing::debug!(round, eigenvalue = lambda, "remaining spectrum is numerically zero");
                break;
            }
            if !converged {
                tracing::warn!(
                    round,
                    residual,
                    max_iterations = self.config.max_iterations,
                    "power iteration hit the iteration cap; keeping best estimate"
                );
                warnings.push(SolverWarning::DidNotConverge { round, residual });
            }

            deflate(&mut work, lambda, &v);
            values.push(lambda);
            vectors.push(v);
        }

        if values.len() < k {
            warnings.push(SolverWarning::InsufficientRank {
                requested: k,
                found: values.len(),
            });
        }

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let sorted_values: Array1<f64> = order.iter().map(|&i| values[i]).collect();
        let mut sorted_vectors = Array2::<f64>::zeros((n, order.len()));
        for (col, &i) in order.iter().enumerate() {
            sorted_vectors.column_mut(col).assign(&vectors[i]);
        }

        tracing::debug!(
            requested = k,
            found = sorted_values.len(),
            warnings = warnings.len(),
            "eigensolver finished"
        );

        Ok(EigenDecomposition {
            values: sorted_values,
            vectors: sorted_vectors,
            warnings,
        })
    }

    /// Run one power iteration to convergence.
    ///
    /// Returns `(eigenvalue, unit eigenvector, converged, last residual)`, or
    /// `None` when the matrix annihilates the iterate (no spectrum left).
    fn dominant_pair(&self, c: &Array2<f64>) -> Option<(f64, Array1<f64>, bool, f64)> {
        let mut v = start_vector(c.nrows());
        let mut residual = f64::INFINITY;
        let mut converged = false;

        for _ in 0..self.config.max_iterations {
            let mut next = c.dot(&v);
            let norm = next.dot(&next).sqrt();
            if norm == 0.0 || !norm.is_finite() {
                return None;
            }
            next /= norm;

            // A negative eigenvalue flips the sign each step; compare both ways.
            let diff = (&next - &v).dot(&(&next - &v)).sqrt();
            let flipped = (&next + &v).dot(&(&next + &v)).sqrt();
            residual = diff.min(flipped);
            v = next;

            if residual < self.config.tolerance {
                converged = true;
                break;
            }
        }

        let lambda = v.dot(&c.dot(&v));
        Some((lambda, v, converged, residual))
    }
}

/// Deterministic, non-degenerate unit start vector.
fn start_vector(n: usize) -> Array1<f64> {
    let mut v = Array1::from_shape_fn(n, |i| 1.0 + START_PERTURBATION * ((i + 1) as f64).sin());
    let norm = v.dot(&v).sqrt();
    v /= norm;
    v
}

/// `C ← C − λ v vᵀ`.
fn deflate(c: &mut Array2<f64>, lambda: f64, v: &Array1<f64>) {
    let col = v.view().insert_axis(Axis(1));
    let row = v.view().insert_axis(Axis(0));
    let outer = col.dot(&row);
    c.scaled_add(-lambda, &outer);
}
