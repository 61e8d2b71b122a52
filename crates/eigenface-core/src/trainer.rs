//! Eigenface model builder.
//!
//! Works in sample space: with `D ≫ N` the `N × N` Gram matrix `X_cᵀ X_c`
//! shares its non-zero spectrum with the `D × D` covariance `X_c X_cᵀ`, and a
//! dual eigenvector `u` maps to the eigenface `X_c u / ‖X_c u‖`.

use crate::eigensolver::{PowerIteration, SolverConfig, SolverWarning};
use crate::error::{EigenfaceError, Result};
use crate::types::{TrainedModel, TrainingCorpus};
use ndarray::{Array2, Axis};

/// Knobs for a training run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainOptions {
    pub solver: SolverConfig,
    /// Abort on solver warnings (rank deficiency, non-convergence) instead of
    /// keeping the best estimate.
    pub strict: bool,
}

/// A trained model plus whatever the solver had to compromise on.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub warnings: Vec<SolverWarning>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trainer {
    options: TrainOptions,
}

impl Trainer {
    pub fn new(options: TrainOptions) -> Self {
        Self { options }
    }

    /// Train and keep only the model.
    pub fn train(&self, corpus: &TrainingCorpus, k: usize) -> Result<TrainedModel> {
        self.fit(corpus, k).map(|outcome| outcome.model)
    }

    /// Build a model with up to `k` eigenfaces.
    pub fn fit(&self, corpus: &TrainingCorpus, k: usize) -> Result<TrainingOutcome> {
        if corpus.is_empty() {
            return Err(EigenfaceError::EmptyCorpus);
        }
        if k < 1 {
            return Err(EigenfaceError::InvalidK(k));
        }

        let x = corpus.matrix();
        let (d, n) = x.dim();
        tracing::info!(images = n, dimension = d, components = k, "training eigenface model");

        let mean = x.mean_axis(Axis(1)).ok_or(EigenfaceError::EmptyCorpus)?;
        let centered = &x - &mean.view().insert_axis(Axis(1));

        let gram = centered.t().dot(&centered);
        // Centering leaves rounding residue proportional to the raw pixel
        // energy, so the floor scales with `‖X‖²`, not with the Gram matrix.
        let energy: f64 = x.iter().map(|v| v * v).sum();
        let noise_floor = self.options.solver.rank_tolerance * energy;
        let mut eig =
            PowerIteration::new(self.options.solver).solve_above(gram.view(), k, noise_floor)?;
        if self.options.strict {
            eig = eig.into_strict()?;
        } else {
            for warning in &eig.warnings {
                tracing::warn!(?warning, "eigensolver degraded; continuing with best estimate");
            }
        }
        if eig.is_empty() {
            return Err(EigenfaceError::InsufficientRank {
                requested: k,
                found: 0,
            });
        }

        let mut eigenfaces = Array2::<f64>::zeros((d, eig.len()));
        for (i, u) in eig.vectors.columns().into_iter().enumerate() {
            let mut face = centered.dot(&u);
            let norm = face.dot(&face).sqrt();
            if norm > 0.0 {
                face /= norm;
            }
            eigenfaces.column_mut(i).assign(&face);
        }

        let projected = eigenfaces.t().dot(&centered);

        tracing::info!(
            eigenfaces = eig.len(),
            leading_eigenvalue = eig.values[0],
            people = corpus.labels().iter().collect::<std::collections::BTreeSet<_>>().len(),
            "eigenface model trained"
        );

        let model = TrainedModel::from_parts(
            mean,
            eigenfaces,
            eig.values,
            projected,
            x,
            corpus.labels().to_vec(),
        )?;

        Ok(TrainingOutcome {
            model,
            warnings: eig.warnings,
        })
    }
}

/// Train with default solver settings, tolerating solver warnings.
pub fn train(corpus: &TrainingCorpus, k: usize) -> Result<TrainedModel> {
    Trainer::default().train(corpus, k)
}
