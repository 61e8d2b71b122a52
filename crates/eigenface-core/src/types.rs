use crate::error::{EigenfaceError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use std::collections::BTreeSet;

/// Flattened grayscale face, one value per pixel in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceVector {
    values: Array1<f64>,
}

impl FaceVector {
    pub fn new(values: Array1<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.values
    }
}

impl From<Vec<f64>> for FaceVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(Array1::from(values))
    }
}

/// Labelled training images, stacked column-wise into a `D × N` matrix.
///
/// Labels need not be unique: one person usually owns several columns.
#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    samples: Vec<FaceVector>,
    labels: Vec<String>,
}

impl TrainingCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one image. Every image must share the dimension of the first.
    pub fn push(&mut self, face: FaceVector, label: impl Into<String>) -> Result<()> {
        if let Some(first) = self.samples.first() {
            if face.len() != first.len() {
                return Err(EigenfaceError::DimensionMismatch {
                    context: "training corpus image",
                    expected: first.len(),
                    actual: face.len(),
                });
            }
        } else if face.is_empty() {
            return Err(EigenfaceError::DimensionMismatch {
                context: "training corpus image",
                expected: 1,
                actual: 0,
            });
        }
        self.samples.push(face);
        self.labels.push(label.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Pixel count per image, or 0 for an empty corpus.
    pub fn dimension(&self) -> usize {
        self.samples.first().map_or(0, FaceVector::len)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The `D × N` training matrix; column `i` belongs to `labels()[i]`.
    pub fn matrix(&self) -> Array2<f64> {
        let samples = &self.samples;
        Array2::from_shape_fn((self.dimension(), samples.len()), |(row, col)| {
            samples[col].values[row]
        })
    }
}

/// A trained eigenface model. Immutable once built.
///
/// Only constructible through [`TrainedModel::from_parts`], which rejects
/// inconsistent shapes, so every value of this type is safe to recognize
/// against.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    mean_face: Array1<f64>,
    /// `D × K`, orthonormal columns.
    eigenfaces: Array2<f64>,
    /// Length `K`, descending.
    eigenvalues: Array1<f64>,
    /// `K × N` coordinates of each training image in eigenface space.
    projected: Array2<f64>,
    /// `D × N` raw training matrix.
    training: Array2<f64>,
    labels: Vec<String>,
}

impl TrainedModel {
    pub fn from_parts(
        mean_face: Array1<f64>,
        eigenfaces: Array2<f64>,
        eigenvalues: Array1<f64>,
        projected: Array2<f64>,
        training: Array2<f64>,
        labels: Vec<String>,
    ) -> Result<Self> {
        let d = mean_face.len();
        let (basis_rows, k) = eigenfaces.dim();
        let (proj_rows, n) = projected.dim();
        let (train_rows, train_cols) = training.dim();

        if d == 0 {
            return Err(EigenfaceError::CorruptModel("mean face is empty".into()));
        }
        if k == 0 {
            return Err(EigenfaceError::CorruptModel("eigenface basis has no columns".into()));
        }
        let checks = [
            ("eigenface rows vs mean face length", d, basis_rows),
            ("eigenvalue count vs eigenface columns", k, eigenvalues.len()),
            ("projected rows vs eigenface columns", k, proj_rows),
            ("training rows vs mean face length", d, train_rows),
            ("training columns vs projected columns", n, train_cols),
            ("label count vs projected columns", n, labels.len()),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(EigenfaceError::CorruptModel(format!(
                    "{what}: expected {expected}, got {actual}"
                )));
            }
        }

        Ok(Self {
            mean_face,
            eigenfaces,
            eigenvalues,
            projected,
            training,
            labels,
        })
    }

    pub fn mean_face(&self) -> ArrayView1<'_, f64> {
        self.mean_face.view()
    }

    pub fn eigenfaces(&self) -> ArrayView2<'_, f64> {
        self.eigenfaces.view()
    }

    pub fn eigenvalues(&self) -> ArrayView1<'_, f64> {
        self.eigenvalues.view()
    }

    pub fn projected(&self) -> ArrayView2<'_, f64> {
        self.projected.view()
    }

    pub fn training(&self) -> ArrayView2<'_, f64> {
        self.training.view()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Pixel count `D`.
    pub fn dimension(&self) -> usize {
        self.mean_face.len()
    }

    /// Number of distinct people.
    pub fn label_count(&self) -> usize {
        self.labels.iter().collect::<BTreeSet<_>>().len()
    }

    /// Number of training images `N`.
    pub fn image_count(&self) -> usize {
        self.labels.len()
    }

    /// Number of eigenfaces `K`.
    pub fn eigenface_count(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Raw training image at column `index`.
    pub fn training_image(&self, index: usize) -> Option<FaceVector> {
        (index < self.image_count()).then(|| FaceVector::new(self.training.column(index).to_owned()))
    }

    /// Eigenface `index`, shaped like a face vector for display.
    pub fn eigenface(&self, index: usize) -> Option<FaceVector> {
        (index < self.eigenface_count())
            .then(|| FaceVector::new(self.eigenfaces.column(index).to_owned()))
    }

    /// Column index of the first training image carrying `label`.
    pub fn first_index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

/// One entry of the ranked candidate list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub distance: f64,
    pub label: String,
    /// Column of the training matrix this candidate came from.
    pub index: usize,
}

/// Result of matching a query against a trained model.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// `best_distance < threshold`.
    pub accepted: bool,
    /// Nearest label, reported even when rejected.
    pub best_label: String,
    pub best_distance: f64,
    pub best_index: usize,
    pub threshold: f64,
    /// Nearest first, at most `top_n` entries.
    pub candidates: Vec<Candidate>,
}

impl MatchResult {
    pub fn confidence(&self) -> Confidence {
        Confidence::from_distance(self.best_distance)
    }
}

/// Display band for an eigenspace distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryHigh,
    High,
    Moderate,
}

impl Confidence {
    const VERY_HIGH_BELOW: f64 = 10.0;
    const HIGH_BELOW: f64 = 15.0;

    pub fn from_distance(distance: f64) -> Self {
        if distance < Self::VERY_HIGH_BELOW {
            Confidence::VeryHigh
        } else if distance < Self::HIGH_BELOW {
            Confidence::High
        } else {
            Confidence::Moderate
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Confidence::VeryHigh => "very high",
            Confidence::High => "high",
            Confidence::Moderate => "moderate",
        })
    }
}

/// Strategy for comparing a projected probe against projected gallery columns.
pub trait Matcher {
    fn compare(
        &self,
        probe: ArrayView1<'_, f64>,
        gallery: ArrayView2<'_, f64>,
        labels: &[String],
        threshold: f64,
        top_n: usize,
    ) -> Result<MatchResult>;
}

/// Euclidean nearest-neighbour matcher.
///
/// Ranks every gallery column with a stable sort, so equal distances keep
/// training order and the earliest column wins a tie.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: ArrayView1<'_, f64>,
        gallery: ArrayView2<'_, f64>,
        labels: &[String],
        threshold: f64,
        top_n: usize,
    ) -> Result<MatchResult> {
        if gallery.ncols() == 0 {
            return Err(EigenfaceError::EmptyModel);
        }
        if probe.len() != gallery.nrows() {
            return Err(EigenfaceError::DimensionMismatch {
                context: "projected query",
                expected: gallery.nrows(),
                actual: probe.len(),
            });
        }
        if labels.len() != gallery.ncols() {
            return Err(EigenfaceError::DimensionMismatch {
                context: "gallery labels",
                expected: gallery.ncols(),
                actual: labels.len(),
            });
        }

        let mut ranked: Vec<(f64, usize)> = gallery
            .columns()
            .into_iter()
            .enumerate()
            .map(|(i, column)| {
                let dist = probe
                    .iter()
                    .zip(column.iter())
                    .map(|(p, c)| (p - c).powi(2))
                    .sum::<f64>()
                    .sqrt();
                (dist, i)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (best_distance, best_index) = ranked[0];
        let candidates = ranked
            .iter()
            .take(top_n.min(ranked.len()))
            .map(|&(distance, index)| Candidate {
                distance,
                label: labels[index].clone(),
                index,
            })
            .collect();

        Ok(MatchResult {
            accepted: best_distance < threshold,
            best_label: labels[best_index].clone(),
            best_distance,
            best_index,
            threshold,
            candidates,
        })
    }
}
