//! Eigenface recognizer.
//!
//! Centers a query on the model's mean face, projects it onto the eigenface
//! basis and ranks every training image by Euclidean distance in that space.

use crate::error::{EigenfaceError, Result};
use crate::types::{EuclideanMatcher, FaceVector, MatchResult, Matcher, TrainedModel};
use ndarray::Array1;

/// Coordinates of `query` in the model's eigenface space (length `K`).
pub fn project(query: &FaceVector, model: &TrainedModel) -> Result<Array1<f64>> {
    if query.len() != model.dimension() {
        return Err(EigenfaceError::DimensionMismatch {
            context: "query face vs model mean face",
            expected: model.dimension(),
            actual: query.len(),
        });
    }
    let centered = &query.view() - &model.mean_face();
    Ok(model.eigenfaces().t().dot(&centered))
}

/// Recognize `query` against `model` with the Euclidean matcher.
///
/// `accepted` is `best_distance < threshold`; `top_n` is clamped to the
/// number of training images.
pub fn recognize(
    query: &FaceVector,
    model: &TrainedModel,
    threshold: f64,
    top_n: usize,
) -> Result<MatchResult> {
    recognize_with(&EuclideanMatcher, query, model, threshold, top_n)
}

/// Recognize with a caller-chosen matching strategy.
pub fn recognize_with<M: Matcher + ?Sized>(
    matcher: &M,
    query: &FaceVector,
    model: &TrainedModel,
    threshold: f64,
    top_n: usize,
) -> Result<MatchResult> {
    if model.image_count() == 0 {
        return Err(EigenfaceError::EmptyModel);
    }
    let probe = project(query, model)?;
    let result = matcher.compare(probe.view(), model.projected(), model.labels(), threshold, top_n)?;

    tracing::debug!(
        accepted = result.accepted,
        label = %result.best_label,
        distance = result.best_distance,
        threshold,
        "recognition finished"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::train;
    use crate::types::TrainingCorpus;
    use ndarray::{array, Array2};

    fn model() -> TrainedModel {
        let mut corpus = TrainingCorpus::new();
        let faces = [
            ("ana", [220.0, 210.0, 40.0, 30.0, 120.0, 100.0]),
            ("ana", [200.0, 230.0, 50.0, 20.0, 110.0, 130.0]),
            ("budi", [30.0, 40.0, 210.0, 220.0, 90.0, 120.0]),
            ("budi", [50.0, 20.0, 230.0, 200.0, 140.0, 100.0]),
        ];
        for (label, face) in faces {
            corpus.push(FaceVector::from(face.to_vec()), label).unwrap();
        }
        train(&corpus, 3).unwrap()
    }

    #[test]
    fn test_self_match_is_exact() {
        let model = model();
        for i in 0..model.image_count() {
            let query = model.training_image(i).unwrap();
            let result = recognize(&query, &model, 1.0, 3).unwrap();
            assert!(result.accepted);
            assert_eq!(result.best_label, model.labels()[i]);
            assert!(result.best_distance < 1e-9, "distance {}", result.best_distance);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = recognize(&FaceVector::from(vec![1.0, 2.0]), &model(), 10.0, 3).unwrap_err();
        assert!(matches!(
            err,
            EigenfaceError::DimensionMismatch { expected: 6, actual: 2, .. }
        ));
    }

    #[test]
    fn test_empty_model() {
        let empty = TrainedModel::from_parts(
            array![0.0, 0.0],
            array![[1.0], [0.0]],
            array![1.0],
            Array2::zeros((1, 0)),
            Array2::zeros((2, 0)),
            Vec::new(),
        )
        .unwrap();
        let err = recognize(&FaceVector::from(vec![0.0, 0.0]), &empty, 10.0, 3).unwrap_err();
        assert!(matches!(err, EigenfaceError::EmptyModel));
    }

    #[test]
    fn test_threshold_monotonic() {
        let model = model();
        let query = FaceVector::from(vec![150.0, 140.0, 90.0, 80.0, 100.0, 100.0]);
        let mut seen_accept = false;
        for step in 0..200 {
            let threshold = step as f64 * 2.0;
            let result = recognize(&query, &model, threshold, 1).unwrap();
            if seen_accept {
                assert!(result.accepted, "rejected again at threshold {threshold}");
            }
            seen_accept |= result.accepted;
        }
        assert!(seen_accept);
    }

    #[test]
    fn test_rejected_still_reports_nearest() {
        let model = model();
        let query = FaceVector::from(vec![215.0, 215.0, 45.0, 25.0, 115.0, 115.0]);
        let result = recognize(&query, &model, 0.0, 2).unwrap();
        assert!(!result.accepted);
        assert_eq!(result.best_label, "ana");
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn test_projection_length_is_component_count() {
        let model = model();
        let p = project(&model.training_image(0).unwrap(), &model).unwrap();
        assert_eq!(p.len(), model.eigenface_count());
    }
}
