//! Shared, hot-swappable model reference.

use crate::error::Result;
use crate::recognizer;
use crate::types::{FaceVector, MatchResult, TrainedModel};
use std::sync::{Arc, PoisonError, RwLock};

/// Clone-safe handle to the currently loaded model.
///
/// Readers take an `Arc` snapshot and keep using it for the whole query, so a
/// concurrent [`replace`](Self::replace) never exposes a half-updated model.
#[derive(Clone)]
pub struct ModelHandle {
    current: Arc<RwLock<Arc<TrainedModel>>>,
}

impl ModelHandle {
    pub fn new(model: TrainedModel) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(model))),
        }
    }

    /// The model in effect right now.
    pub fn snapshot(&self) -> Arc<TrainedModel> {
        // The guarded value is a plain `Arc`; a poisoned lock cannot leave it torn.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new model, returning the previous one.
    pub fn replace(&self, model: TrainedModel) -> Arc<TrainedModel> {
        let next = Arc::new(model);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(
            images = next.image_count(),
            eigenfaces = next.eigenface_count(),
            "model replaced"
        );
        std::mem::replace(&mut *guard, next)
    }

    /// Recognize against a single consistent snapshot.
    pub fn recognize(&self, query: &FaceVector, threshold: f64, top_n: usize) -> Result<MatchResult> {
        let model = self.snapshot();
        recognizer::recognize(query, &model, threshold, top_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model(label: &str) -> TrainedModel {
        TrainedModel::from_parts(
            array![0.0, 0.0],
            array![[1.0], [0.0]],
            array![2.0],
            array![[1.0, -1.0]],
            array![[1.0, -1.0], [0.0, 0.0]],
            vec![label.to_string(), "other".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let handle = ModelHandle::new(model("before"));
        let held = handle.snapshot();

        let previous = handle.replace(model("after"));
        assert_eq!(previous.labels()[0], "before");
        assert_eq!(held.labels()[0], "before");
        assert_eq!(handle.snapshot().labels()[0], "after");
    }

    #[test]
    fn test_clones_share_state() {
        let handle = ModelHandle::new(model("before"));
        let clone = handle.clone();
        handle.replace(model("after"));

        let result = clone.recognize(&FaceVector::from(vec![1.0, 0.0]), 0.5, 1).unwrap();
        assert_eq!(result.best_label, "after");
    }

    #[test]
    fn test_concurrent_readers() {
        let handle = ModelHandle::new(model("a"));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let result = handle
                            .recognize(&FaceVector::from(vec![1.0, 0.0]), 0.5, 1)
                            .unwrap();
                        assert!(result.best_label == "a" || result.best_label == "b");
                    }
                })
            })
            .collect();
        handle.replace(model("b"));
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
