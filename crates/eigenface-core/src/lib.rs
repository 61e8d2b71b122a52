//! eigenface-core — Eigenface face recognition engine.
//!
//! Trains a PCA face space with a power-iteration eigensolver over the dual
//! (Gram) matrix, persists it, and recognizes queries by nearest neighbour in
//! that space with a distance threshold.

pub mod eigensolver;
pub mod error;
pub mod handle;
pub mod recognizer;
pub mod store;
pub mod trainer;
pub mod types;
pub mod vectorizer;

pub use eigensolver::{EigenDecomposition, PowerIteration, SolverConfig, SolverWarning};
pub use error::{EigenfaceError, Result};
pub use handle::ModelHandle;
pub use recognizer::{project, recognize, recognize_with};
pub use store::{load, read_manifest, save, ModelManifest};
pub use trainer::{train, TrainOptions, Trainer, TrainingOutcome};
pub use types::{
    Candidate, Confidence, EuclideanMatcher, FaceVector, MatchResult, Matcher, TrainedModel,
    TrainingCorpus,
};
pub use vectorizer::Vectorizer;
