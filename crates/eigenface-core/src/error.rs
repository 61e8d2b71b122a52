//! Error taxonomy for the eigenface engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EigenfaceError {
    #[error("invalid image format: {0}")]
    InvalidImageFormat(String),
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("training corpus is empty: at least one labelled image is required")]
    EmptyCorpus,
    #[error("invalid eigenface count {0}: at least one component is required")]
    InvalidK(usize),
    #[error("insufficient rank: requested {requested} eigenpairs, found {found}")]
    InsufficientRank { requested: usize, found: usize },
    #[error("eigensolver did not converge in round {round} (residual {residual:.3e})")]
    EigensolverDidNotConverge { round: usize, residual: f64 },
    #[error("non-finite value in {0}")]
    NonFiniteInput(&'static str),
    #[error("model not found: {} (run `eigenface train` first)", .0.display())]
    ModelNotFound(PathBuf),
    #[error("corrupt model: {0}")]
    CorruptModel(String),
    #[error("model has no training images")]
    EmptyModel,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for eigenface operations.
pub type Result<T> = std::result::Result<T, EigenfaceError>;
