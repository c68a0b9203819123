//! Error types for re-ranking and evaluation.

use thiserror::Error;

/// Errors surfaced by the re-ranking pipeline and the ranking evaluation.
///
/// Configuration problems are reported by `validate()`/`build()` before any
/// matrix is touched; shape problems are precondition violations detected at
/// the entry of each operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RerankError {
    /// A parameter is outside its admissible range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Protocol name not recognised by the evaluator.
    #[error("unknown evaluation protocol `{0}` (expected one of: market1501, dukemtmc, cuhk03)")]
    UnknownProtocol(String),

    /// Query or gallery set is empty.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// Feature vectors of different lengths were mixed.
    #[error("dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A matrix does not match the label/item counts it is used with.
    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// An item identifier has no feature vector in the store.
    #[error("no feature vector stored for item `{0}`")]
    UnknownIdentifier(String),

    /// An identifier was inserted twice into the same collection.
    #[error("duplicate item identifier `{0}`")]
    DuplicateIdentifier(String),

    /// Every query lacks a valid gallery match, so no score can be averaged.
    #[error("no valid query: every query lacks a matching gallery item")]
    NoValidQuery,
}

impl RerankError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        RerankError::InvalidParameter { name, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, RerankError>;
