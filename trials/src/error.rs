use thiserror::Error;

/// Errors returned by trial-matrix operations.
#[derive(Debug, Error)]
pub enum TrialsError {
    #[error("duplicate identifier: {id}")]
    DuplicateIdentifier { id: String },

    #[error(
        "matrix shape {got_rows}x{got_cols} does not match catalogs {expected_rows}x{expected_cols}"
    )]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("identifier not found in catalog: {id}")]
    MissingIdentifier { id: String },

    #[error("conflicting labels for trial {model} {segment}")]
    LabelConflict { model: String, segment: String },

    #[error("missing scores for {count} required trials")]
    MissingScores {
        count: usize,
        /// The offending (model, segment) pairs, for diagnostics.
        missing: Vec<(String, String)>,
    },

    #[error("non-finite score {value} for trial {model} {segment}")]
    NonFiniteScore {
        model: String,
        segment: String,
        value: f64,
    },

    #[error("corrupt container: {reason}")]
    Corrupt { reason: String },

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results of trial-matrix operations.
pub type TrialsResult<T> = Result<T, TrialsError>;
