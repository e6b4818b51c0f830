use occupy_core::SolventError;

/// Errors produced by the analysis driver.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Solvent(#[from] SolventError),

    #[error("{what} size mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid volume: {reason}")]
    InvalidVolume { reason: String },

    #[error("invalid config: {reason}")]
    Config { reason: String },

    #[error("mask selects no voxels")]
    EmptyMask,
}
