use crate::model::SolventModel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the four solvent-range boundary scans failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boundary {
    Low,
    MidLow,
    MidHigh,
    High,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Boundary::Low => "low",
            Boundary::MidLow => "mid-low",
            Boundary::MidHigh => "mid-high",
            Boundary::High => "high",
        };
        f.write_str(name)
    }
}

/// Errors returned by the solvent analysis core.
///
/// Every variant is terminal for the volume being analysed: nothing is
/// retried internally and no partial threshold set is ever returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolventError {
    #[error("degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("solvent peak decay not found (peak bin {peak_index} of {n_lev}, scale {scale})")]
    PeakDecayNotFound {
        peak_index: usize,
        n_lev: usize,
        /// Peak count the decay was measured against.
        scale: f64,
    },

    #[error("curve fit failed after {iterations} iterations: {reason} (params={params:?})")]
    FitConvergence {
        reason: String,
        iterations: usize,
        params: Vec<f64>,
    },

    /// `model` is the refined model when the scan ran inside a fit, `None`
    /// when only curves were supplied.
    #[error("{boundary} threshold limit not found, solvent fitted as larger than data domain? (model={model:?})")]
    ThresholdBoundaryNotFound {
        boundary: Boundary,
        model: Option<SolventModel>,
    },

    #[error("solvent range out of order: mid-low bin {mid_low} above mid-high bin {mid_high} (model={model:?})")]
    UnorderedSolventRange {
        mid_low: usize,
        mid_high: usize,
        model: Option<SolventModel>,
    },

    #[error("occupancy threshold undefined: no intersection in {bins} bins (model={model:?})")]
    OccupancyThresholdUndefined { bins: usize, model: SolventModel },
}

impl SolventError {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateInput {
            reason: reason.into(),
        }
    }

    /// Attach the refined model to a boundary failure raised from curves alone.
    pub(crate) fn with_model(self, fitted: SolventModel) -> Self {
        match self {
            Self::ThresholdBoundaryNotFound { boundary, .. } => Self::ThresholdBoundaryNotFound {
                boundary,
                model: Some(fitted),
            },
            Self::UnorderedSolventRange {
                mid_low, mid_high, ..
            } => Self::UnorderedSolventRange {
                mid_low,
                mid_high,
                model: Some(fitted),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SolventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_failures_take_the_refined_model() {
        let model = SolventModel::one(120.0, 0.2, 0.9);
        let err = SolventError::ThresholdBoundaryNotFound {
            boundary: Boundary::MidLow,
            model: None,
        }
        .with_model(model);
        assert_eq!(
            err,
            SolventError::ThresholdBoundaryNotFound {
                boundary: Boundary::MidLow,
                model: Some(model),
            }
        );
        assert!(err.to_string().starts_with("mid-low threshold limit not found"));
        assert!(err.to_string().contains("120.0"));

        let err = SolventError::UnorderedSolventRange {
            mid_low: 9,
            mid_high: 4,
            model: None,
        }
        .with_model(model);
        assert!(matches!(
            err,
            SolventError::UnorderedSolventRange {
                model: Some(m),
                ..
            } if m == model
        ));
    }

    #[test]
    fn other_failures_are_left_alone() {
        let err = SolventError::degenerate("empty").with_model(SolventModel::one(1.0, 0.0, 1.0));
        assert_eq!(err, SolventError::degenerate("empty"));
    }
}
