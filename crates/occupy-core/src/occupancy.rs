//! Occupancy threshold from the intersection of the solvent model with the
//! histogram of high-occupancy voxels.

use crate::diagnostics::{DiagnosticsSink, OccupancyCurves};
use crate::error::{Result, SolventError};
use crate::histogram::{Histogram, DEFAULT_N_LEV};
use crate::model::SolventModel;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Parameters for [`select_occupancy_threshold`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyThresholdParams {
    /// Voxels with a preliminary occupancy above this value are histogrammed.
    pub high_occupancy_cutoff: f64,
    /// Model count that must be strictly exceeded at the intersection bin.
    pub min_model_density: f64,
    /// Levels of the high-occupancy histogram.
    pub n_lev: usize,
}

impl Default for OccupancyThresholdParams {
    fn default() -> Self {
        Self {
            high_occupancy_cutoff: 0.9,
            min_model_density: 0.1,
            n_lev: DEFAULT_N_LEV,
        }
    }
}

/// Selected occupancy threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancyThreshold {
    /// Threshold in occupancy units (`boundary / full_occupancy_scale`).
    pub threshold: f64,
    /// Intensity at the left edge of the intersection bin.
    pub boundary: f64,
    pub bin: usize,
}

/// Intersect the solvent component of `model` with `high_occupancy`.
///
/// Walks from the second-to-last bin down to the first and stops at the first
/// bin whose count does not exceed the model (`data <= fit`) while the model
/// itself is above `min_model_density`. The last bin is never a candidate.
pub fn select_occupancy_threshold(
    model: &SolventModel,
    high_occupancy: &Histogram,
    full_occupancy_scale: f64,
    params: &OccupancyThresholdParams,
    sink: Option<&mut dyn DiagnosticsSink>,
) -> Result<OccupancyThreshold> {
    if !full_occupancy_scale.is_finite() || full_occupancy_scale <= 0.0 {
        return Err(SolventError::degenerate(format!(
            "full-occupancy scale must be positive and finite, got {full_occupancy_scale}"
        )));
    }

    let solvent = model.solvent();
    let left = high_occupancy.left_edges();
    let fit: Vec<f64> = left.iter().map(|&x| solvent.eval(x).max(0.0)).collect();
    let counts = high_occupancy.counts();

    let hit = (0..counts.len().saturating_sub(1))
        .rev()
        .find(|&i| counts[i] as f64 <= fit[i] && fit[i] > params.min_model_density);

    if let Some(s) = sink {
        s.occupancy_curves(&OccupancyCurves {
            bin_edges: high_occupancy.edges().to_vec(),
            counts: counts.to_vec(),
            fit: fit.clone(),
            boundary: hit.map(|i| left[i]),
        });
    }

    let Some(bin) = hit else {
        warn!(
            "solvent model never meets the high-occupancy histogram in {} bins",
            counts.len()
        );
        return Err(SolventError::OccupancyThresholdUndefined {
            bins: counts.len(),
            model: *model,
        });
    };

    let boundary = left[bin];
    let threshold = boundary / full_occupancy_scale;
    debug!("occupancy intersection at bin {bin}, intensity {boundary:.4}");
    info!("Occupancy threshold {threshold:.3}");
    Ok(OccupancyThreshold {
        threshold,
        boundary,
        bin,
    })
}

/// Histogram the samples whose occupancy exceeds the cutoff, then run
/// [`select_occupancy_threshold`].
pub fn occupancy_threshold_from_samples<T, O>(
    model: &SolventModel,
    samples: &[T],
    occupancy: &[O],
    full_occupancy_scale: f64,
    params: &OccupancyThresholdParams,
    sink: Option<&mut dyn DiagnosticsSink>,
) -> Result<OccupancyThreshold>
where
    T: Copy + Into<f64>,
    O: Copy + Into<f64>,
{
    if samples.len() != occupancy.len() {
        return Err(SolventError::degenerate(format!(
            "occupancy map has {} values for {} samples",
            occupancy.len(),
            samples.len()
        )));
    }
    let selected: Vec<f64> = samples
        .iter()
        .zip(occupancy)
        .filter(|&(_, &o)| Into::<f64>::into(o) > params.high_occupancy_cutoff)
        .map(|(&s, _)| s.into())
        .collect();
    debug!(
        "{} of {} samples above occupancy {}",
        selected.len(),
        samples.len(),
        params.high_occupancy_cutoff
    );
    let hist = Histogram::from_samples(&selected, params.n_lev)?;
    select_occupancy_threshold(model, &hist, full_occupancy_scale, params, sink)
}
