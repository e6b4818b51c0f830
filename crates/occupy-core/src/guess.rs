//! Geometric seed for the solvent fit, read straight off the histogram.

use crate::error::{Result, SolventError};
use crate::histogram::Histogram;
use crate::model::{GaussianComponent, ModelKind, SolventModel, CONTENT_LOBES};
use log::debug;
use serde::{Deserialize, Serialize};

/// Fraction of the full data range used as the content width seed.
const CONTENT_WIDTH_DIVISOR: f64 = 20.0;

/// Initial parameters for the optimizer together with the area estimate they imply.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub model: SolventModel,
    /// Bin index of the solvent peak.
    pub peak_index: usize,
    /// Area under the guessed solvent peak, in samples.
    pub solvent_volume: f64,
    /// `solvent_volume` relative to the sample count.
    pub solvent_fraction: f64,
}

/// Estimate the solvent peak without fitting.
///
/// Scale is the largest count, center the left edge of that bin, width the
/// distance (in bins, times the bin width) at which the counts first drop
/// below `scale / e`. For two components, a broad content term is seeded at
/// the solvent center with a width of 1/20 of the data range. The multi-lobe
/// model splits that seed over its lobes, spread over twice the content width.
pub fn initial_guess(hist: &Histogram, kind: ModelKind) -> Result<InitialGuess> {
    let counts = hist.counts();
    let n_lev = hist.n_lev();
    let d_domain = hist.bin_width();

    let peak_index = hist.argmax();
    let scale = counts[peak_index] as f64;
    let center = hist.edges()[peak_index];

    let decay = scale / std::f64::consts::E;
    let decay_index = (peak_index..n_lev)
        .find(|&i| (counts[i] as f64) < decay)
        .ok_or(SolventError::PeakDecayNotFound {
            peak_index,
            n_lev,
            scale,
        })?;

    let width = (decay_index - peak_index) as f64 * d_domain;
    let solvent = GaussianComponent::new(scale, center, width);

    let solvent_volume = scale * (width / d_domain) * (2.0 * std::f64::consts::PI).sqrt();
    let total = hist.total().max(1) as f64;
    let solvent_fraction = solvent_volume / total;

    let content_width = (hist.max() - hist.min()) / CONTENT_WIDTH_DIVISOR;
    let content_scale = counts[hist.bin_of(center)] as f64;
    let model = match kind {
        ModelKind::OneComponent => SolventModel::OneComponent { solvent },
        ModelKind::TwoComponent => SolventModel::two(
            solvent,
            GaussianComponent::new(content_scale, center, content_width),
        ),
        // the lobes share the content seed between them
        ModelKind::MultiLobe => SolventModel::multi_lobe(
            solvent,
            GaussianComponent::new(
                content_scale / CONTENT_LOBES as f64,
                center,
                content_width,
            ),
            2.0 * content_width,
        ),
    };

    debug!(
        "solvent guess: peak bin {peak_index}, scale {scale:.1}, center {center:.4}, width {width:.4} \
         ({:.1}% of samples)",
        100.0 * solvent_fraction
    );

    Ok(InitialGuess {
        model,
        peak_index,
        solvent_volume,
        solvent_fraction,
    })
}
