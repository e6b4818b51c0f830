//! Solvent model fit and solvent-range threshold derivation.
//!
//! The histogram of a masked volume is dominated by a solvent peak. After
//! fitting a Gaussian solvent model, four intensities are derived from it:
//!
//! - `low`: lowest intensity where the model reaches unit density,
//! - `mid_low`: first intensity above `low` where the model count reaches the
//!   observed count,
//! - `mid_high`: highest intensity where the content fraction is at most 1%,
//!   capped at `high`,
//! - `high`: highest intensity where the model reaches unit density.
//!
//! `high` is the usual recommended display threshold for the map.

use crate::diagnostics::{DiagnosticsSink, SolventCurves};
use crate::error::{Boundary, Result, SolventError};
use crate::fit::{fit_model, FitOutcome, FitterParams};
use crate::guess::initial_guess;
use crate::histogram::{Histogram, DEFAULT_N_LEV};
use crate::model::{ModelKind, SolventModel};
use crate::scan::scan_boundary;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Floor added to counts (and, squared, to the model) in fraction curves.
pub const FRACTION_TOL: f64 = 1e-3;

/// Model density that marks the outer solvent boundaries.
pub const UNIT_DENSITY: f64 = 1.0;

/// Content fraction at or below which a bin counts as fully explained by solvent.
pub const CONTENT_FRACTION_LIMIT: f64 = 0.01;

/// Parameters for [`fit_solvent_to_histogram`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolventFitParams {
    /// Number of histogram levels.
    pub n_lev: usize,
    /// Model shape to fit.
    pub components: ModelKind,
    pub fitter: FitterParams,
}

impl Default for SolventFitParams {
    fn default() -> Self {
        Self {
            n_lev: DEFAULT_N_LEV,
            components: ModelKind::OneComponent,
            fitter: FitterParams::default(),
        }
    }
}

/// Ordered solvent boundaries in intensity units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolventRange {
    pub low: f64,
    pub mid_low: f64,
    pub mid_high: f64,
    pub high: f64,
}

impl SolventRange {
    pub fn to_array(&self) -> [f64; 4] {
        [self.low, self.mid_low, self.mid_high, self.high]
    }

    pub fn is_ordered(&self) -> bool {
        self.low <= self.mid_low && self.mid_low <= self.mid_high && self.mid_high <= self.high
    }
}

/// Bin indices of the four solvent boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryIndices {
    pub low: usize,
    pub mid_low: usize,
    pub mid_high: usize,
    pub high: usize,
}

impl BoundaryIndices {
    /// Map indices to the left edges of their bins.
    pub fn to_range(&self, edges: &[f64]) -> SolventRange {
        SolventRange {
            low: edges[self.low],
            mid_low: edges[self.mid_low],
            mid_high: edges[self.mid_high],
            high: edges[self.high],
        }
    }
}

/// Per-bin fractions of solvent and content implied by a model curve.
#[derive(Clone, Debug, PartialEq)]
pub struct FractionCurves {
    /// Model curve clamped to `[FRACTION_TOL^2, max(model)]`.
    pub fit: Vec<f64>,
    pub content: Vec<f64>,
    pub solvent: Vec<f64>,
}

impl FractionCurves {
    /// `content = (data + tol - fit) / (data + tol)`, `solvent = 1 - content`.
    pub fn new(model_curve: &[f64], data: &[f64]) -> Self {
        let floor = FRACTION_TOL * FRACTION_TOL;
        let ceil = model_curve.iter().copied().fold(floor, f64::max);
        let fit: Vec<f64> = model_curve.iter().map(|&m| m.clamp(floor, ceil)).collect();
        let content: Vec<f64> = fit
            .iter()
            .zip(data)
            .map(|(&f, &a)| (a + FRACTION_TOL - f) / (a + FRACTION_TOL))
            .collect();
        let solvent = content.iter().map(|&c| 1.0 - c).collect();
        Self {
            fit,
            content,
            solvent,
        }
    }
}

/// Result of a successful solvent analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolventFit {
    /// Refined model.
    pub model: SolventModel,
    /// Starting point handed to the optimizer.
    pub guess: SolventModel,
    pub range: SolventRange,
    pub indices: BoundaryIndices,
    /// Model volume relative to the sample count.
    pub solvent_fraction: f64,
    pub content_fraction: f64,
    pub fit: FitOutcome,
}

/// Derive the four solvent boundaries from a model curve and the observed
/// counts, both sampled on the same `n_lev` bins.
///
/// `high` and `mid_high` are searched downward from the last bin, `low`
/// upward from the first and `mid_low` upward from `low`. A scan that reaches
/// its far end fails with [`SolventError::ThresholdBoundaryNotFound`].
/// `mid_high` is capped at `high`; a `mid_low` above the capped `mid_high` is
/// reported as [`SolventError::UnorderedSolventRange`].
pub fn derive_boundaries(model_curve: &[f64], data: &[f64]) -> Result<BoundaryIndices> {
    let n = model_curve.len();
    if n < 2 || data.len() != n {
        return Err(SolventError::degenerate(format!(
            "boundary scan needs at least two aligned bins (model {n}, data {})",
            data.len()
        )));
    }
    let fractions = FractionCurves::new(model_curve, data);
    boundaries_from_fractions(model_curve, data, &fractions)
}

fn boundaries_from_fractions(
    model_curve: &[f64],
    data: &[f64],
    fractions: &FractionCurves,
) -> Result<BoundaryIndices> {
    let n = model_curve.len();
    let not_found = |boundary: Boundary| {
        warn!("{boundary} solvent boundary not found in {n} bins");
        SolventError::ThresholdBoundaryNotFound {
            boundary,
            model: None,
        }
    };

    let high = scan_boundary(n - 1, 0, |i| model_curve[i] >= UNIT_DENSITY)
        .ok_or_else(|| not_found(Boundary::High))?;
    let low = scan_boundary(0, n - 1, |i| model_curve[i] >= UNIT_DENSITY)
        .ok_or_else(|| not_found(Boundary::Low))?;
    let mid_high = scan_boundary(n - 1, 0, |i| {
        fractions.content[i] <= CONTENT_FRACTION_LIMIT
    })
    .ok_or_else(|| not_found(Boundary::MidHigh))?
    .min(high);
    let mid_low = scan_boundary(low, n - 1, |i| fractions.fit[i] >= data[i])
        .ok_or_else(|| not_found(Boundary::MidLow))?;

    if mid_low > mid_high {
        warn!("mid-low bin {mid_low} lies above mid-high bin {mid_high}");
        return Err(SolventError::UnorderedSolventRange {
            mid_low,
            mid_high,
            model: None,
        });
    }

    Ok(BoundaryIndices {
        low,
        mid_low,
        mid_high,
        high,
    })
}

/// Histogram `samples`, fit the solvent model and derive the solvent range.
pub fn fit_solvent_to_histogram<T>(
    samples: &[T],
    params: &SolventFitParams,
    sink: Option<&mut dyn DiagnosticsSink>,
) -> Result<SolventFit>
where
    T: Copy + Into<f64>,
{
    let hist = Histogram::from_samples(samples, params.n_lev)?;
    fit_solvent_histogram(&hist, params, sink)
}

/// Fit the solvent model to an existing histogram and derive the solvent range.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(hist, params, sink), fields(n_lev = hist.n_lev()))
)]
pub fn fit_solvent_histogram(
    hist: &Histogram,
    params: &SolventFitParams,
    mut sink: Option<&mut dyn DiagnosticsSink>,
) -> Result<SolventFit> {
    if hist.n_lev() < 2 {
        return Err(SolventError::degenerate(
            "solvent fit needs at least two histogram levels",
        ));
    }

    let guess = initial_guess(hist, params.components)?;
    let domain = hist.domain();
    let data = hist.counts_f64();

    let fit = fit_model(&domain, &data, guess.model, &params.fitter)?;
    let model = fit.model;
    let model_curve = model.eval_many(&domain);
    let fractions = FractionCurves::new(&model_curve, &data);

    if let Some(s) = sink.as_deref_mut() {
        s.solvent_curves(&SolventCurves {
            bin_edges: hist.edges().to_vec(),
            counts: hist.counts().to_vec(),
            domain: domain.clone(),
            guess: guess.model.eval_many(&domain),
            fit: fractions.fit.clone(),
            solvent_fraction: fractions.solvent.clone(),
            content_fraction: fractions.content.clone(),
        });
    }

    let total = hist.total().max(1) as f64;
    let solvent_fraction = model_curve.iter().sum::<f64>() / total;
    let content_fraction = 1.0 - solvent_fraction;
    info!(
        "Revised estimate is {:.1}% solvent and {:.1}% content",
        100.0 * solvent_fraction,
        100.0 * content_fraction
    );

    let indices = boundaries_from_fractions(&model_curve, &data, &fractions)
        .map_err(|err| err.with_model(model))?;
    let range = indices.to_range(hist.edges());

    let solvent = model.solvent();
    debug!(
        "solvent peak {:.4}, width {:.4} ({:.2} bins), scale {:.1}",
        solvent.center,
        solvent.width,
        solvent.width / hist.bin_width(),
        solvent.scale
    );
    info!(
        "solvent limits {:.4} : {:.4} : {:.4} : {:.4}",
        range.low, range.mid_low, range.mid_high, range.high
    );

    if let Some(s) = sink.as_deref_mut() {
        s.solvent_range(&range);
    }

    Ok(SolventFit {
        model,
        guess: guess.model,
        range,
        indices,
        solvent_fraction,
        content_fraction,
        fit,
    })
}
