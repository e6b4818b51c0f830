//! Solvent/content decomposition of density-map intensity histograms.
//!
//! A masked volume's intensities are histogrammed, a Gaussian solvent model is
//! fitted to the dominant peak, and four solvent-range thresholds are derived
//! from where the model stops explaining the data. A second step intersects
//! the model with the histogram of high-occupancy voxels to pick an occupancy
//! threshold.
//!
//! The crate is pure computation: no I/O, no plotting. Intermediate curves are
//! available through [`DiagnosticsSink`].

mod diagnostics;
mod error;
mod fit;
mod guess;
mod histogram;
mod logger;
mod model;
mod occupancy;
mod scan;
mod solvent;

pub use diagnostics::{CurveRecorder, DiagnosticsSink, OccupancyCurves, SolventCurves};
pub use error::{Boundary, Result, SolventError};
pub use fit::{fit_model, FitOutcome, FitSpace, FitterParams};
pub use guess::{initial_guess, InitialGuess};
pub use histogram::{linspace, Histogram, DEFAULT_N_LEV};
pub use model::{GaussianComponent, ModelKind, SolventModel, CONTENT_LOBES, WIDTH_FLOOR};
pub use occupancy::{
    occupancy_threshold_from_samples, select_occupancy_threshold, OccupancyThreshold,
    OccupancyThresholdParams,
};
pub use scan::{scan_boundary, ScanDirection};
pub use solvent::{
    derive_boundaries, fit_solvent_histogram, fit_solvent_to_histogram, BoundaryIndices,
    FractionCurves, SolventFit, SolventFitParams, SolventRange, CONTENT_FRACTION_LIMIT,
    FRACTION_TOL, UNIT_DENSITY,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
