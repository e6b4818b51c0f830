//! Optional diagnostics side channel.
//!
//! The analysis never draws anything itself. Callers that want plots pass a
//! [`DiagnosticsSink`] and receive the intermediate curves as plain data.

use crate::solvent::SolventRange;
use serde::{Deserialize, Serialize};

/// Curves produced while fitting the solvent model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolventCurves {
    /// Histogram edges (`n_lev + 1`).
    pub bin_edges: Vec<f64>,
    /// Histogram counts (`n_lev`).
    pub counts: Vec<u64>,
    /// Fitting domain (`n_lev` points spanning the data range).
    pub domain: Vec<f64>,
    /// Initial guess evaluated on the domain.
    pub guess: Vec<f64>,
    /// Fitted model on the domain, clamped to the fraction floor.
    pub fit: Vec<f64>,
    pub solvent_fraction: Vec<f64>,
    pub content_fraction: Vec<f64>,
}

/// Curves produced while intersecting the model with high-occupancy voxels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancyCurves {
    pub bin_edges: Vec<f64>,
    /// Counts of high-occupancy voxels.
    pub counts: Vec<u64>,
    /// Solvent model evaluated at the left bin edges.
    pub fit: Vec<f64>,
    /// Intersection intensity, if one was found.
    pub boundary: Option<f64>,
}

/// Receiver for intermediate analysis data. All methods default to no-ops.
pub trait DiagnosticsSink {
    fn solvent_curves(&mut self, _curves: &SolventCurves) {}

    fn solvent_range(&mut self, _range: &SolventRange) {}

    fn occupancy_curves(&mut self, _curves: &OccupancyCurves) {}
}

/// Sink that keeps the most recent curves of each kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveRecorder {
    pub solvent: Option<SolventCurves>,
    pub range: Option<SolventRange>,
    pub occupancy: Option<OccupancyCurves>,
}

impl DiagnosticsSink for CurveRecorder {
    fn solvent_curves(&mut self, curves: &SolventCurves) {
        self.solvent = Some(curves.clone());
    }

    fn solvent_range(&mut self, range: &SolventRange) {
        self.range = Some(*range);
    }

    fn occupancy_curves(&mut self, curves: &OccupancyCurves) {
        self.occupancy = Some(curves.clone());
    }
}
