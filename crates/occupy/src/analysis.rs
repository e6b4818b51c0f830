//! End-to-end solvent and occupancy analysis of one volume.

use crate::error::AnalysisError;
use crate::volume::VolumeView;
use log::info;
use occupy_core::{
    fit_solvent_to_histogram, occupancy_threshold_from_samples, CurveRecorder, DiagnosticsSink,
    OccupancyThreshold, OccupancyThresholdParams, SolventFit, SolventFitParams,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-voxel occupancy aligned with a volume, plus the intensity that
/// corresponds to full occupancy.
#[derive(Clone, Debug, PartialEq)]
pub struct OccupancyEstimate {
    pub map: Vec<f32>,
    pub full_occupancy_scale: f64,
}

/// Source of a preliminary occupancy map.
///
/// Computing local occupancy (kernel statistics over the map) lives outside
/// this crate; implementors hand over its result.
pub trait OccupancyEstimator {
    fn estimate(&self, volume: &VolumeView<'_>) -> Result<OccupancyEstimate, AnalysisError>;
}

/// Occupancy map computed elsewhere and loaded as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecomputedOccupancy {
    estimate: OccupancyEstimate,
}

impl PrecomputedOccupancy {
    pub fn new(map: Vec<f32>, full_occupancy_scale: f64) -> Self {
        Self {
            estimate: OccupancyEstimate {
                map,
                full_occupancy_scale,
            },
        }
    }
}

impl OccupancyEstimator for PrecomputedOccupancy {
    fn estimate(&self, volume: &VolumeView<'_>) -> Result<OccupancyEstimate, AnalysisError> {
        if self.estimate.map.len() != volume.data.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: "occupancy map",
                expected: volume.data.len(),
                got: self.estimate.map.len(),
            });
        }
        Ok(self.estimate.clone())
    }
}

/// Parameters of a full analysis run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub solvent: SolventFitParams,
    pub occupancy: OccupancyThresholdParams,
}

/// Everything one run produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Voxels inside the region of interest.
    pub n_samples: usize,
    pub solvent: SolventFit,
    #[serde(default)]
    pub occupancy: Option<OccupancyThreshold>,
    #[serde(default)]
    pub diagnostics: Option<CurveRecorder>,
}

/// Sequences histogram, fit, solvent range and occupancy threshold.
#[derive(Clone, Debug, Default)]
pub struct SolventAnalysis {
    params: AnalysisParams,
}

impl SolventAnalysis {
    pub fn new(params: AnalysisParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    /// Analyse the voxels of `volume` selected by `mask`.
    ///
    /// The solvent model is fitted to the masked voxels only. The occupancy
    /// threshold, when an estimator is given, is taken from every voxel whose
    /// preliminary occupancy exceeds the cutoff.
    pub fn run(
        &self,
        volume: VolumeView<'_>,
        mask: &[bool],
        occupancy: Option<&dyn OccupancyEstimator>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.run_inner(volume, mask, occupancy, None)
    }

    /// Like [`SolventAnalysis::run`], recording every intermediate curve in
    /// the outcome.
    pub fn run_with_diagnostics(
        &self,
        volume: VolumeView<'_>,
        mask: &[bool],
        occupancy: Option<&dyn OccupancyEstimator>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let mut recorder = CurveRecorder::default();
        let mut outcome = self.run_inner(volume, mask, occupancy, Some(&mut recorder))?;
        outcome.diagnostics = Some(recorder);
        Ok(outcome)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(dims = ?volume.dims))
    )]
    fn run_inner(
        &self,
        volume: VolumeView<'_>,
        mask: &[bool],
        occupancy: Option<&dyn OccupancyEstimator>,
        mut sink: Option<&mut dyn DiagnosticsSink>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let samples = volume.masked_samples(mask)?;
        if samples.is_empty() {
            return Err(AnalysisError::EmptyMask);
        }
        info!(
            "fitting solvent model to {} of {} voxels",
            samples.len(),
            volume.data.len()
        );

        let solvent = fit_solvent_to_histogram(&samples, &self.params.solvent, reborrow(&mut sink))?;
        info!(
            "Solvent limits are {:.4} to {:.4}. The latter is a recommended threshold.",
            solvent.range.low, solvent.range.high
        );

        let occupancy = match occupancy {
            Some(estimator) => {
                let estimate = estimator.estimate(&volume)?;
                let threshold = occupancy_threshold_from_samples(
                    &solvent.model,
                    volume.data,
                    &estimate.map,
                    estimate.full_occupancy_scale,
                    &self.params.occupancy,
                    reborrow(&mut sink),
                )?;
                Some(threshold)
            }
            None => None,
        };

        Ok(AnalysisOutcome {
            n_samples: samples.len(),
            solvent,
            occupancy,
            diagnostics: None,
        })
    }
}

fn reborrow<'s>(
    sink: &'s mut Option<&mut dyn DiagnosticsSink>,
) -> Option<&'s mut dyn DiagnosticsSink> {
    sink.as_mut().map(|s| &mut **s as &mut dyn DiagnosticsSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::spherical_mask;
    use crate::volume::Volume;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    const DIMS: [usize; 3] = [24, 24, 24];

    // N(0,1) solvent with a N(5, 0.5) ball of content in the middle.
    fn synthetic_volume(seed: u64) -> (Volume, Vec<bool>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let solvent = Normal::new(0.0f32, 1.0).unwrap();
        let content = Normal::new(5.0f32, 0.5).unwrap();
        let is_content = spherical_mask(DIMS, 5.0);
        let data = is_content
            .iter()
            .map(|&c| {
                if c {
                    content.sample(&mut rng)
                } else {
                    solvent.sample(&mut rng)
                }
            })
            .collect();
        (Volume::new(DIMS, 1.0, data).unwrap(), is_content)
    }

    fn params() -> AnalysisParams {
        let mut params = AnalysisParams::default();
        params.solvent.n_lev = 100;
        params.occupancy.n_lev = 100;
        params
    }

    #[test]
    fn fits_masked_voxels() {
        let (vol, _) = synthetic_volume(1);
        let mask = vec![true; vol.len()];
        let out = SolventAnalysis::new(params())
            .run(vol.view(), &mask, None)
            .expect("analysis");
        assert_eq!(out.n_samples, vol.len());
        let s = out.solvent.model.solvent();
        assert!(s.center.abs() < 0.2, "center {}", s.center);
        assert!(out.solvent.range.is_ordered());
        assert!(out.occupancy.is_none());
        assert!(out.diagnostics.is_none());
    }

    #[test]
    fn occupancy_threshold_from_precomputed_map() {
        let (vol, is_content) = synthetic_volume(2);
        // content is fully occupied, one in ten solvent voxels spills over
        let map: Vec<f32> = is_content
            .iter()
            .enumerate()
            .map(|(i, &c)| if c || i % 10 == 0 { 1.0 } else { 0.3 })
            .collect();
        let estimator = PrecomputedOccupancy::new(map, 4.0);
        let mask = vec![true; vol.len()];

        let out = SolventAnalysis::new(params())
            .run_with_diagnostics(vol.view(), &mask, Some(&estimator))
            .expect("analysis");
        let occ = out.occupancy.expect("occupancy threshold");
        assert_relative_eq!(occ.threshold, occ.boundary / 4.0);
        assert!(occ.boundary > 0.0 && occ.boundary < 5.0, "boundary {}", occ.boundary);

        let diag = out.diagnostics.expect("diagnostics");
        assert!(diag.solvent.is_some());
        assert_eq!(diag.range, Some(out.solvent.range));
        assert_eq!(diag.occupancy.map(|o| o.boundary), Some(Some(occ.boundary)));
    }

    #[test]
    fn empty_mask_is_rejected() {
        let (vol, _) = synthetic_volume(3);
        let mask = vec![false; vol.len()];
        let err = SolventAnalysis::default()
            .run(vol.view(), &mask, None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyMask));
    }

    #[test]
    fn occupancy_map_must_match_volume() {
        let (vol, _) = synthetic_volume(4);
        let estimator = PrecomputedOccupancy::new(vec![1.0; 10], 1.0);
        let mask = vec![true; vol.len()];
        let err = SolventAnalysis::new(params())
            .run(vol.view(), &mask, Some(&estimator))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ShapeMismatch {
                what: "occupancy map",
                ..
            }
        ));
    }
}
