//! JSON configuration and report helpers for the analysis runner.

use crate::analysis::{AnalysisOutcome, AnalysisParams, PrecomputedOccupancy};
use crate::error::AnalysisError;
use crate::mask::{default_mask_radius, exclude_solvent, spherical_mask};
use crate::volume::{read_raw_f32, Volume};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

fn default_voxel_size() -> f64 {
    1.0
}

/// Configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Raw little-endian `f32` volume.
    pub volume_path: String,
    /// `[nz, ny, nx]`.
    pub dims: [usize; 3],
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f64,
    /// Raw `f32` map, 1 at solvent; those voxels are left out of the fit.
    #[serde(default)]
    pub solvent_mask_path: Option<String>,
    /// Mask radius in voxels; defaults to 95% of half the first dimension.
    #[serde(default)]
    pub mask_radius: Option<f64>,
    /// Raw `f32` preliminary occupancy map aligned with the volume.
    #[serde(default)]
    pub occupancy_map_path: Option<String>,
    #[serde(default)]
    pub full_occupancy_scale: Option<f64>,
    #[serde(default)]
    pub analysis: AnalysisParams,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl AnalysisConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("occupy_report.json"))
    }

    pub fn load_volume(&self) -> Result<Volume, AnalysisError> {
        read_raw_f32(&self.volume_path, self.dims, self.voxel_size)
    }

    /// Spherical region of interest, minus solvent-mask voxels when configured.
    pub fn build_mask(&self) -> Result<Vec<bool>, AnalysisError> {
        let radius = self
            .mask_radius
            .unwrap_or_else(|| default_mask_radius(self.dims));
        let mask = spherical_mask(self.dims, radius);
        match &self.solvent_mask_path {
            Some(path) => {
                let solvent = read_raw_f32(path, self.dims, self.voxel_size)?;
                exclude_solvent(&mask, &solvent.data)
            }
            None => Ok(mask),
        }
    }

    /// Occupancy source, when a map path is configured.
    pub fn build_occupancy(&self) -> Result<Option<PrecomputedOccupancy>, AnalysisError> {
        let Some(path) = &self.occupancy_map_path else {
            return Ok(None);
        };
        let scale = self.full_occupancy_scale.ok_or_else(|| AnalysisError::Config {
            reason: "occupancy_map_path requires full_occupancy_scale".to_string(),
        })?;
        let map = read_raw_f32(path, self.dims, self.voxel_size)?;
        Ok(Some(PrecomputedOccupancy::new(map.data, scale)))
    }
}

/// Report written after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub volume_path: String,
    pub config_path: String,
    pub dims: [usize; 3],
    pub voxel_size: f64,
    #[serde(default)]
    pub outcome: Option<AnalysisOutcome>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisReport {
    /// Build an empty report for `cfg`.
    pub fn new(cfg: &AnalysisConfig, config_path: &Path) -> Self {
        Self {
            volume_path: cfg.volume_path.clone(),
            config_path: config_path.to_string_lossy().into_owned(),
            dims: cfg.dims,
            voxel_size: cfg.voxel_size,
            outcome: None,
            error: None,
        }
    }

    pub fn set_outcome(&mut self, outcome: AnalysisOutcome) {
        self.outcome = Some(outcome);
        self.error = None;
    }

    pub fn set_error(&mut self, err: &AnalysisError) {
        self.error = Some(err.to_string());
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::write_raw_f32;

    fn minimal_json(volume: &str) -> String {
        format!(r#"{{ "volume_path": "{volume}", "dims": [4, 4, 4] }}"#)
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: AnalysisConfig = serde_json::from_str(&minimal_json("v.raw")).unwrap();
        assert_eq!(cfg.voxel_size, 1.0);
        assert_eq!(cfg.analysis, AnalysisParams::default());
        assert_eq!(cfg.analysis.solvent.n_lev, 1000);
        assert_eq!(cfg.analysis.occupancy.high_occupancy_cutoff, 0.9);
        assert_eq!(cfg.output_path(), PathBuf::from("occupy_report.json"));
    }

    #[test]
    fn nested_params_override_individually() {
        let json = r#"{
            "volume_path": "v.raw",
            "dims": [4, 4, 4],
            "analysis": { "solvent": { "n_lev": 64, "fitter": { "max_iterations": 50 } } }
        }"#;
        let cfg: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.analysis.solvent.n_lev, 64);
        assert_eq!(cfg.analysis.solvent.fitter.max_iterations, 50);
        assert_eq!(cfg.analysis.solvent.fitter.ftol, 1.49012e-8);
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut cfg: AnalysisConfig = serde_json::from_str(&minimal_json("v.raw")).unwrap();
        cfg.mask_radius = Some(1.5);
        cfg.write_json(&path).unwrap();
        assert_eq!(AnalysisConfig::load_json(&path).unwrap(), cfg);
    }

    #[test]
    fn solvent_mask_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let sol = dir.path().join("sol.raw");
        let mut flags = vec![0.0f32; 64];
        // center voxel (2, 2, 2) is solvent
        flags[(2 * 4 + 2) * 4 + 2] = 1.0;
        write_raw_f32(&sol, &flags).unwrap();

        let mut cfg: AnalysisConfig = serde_json::from_str(&minimal_json("v.raw")).unwrap();
        let plain = cfg.build_mask().unwrap();
        cfg.solvent_mask_path = Some(sol.to_string_lossy().into_owned());
        let masked = cfg.build_mask().unwrap();

        assert!(plain[(2 * 4 + 2) * 4 + 2]);
        assert!(!masked[(2 * 4 + 2) * 4 + 2]);
        assert_eq!(
            plain.iter().filter(|&&m| m).count(),
            masked.iter().filter(|&&m| m).count() + 1
        );
    }

    #[test]
    fn occupancy_map_needs_a_scale() {
        let mut cfg: AnalysisConfig = serde_json::from_str(&minimal_json("v.raw")).unwrap();
        assert_eq!(cfg.build_occupancy().unwrap(), None);
        cfg.occupancy_map_path = Some("occ.raw".to_string());
        let err = cfg.build_occupancy().unwrap_err();
        assert!(matches!(err, AnalysisError::Config { .. }));
        assert_eq!(
            err.to_string(),
            "invalid config: occupancy_map_path requires full_occupancy_scale"
        );
    }

    #[test]
    fn report_records_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: AnalysisConfig = serde_json::from_str(&minimal_json("v.raw")).unwrap();
        let mut report = AnalysisReport::new(&cfg, Path::new("cfg.json"));
        report.set_error(&AnalysisError::EmptyMask);

        let path = dir.path().join("nested/report.json");
        report.write_json(&path).unwrap();
        let back = AnalysisReport::load_json(&path).unwrap();
        assert_eq!(back.error.as_deref(), Some("mask selects no voxels"));
        assert!(back.outcome.is_none());
    }
}
