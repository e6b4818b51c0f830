//! Solvent-range and occupancy-threshold analysis of 3-D density maps.
//!
//! This crate wraps [`occupy_core`] with the pieces needed to run it on a
//! volume: raw `f32` volume files, spherical region-of-interest masks, a
//! JSON-configured runner and a JSON report.
//!
//! ```no_run
//! use occupy::{AnalysisConfig, SolventAnalysis};
//!
//! # fn main() -> Result<(), occupy::AnalysisError> {
//! let cfg = AnalysisConfig::load_json("analysis.json")?;
//! let volume = cfg.load_volume()?;
//! let mask = cfg.build_mask()?;
//! let outcome = SolventAnalysis::new(cfg.analysis.clone()).run(volume.view(), &mask, None)?;
//! println!("recommended threshold {:.4}", outcome.solvent.range.high);
//! # Ok(())
//! # }
//! ```

mod analysis;
mod error;
mod io;
mod mask;
mod volume;

pub use analysis::{
    AnalysisOutcome, AnalysisParams, OccupancyEstimate, OccupancyEstimator, PrecomputedOccupancy,
    SolventAnalysis,
};
pub use error::AnalysisError;
pub use io::{AnalysisConfig, AnalysisReport};
pub use mask::{default_mask_radius, exclude_solvent, spherical_mask};
pub use volume::{read_raw_f32, write_raw_f32, Volume, VolumeView};
