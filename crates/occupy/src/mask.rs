//! Region-of-interest masks over z-major volumes.

use crate::error::AnalysisError;

/// Default mask radius in voxels: 95% of half the first dimension, truncated.
pub fn default_mask_radius(dims: [usize; 3]) -> f64 {
    (0.95 * dims[0] as f64 / 2.0).floor()
}

/// Ball of `radius` voxels around the box center (`dims[i] / 2` per axis).
pub fn spherical_mask(dims: [usize; 3], radius: f64) -> Vec<bool> {
    let [nz, ny, nx] = dims;
    let c = [(nz / 2) as f64, (ny / 2) as f64, (nx / 2) as f64];
    let r2 = radius * radius;
    let mut mask = Vec::with_capacity(nz * ny * nx);
    for z in 0..nz {
        let dz = z as f64 - c[0];
        for y in 0..ny {
            let dy = y as f64 - c[1];
            for x in 0..nx {
                let dx = x as f64 - c[2];
                mask.push(dz * dz + dy * dy + dx * dx <= r2);
            }
        }
    }
    mask
}

/// Drop voxels flagged as solvent (`solvent >= 0.5`) from `mask`.
pub fn exclude_solvent(mask: &[bool], solvent: &[f32]) -> Result<Vec<bool>, AnalysisError> {
    if mask.len() != solvent.len() {
        return Err(AnalysisError::ShapeMismatch {
            what: "solvent mask",
            expected: mask.len(),
            got: solvent.len(),
        });
    }
    Ok(mask
        .iter()
        .zip(solvent)
        .map(|(&m, &s)| m && s < 0.5)
        .collect())
}
