//! In-memory density volumes and raw `f32` volume files.
//!
//! Voxels are stored z-major: `dims = [nz, ny, nx]` and the voxel at
//! `(z, y, x)` lives at `(z * ny + y) * nx + x`.

use crate::error::AnalysisError;
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug)]
pub struct VolumeView<'a> {
    pub dims: [usize; 3],
    /// Edge length of one voxel (e.g. in Angstrom).
    pub voxel_size: f64,
    pub data: &'a [f32], // z-major, len = nz * ny * nx
}

#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub dims: [usize; 3],
    pub voxel_size: f64,
    pub data: Vec<f32>,
}

impl Volume {
    pub fn new(dims: [usize; 3], voxel_size: f64, data: Vec<f32>) -> Result<Self, AnalysisError> {
        let expected = voxel_count(dims)?;
        if data.len() != expected {
            return Err(AnalysisError::ShapeMismatch {
                what: "volume",
                expected,
                got: data.len(),
            });
        }
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(AnalysisError::InvalidVolume {
                reason: format!("voxel size must be positive, got {voxel_size}"),
            });
        }
        Ok(Self {
            dims,
            voxel_size,
            data,
        })
    }

    pub fn view(&self) -> VolumeView<'_> {
        VolumeView {
            dims: self.dims,
            voxel_size: self.voxel_size,
            data: &self.data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl VolumeView<'_> {
    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[2] + x
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(z, y, x)]
    }

    /// Intensities of the voxels where `mask` is set.
    pub fn masked_samples(&self, mask: &[bool]) -> Result<Vec<f32>, AnalysisError> {
        if mask.len() != self.data.len() {
            return Err(AnalysisError::ShapeMismatch {
                what: "mask",
                expected: self.data.len(),
                got: mask.len(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(mask)
            .filter_map(|(&v, &keep)| keep.then_some(v))
            .collect())
    }
}

fn voxel_count(dims: [usize; 3]) -> Result<usize, AnalysisError> {
    if dims.contains(&0) {
        return Err(AnalysisError::InvalidVolume {
            reason: format!("zero-sized dimension in {dims:?}"),
        });
    }
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| AnalysisError::InvalidVolume {
            reason: format!("dimensions {dims:?} overflow"),
        })
}

/// Read a headerless little-endian `f32` volume of shape `dims`.
pub fn read_raw_f32(
    path: impl AsRef<Path>,
    dims: [usize; 3],
    voxel_size: f64,
) -> Result<Volume, AnalysisError> {
    let expected = voxel_count(dims)?;
    let bytes = fs::read(path.as_ref())?;
    if bytes.len() != expected * 4 {
        return Err(AnalysisError::ShapeMismatch {
            what: "raw volume file",
            expected: expected * 4,
            got: bytes.len(),
        });
    }
    let data = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    log::debug!(
        "read {dims:?} volume from {}",
        path.as_ref().display()
    );
    Volume::new(dims, voxel_size, data)
}

/// Write `data` as headerless little-endian `f32`.
pub fn write_raw_f32(path: impl AsRef<Path>, data: &[f32]) -> Result<(), AnalysisError> {
    let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_file_is_little_endian_z_major() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.raw");
        let data: Vec<f32> = (0..24).map(|i| i as f32 * 0.5).collect();
        write_raw_f32(&path, &data).unwrap();

        let vol = read_raw_f32(&path, [2, 3, 4], 1.2).unwrap();
        assert_eq!(vol.data, data);
        let view = vol.view();
        assert_eq!(view.get(1, 2, 3), 11.5);
        assert_eq!(view.get(1, 0, 0), 6.0);
    }

    #[test]
    fn wrong_file_size_is_a_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.raw");
        write_raw_f32(&path, &[1.0; 5]).unwrap();
        let err = read_raw_f32(&path, [2, 2, 2], 1.0).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ShapeMismatch {
                expected: 32,
                got: 20,
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_dims_and_bad_voxel_size() {
        assert!(matches!(
            Volume::new([0, 2, 2], 1.0, vec![]),
            Err(AnalysisError::InvalidVolume { .. })
        ));
        assert!(matches!(
            Volume::new([1, 1, 1], 0.0, vec![1.0]),
            Err(AnalysisError::InvalidVolume { .. })
        ));
    }

    #[test]
    fn masked_samples_keep_order() {
        let vol = Volume::new([1, 1, 4], 1.0, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let s = vol.view().masked_samples(&[true, false, true, false]).unwrap();
        assert_eq!(s, vec![1.0, 3.0]);
        assert!(vol.view().masked_samples(&[true]).is_err());
    }
}
