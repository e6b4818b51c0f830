//! Uniform-bin intensity histogram over the sample's own range.

use crate::error::{Result, SolventError};
use serde::{Deserialize, Serialize};

/// Default number of histogram levels.
pub const DEFAULT_N_LEV: usize = 1000;

/// Uniform histogram with `n_lev + 1` edges and `n_lev` counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
}

impl Histogram {
    /// Bin `samples` into `n_lev` levels spanning `[min, max]` of the samples.
    ///
    /// Samples equal to the maximum land in the last bin, so the counts always
    /// sum to the sample count. Empty, non-finite and zero-range inputs are
    /// rejected.
    pub fn from_samples<T>(samples: &[T], n_lev: usize) -> Result<Self>
    where
        T: Copy + Into<f64>,
    {
        if samples.is_empty() {
            return Err(SolventError::degenerate("empty sample set"));
        }
        if n_lev == 0 {
            return Err(SolventError::degenerate("histogram needs at least one level"));
        }

        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &s in samples {
            let v: f64 = s.into();
            if !v.is_finite() {
                return Err(SolventError::degenerate(format!("non-finite sample {v}")));
            }
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if hi <= lo {
            return Err(SolventError::degenerate(format!(
                "zero intensity range (all samples equal {lo})"
            )));
        }

        let width = (hi - lo) / n_lev as f64;
        let mut counts = vec![0u64; n_lev];
        for &s in samples {
            let v: f64 = s.into();
            let bin = (((v - lo) / width).floor() as usize).min(n_lev - 1);
            counts[bin] += 1;
        }

        Ok(Self {
            edges: linspace(lo, hi, n_lev + 1),
            counts,
        })
    }

    /// Build a histogram from explicit counts over `[min, max]`.
    pub fn from_counts(min: f64, max: f64, counts: Vec<u64>) -> Result<Self> {
        if counts.is_empty() {
            return Err(SolventError::degenerate("histogram needs at least one level"));
        }
        if !(min.is_finite() && max.is_finite()) || max <= min {
            return Err(SolventError::degenerate(format!(
                "invalid histogram range [{min}, {max}]"
            )));
        }
        Ok(Self {
            edges: linspace(min, max, counts.len() + 1),
            counts,
        })
    }

    #[inline]
    pub fn n_lev(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    #[inline]
    pub fn bin_width(&self) -> f64 {
        (self.max() - self.min()) / self.n_lev() as f64
    }

    /// All `n_lev + 1` bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Left edge of every bin.
    pub fn left_edges(&self) -> &[f64] {
        &self.edges[..self.n_lev()]
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn counts_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Index of the first bin holding the maximum count.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &c) in self.counts.iter().enumerate() {
            if c > self.counts[best] {
                best = i;
            }
        }
        best
    }

    /// Bin containing intensity `x`, clamped to the histogram.
    pub fn bin_of(&self, x: f64) -> usize {
        let idx = ((x - self.min()) / self.bin_width()).floor();
        if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(self.n_lev() - 1)
        }
    }

    /// `n_lev` evenly spaced points spanning `[min, max]`, used as the fitting
    /// domain.
    pub fn domain(&self) -> Vec<f64> {
        linspace(self.min(), self.max(), self.n_lev())
    }
}

/// `n` evenly spaced values from `start` to `end`, both ends included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            out[n - 1] = end;
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn counts_sum_to_sample_count() {
        let samples: Vec<f32> = (0..1234).map(|i| ((i * 37) % 101) as f32 * 0.25).collect();
        for n_lev in [1, 7, 100, 1000] {
            let h = Histogram::from_samples(&samples, n_lev).expect("histogram");
            assert_eq!(h.total(), samples.len() as u64);
            assert_eq!(h.edges().len(), n_lev + 1);
        }
    }

    #[test]
    fn edges_span_sample_range_uniformly() {
        let samples = [1.0f64, 1.5, 2.0, 5.0];
        let h = Histogram::from_samples(&samples, 4).unwrap();
        assert_relative_eq!(h.min(), 1.0);
        assert_relative_eq!(h.max(), 5.0);
        assert_relative_eq!(h.bin_width(), 1.0);
        assert_eq!(h.counts(), &[2, 1, 0, 1]);
        for w in h.edges().windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn maximum_lands_in_last_bin() {
        let h = Histogram::from_samples(&[0.0f64, 10.0], 10).unwrap();
        assert_eq!(h.counts()[0], 1);
        assert_eq!(h.counts()[9], 1);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let empty: [f64; 0] = [];
        assert!(matches!(
            Histogram::from_samples(&empty, 10),
            Err(SolventError::DegenerateInput { .. })
        ));
        assert!(matches!(
            Histogram::from_samples(&[2.5f64; 500], 10),
            Err(SolventError::DegenerateInput { .. })
        ));
        assert!(matches!(
            Histogram::from_samples(&[1.0f64, f64::NAN], 10),
            Err(SolventError::DegenerateInput { .. })
        ));
        assert!(matches!(
            Histogram::from_samples(&[1.0f64, 2.0], 0),
            Err(SolventError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        let h = Histogram::from_counts(0.0, 5.0, vec![1, 4, 2, 4, 0]).unwrap();
        assert_eq!(h.argmax(), 1);
        assert_eq!(h.bin_of(3.5), 3);
        assert_eq!(h.bin_of(-1.0), 0);
        assert_eq!(h.bin_of(99.0), 4);
    }

    #[test]
    fn domain_is_inclusive_linspace() {
        let h = Histogram::from_counts(-1.0, 1.0, vec![0; 5]).unwrap();
        let d = h.domain();
        assert_eq!(d.len(), 5);
        assert_relative_eq!(d[0], -1.0);
        assert_relative_eq!(d[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(d[4], 1.0);
    }
}
