//! Gaussian solvent models.
//!
//! The solvent peak of a density histogram is modelled by one Gaussian, by
//! a solvent Gaussian plus a broad content Gaussian, or by a solvent Gaussian
//! with a narrow core plus a row of displaced content lobes. Widths are never
//! used as exactly zero: a zero width is replaced by [`WIDTH_FLOOR`] at
//! evaluation.

use serde::{Deserialize, Serialize};

/// Width substituted for an exactly-zero Gaussian width.
pub const WIDTH_FLOOR: f64 = 1e-3;

/// Number of displaced content lobes in [`SolventModel::MultiLobe`].
pub const CONTENT_LOBES: usize = 11;

/// Scale and width of the narrow solvent core relative to the solvent term.
const CORE_SCALE_RATIO: f64 = 0.1;
const CORE_WIDTH_RATIO: f64 = 0.4;

/// One Gaussian term `scale * exp(-(x - center)^2 / (2 width^2))`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianComponent {
    pub scale: f64,
    pub center: f64,
    pub width: f64,
}

impl GaussianComponent {
    pub fn new(scale: f64, center: f64, width: f64) -> Self {
        Self {
            scale,
            center,
            width,
        }
    }

    /// Width actually used in the exponent.
    #[inline]
    pub fn effective_width(&self) -> f64 {
        if self.width == 0.0 {
            WIDTH_FLOOR
        } else {
            self.width
        }
    }

    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        let s = self.effective_width();
        let d = x - self.center;
        self.scale * (-(d * d) / (2.0 * s * s)).exp()
    }

    /// Partial derivatives with respect to `(scale, center, width)`.
    #[inline]
    pub fn gradient(&self, x: f64) -> [f64; 3] {
        let s = self.effective_width();
        let d = x - self.center;
        let g = (-(d * d) / (2.0 * s * s)).exp();
        let f = self.scale * g;
        [g, f * d / (s * s), f * d * d / (s * s * s)]
    }

    /// Area under the curve, `scale * |width| * sqrt(2 pi)`.
    pub fn area(&self) -> f64 {
        self.scale * self.effective_width().abs() * (2.0 * std::f64::consts::PI).sqrt()
    }

    fn abs_width(self) -> Self {
        Self {
            width: self.width.abs(),
            ..self
        }
    }
}

/// Shape of a solvent model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    OneComponent,
    TwoComponent,
    MultiLobe,
}

impl ModelKind {
    pub fn n_params(self) -> usize {
        match self {
            ModelKind::OneComponent => 3,
            ModelKind::TwoComponent => 6,
            ModelKind::MultiLobe => 7,
        }
    }
}

/// Solvent model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolventModel {
    OneComponent {
        solvent: GaussianComponent,
    },
    TwoComponent {
        solvent: GaussianComponent,
        content: GaussianComponent,
    },
    /// Solvent term plus a core of a tenth its scale and 0.4 its width, and
    /// [`CONTENT_LOBES`] copies of `content` with centers spaced evenly over
    /// `content.center ± spread`.
    MultiLobe {
        solvent: GaussianComponent,
        content: GaussianComponent,
        spread: f64,
    },
}

fn solvent_core(solvent: GaussianComponent) -> GaussianComponent {
    GaussianComponent::new(
        solvent.scale * CORE_SCALE_RATIO,
        solvent.center,
        solvent.width * CORE_WIDTH_RATIO,
    )
}

/// Each lobe with its offset factor `t` in `[-1, 1]`; the lobe center is
/// `content.center - spread * t`.
fn content_lobes(
    content: GaussianComponent,
    spread: f64,
) -> impl Iterator<Item = (f64, GaussianComponent)> {
    let half = (CONTENT_LOBES - 1) as f64 / 2.0;
    (0..CONTENT_LOBES).map(move |k| {
        let t = (k as f64 - half) / half;
        let lobe = GaussianComponent {
            center: content.center - spread * t,
            ..content
        };
        (t, lobe)
    })
}

impl SolventModel {
    pub fn one(scale: f64, center: f64, width: f64) -> Self {
        Self::OneComponent {
            solvent: GaussianComponent::new(scale, center, width),
        }
    }

    pub fn two(solvent: GaussianComponent, content: GaussianComponent) -> Self {
        Self::TwoComponent { solvent, content }
    }

    pub fn multi_lobe(solvent: GaussianComponent, content: GaussianComponent, spread: f64) -> Self {
        Self::MultiLobe {
            solvent,
            content,
            spread,
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            SolventModel::OneComponent { .. } => ModelKind::OneComponent,
            SolventModel::TwoComponent { .. } => ModelKind::TwoComponent,
            SolventModel::MultiLobe { .. } => ModelKind::MultiLobe,
        }
    }

    /// The solvent term alone.
    pub fn solvent(&self) -> GaussianComponent {
        match *self {
            SolventModel::OneComponent { solvent }
            | SolventModel::TwoComponent { solvent, .. }
            | SolventModel::MultiLobe { solvent, .. } => solvent,
        }
    }

    /// Flat parameter vector: `[scale, center, width]` per component, then
    /// the lobe spread for the multi-lobe model.
    pub fn params(&self) -> Vec<f64> {
        match *self {
            SolventModel::OneComponent { solvent: s } => vec![s.scale, s.center, s.width],
            SolventModel::TwoComponent {
                solvent: s,
                content: c,
            } => vec![s.scale, s.center, s.width, c.scale, c.center, c.width],
            SolventModel::MultiLobe {
                solvent: s,
                content: c,
                spread,
            } => vec![s.scale, s.center, s.width, c.scale, c.center, c.width, spread],
        }
    }

    /// Rebuild a model of `kind` from a flat parameter slice.
    ///
    /// Returns `None` when the slice length does not match the arity.
    pub fn from_params(kind: ModelKind, p: &[f64]) -> Option<Self> {
        if p.len() != kind.n_params() {
            return None;
        }
        let model = match kind {
            ModelKind::OneComponent => Self::one(p[0], p[1], p[2]),
            ModelKind::TwoComponent => Self::two(
                GaussianComponent::new(p[0], p[1], p[2]),
                GaussianComponent::new(p[3], p[4], p[5]),
            ),
            ModelKind::MultiLobe => Self::multi_lobe(
                GaussianComponent::new(p[0], p[1], p[2]),
                GaussianComponent::new(p[3], p[4], p[5]),
                p[6],
            ),
        };
        Some(model)
    }

    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        match *self {
            SolventModel::OneComponent { solvent } => solvent.eval(x),
            SolventModel::TwoComponent { solvent, content } => solvent.eval(x) + content.eval(x),
            SolventModel::MultiLobe {
                solvent,
                content,
                spread,
            } => {
                solvent.eval(x)
                    + solvent_core(solvent).eval(x)
                    + content_lobes(content, spread)
                        .map(|(_, lobe)| lobe.eval(x))
                        .sum::<f64>()
            }
        }
    }

    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }

    /// Natural log of the density, defined only where the density is positive.
    pub fn log_eval(&self, x: f64) -> Option<f64> {
        let v = self.eval(x);
        (v > 0.0).then(|| v.ln())
    }

    pub fn log_eval_many(&self, xs: &[f64]) -> Vec<Option<f64>> {
        xs.iter().map(|&x| self.log_eval(x)).collect()
    }

    /// Write the partial derivatives at `x` into `out` (length = arity).
    pub fn gradient_into(&self, x: f64, out: &mut [f64]) {
        match *self {
            SolventModel::OneComponent { solvent } => {
                out[..3].copy_from_slice(&solvent.gradient(x));
            }
            SolventModel::TwoComponent { solvent, content } => {
                out[..3].copy_from_slice(&solvent.gradient(x));
                out[3..6].copy_from_slice(&content.gradient(x));
            }
            SolventModel::MultiLobe {
                solvent,
                content,
                spread,
            } => {
                let s = solvent.gradient(x);
                let core = solvent_core(solvent).gradient(x);
                out[0] = s[0] + CORE_SCALE_RATIO * core[0];
                out[1] = s[1] + core[1];
                out[2] = s[2] + CORE_WIDTH_RATIO * core[2];
                out[3..7].fill(0.0);
                for (t, lobe) in content_lobes(content, spread) {
                    let g = lobe.gradient(x);
                    out[3] += g[0];
                    out[4] += g[1];
                    out[5] += g[2];
                    out[6] -= t * g[1];
                }
            }
        }
    }

    /// Same model with every width replaced by its absolute value.
    pub fn with_abs_widths(self) -> Self {
        match self {
            SolventModel::OneComponent { solvent } => SolventModel::OneComponent {
                solvent: solvent.abs_width(),
            },
            SolventModel::TwoComponent { solvent, content } => SolventModel::TwoComponent {
                solvent: solvent.abs_width(),
                content: content.abs_width(),
            },
            SolventModel::MultiLobe {
                solvent,
                content,
                spread,
            } => SolventModel::MultiLobe {
                solvent: solvent.abs_width(),
                content: content.abs_width(),
                spread: spread.abs(),
            },
        }
    }

    pub fn is_finite(&self) -> bool {
        self.params().iter().all(|v| v.is_finite())
    }
}
