//! Core divergence calculations.
//!
//! Each [`Divergence`] kind is a per-pixel term `D(p, q)` plus a rule for
//! combining the accumulated sum with the rendered flux `fm`:
//!
//! | Kind            | Pixel term                 | Combination                          |
//! |-----------------|----------------------------|--------------------------------------|
//! | Bhattacharyya   | `√(p·|q|)`                 | `-log(Σ / √fm)`                      |
//! | KullbackLeibler | `q·log(q / (p + ε))`       | `Σ / fm`                             |
//! | Renyi(α)        | `p·(q/p)^α`                | `log(Σ · fm^-α) / (α - 1)`           |
//! | LeastSquares    | `(p - q)²`                 | `Σ`                                  |
//!
//! `p` is the normalized reference sample and `q` the rendered sample.
//! Sums always run over the samples in canonical grid order, so repeated
//! evaluations of the same pair are bit-for-bit identical.

use crate::error::{DivergenceError, Result};
use serde::{Deserialize, Serialize};

/// Offset added to the reference in the KL log (avoids log(0))
pub const KL_EPSILON: f64 = 1e-12;

/// Renyi orders closer than this to 1 are rejected
pub const RENYI_ALPHA_TOLERANCE: f64 = 1e-9;

/// Divergence kind used to compare a reference image with a rendered model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    Bhattacharyya,
    KullbackLeibler,
    /// Renyi divergence of order `alpha` (alpha ≠ 1)
    Renyi { alpha: f64 },
    LeastSquares,
}

impl Default for Divergence {
    fn default() -> Self {
        Self::Bhattacharyya
    }
}

impl Divergence {
    /// Renyi divergence of order `alpha`.
    ///
    /// Order 1 is the KL limit and is rejected; use
    /// [`Divergence::KullbackLeibler`] instead.
    pub fn renyi(alpha: f64) -> Result<Self> {
        let d = Self::Renyi { alpha };
        d.validate()?;
        Ok(d)
    }

    /// Check parameters (needed for values built by hand or deserialized).
    pub fn validate(&self) -> Result<()> {
        if let Self::Renyi { alpha } = *self {
            if !alpha.is_finite() {
                return Err(DivergenceError::InvalidParameter(format!(
                    "Renyi order must be finite, got {}",
                    alpha
                )));
            }
            if (alpha - 1.0).abs() < RENYI_ALPHA_TOLERANCE {
                return Err(DivergenceError::InvalidParameter(
                    "Renyi order alpha = 1 is degenerate; use KullbackLeibler".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bhattacharyya => "bhattacharyya",
            Self::KullbackLeibler => "kullback_leibler",
            Self::Renyi { .. } => "renyi",
            Self::LeastSquares => "least_squares",
        }
    }

    /// Contribution of one pixel pair.
    #[inline]
    pub fn pixel_term(&self, p: f64, q: f64) -> f64 {
        match *self {
            Self::Bhattacharyya => bhattacharyya_term(p, q),
            Self::KullbackLeibler => kl_term(p, q),
            Self::Renyi { alpha } => renyi_term(p, q, alpha),
            Self::LeastSquares => least_squares_term(p, q),
        }
    }

    /// Fold the accumulated pixel sum and the rendered flux into the divergence.
    #[inline]
    pub fn combine(&self, sum: f64, flux: f64) -> f64 {
        match *self {
            Self::Bhattacharyya => -(sum / flux.sqrt()).ln(),
            Self::KullbackLeibler => sum / flux,
            Self::Renyi { alpha } => (sum * flux.powf(-alpha)).ln() / (alpha - 1.0),
            Self::LeastSquares => sum,
        }
    }

    /// Divergence between a normalized reference and a validated rendered grid.
    ///
    /// `rendered` must already satisfy [`check_rendered`]; `flux` is its sum.
    pub fn evaluate_samples(&self, reference: &[f64], rendered: &[f64], flux: f64) -> Result<f64> {
        if reference.len() != rendered.len() {
            return Err(DivergenceError::SampleCountMismatch {
                expected: reference.len(),
                got: rendered.len(),
            });
        }

        let mut sum = 0.0;
        for (&p, &q) in reference.iter().zip(rendered.iter()) {
            sum += self.pixel_term(p, q);
        }

        let value = self.combine(sum, flux);
        if !value.is_finite() {
            return Err(DivergenceError::InvalidModel(format!(
                "{} divergence is not finite (sum = {}, flux = {})",
                self.name(),
                sum,
                flux
            )));
        }
        Ok(value)
    }
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Renyi { alpha } => write!(f, "renyi(alpha={})", alpha),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[inline]
fn bhattacharyya_term(p: f64, q: f64) -> f64 {
    (p * q.abs()).sqrt()
}

#[inline]
fn kl_term(p: f64, q: f64) -> f64 {
    // q·log q → 0 as q → 0
    if q == 0.0 {
        return 0.0;
    }
    q * (q / (p + KL_EPSILON)).ln()
}

#[inline]
fn renyi_term(p: f64, q: f64, alpha: f64) -> f64 {
    // Only the reference support contributes.
    if p == 0.0 {
        return 0.0;
    }
    p * (q / p).powf(alpha)
}

#[inline]
fn least_squares_term(p: f64, q: f64) -> f64 {
    let d = p - q;
    d * d
}

/// What to do with negative samples in a rendered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeIntensity {
    /// Fail the evaluation with [`DivergenceError::InvalidModel`]
    Reject,
    /// Replace negative samples with zero before computing the flux
    Clamp,
}

impl Default for NegativeIntensity {
    fn default() -> Self {
        Self::Reject
    }
}

/// Outcome of [`check_rendered`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedFlux {
    /// Sum of the (possibly clamped) samples
    pub flux: f64,
    /// Number of samples that were clamped to zero
    pub clamped: usize,
}

/// Validate a rendered grid in place and return its flux.
///
/// Non-finite samples are always rejected. Negative samples are rejected or
/// clamped per `policy`. A zero or non-finite flux is rejected.
pub fn check_rendered(samples: &mut [f64], policy: NegativeIntensity) -> Result<RenderedFlux> {
    let mut flux = 0.0;
    let mut clamped = 0;

    for (idx, q) in samples.iter_mut().enumerate() {
        if !q.is_finite() {
            return Err(DivergenceError::InvalidModel(format!(
                "rendered sample {} is not finite ({})",
                idx, q
            )));
        }
        if *q < 0.0 {
            match policy {
                NegativeIntensity::Reject => {
                    return Err(DivergenceError::InvalidModel(format!(
                        "rendered sample {} is negative ({})",
                        idx, q
                    )));
                }
                NegativeIntensity::Clamp => {
                    *q = 0.0;
                    clamped += 1;
                }
            }
        }
        flux += *q;
    }

    if !flux.is_finite() || flux <= 0.0 {
        return Err(DivergenceError::InvalidModel(format!(
            "rendered flux must be positive and finite, got {}",
            flux
        )));
    }

    Ok(RenderedFlux { flux, clamped })
}

/// Compute all divergence kinds at once (single pass)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceMetrics {
    pub bhattacharyya: f64,
    pub kullback_leibler: f64,
    pub renyi: f64,
    pub renyi_alpha: f64,
    pub least_squares: f64,
    /// Rendered flux the normalizations used
    pub flux: f64,
}

impl DivergenceMetrics {
    /// Compute every metric for a normalized reference and a rendered grid.
    ///
    /// `rendered` is validated with [`NegativeIntensity::Reject`]. Metrics that
    /// come out non-finite (e.g. Bhattacharyya on disjoint supports) are
    /// reported as `f64::INFINITY` rather than failing the whole batch.
    pub fn compute(reference: &[f64], rendered: &[f64], alpha: f64) -> Result<Self> {
        Divergence::renyi(alpha)?;
        if reference.len() != rendered.len() {
            return Err(DivergenceError::SampleCountMismatch {
                expected: reference.len(),
                got: rendered.len(),
            });
        }

        let mut flux = 0.0;
        for (idx, &q) in rendered.iter().enumerate() {
            if !q.is_finite() || q < 0.0 {
                return Err(DivergenceError::InvalidModel(format!(
                    "rendered sample {} is invalid ({})",
                    idx, q
                )));
            }
            flux += q;
        }
        if flux <= 0.0 || !flux.is_finite() {
            return Err(DivergenceError::InvalidModel(format!(
                "rendered flux must be positive and finite, got {}",
                flux
            )));
        }

        let mut bh = 0.0;
        let mut kl = 0.0;
        let mut re = 0.0;
        let mut ls = 0.0;
        for (&p, &q) in reference.iter().zip(rendered.iter()) {
            bh += bhattacharyya_term(p, q);
            kl += kl_term(p, q);
            re += renyi_term(p, q, alpha);
            ls += least_squares_term(p, q);
        }

        let finite_or_inf = |v: f64| if v.is_finite() { v } else { f64::INFINITY };

        Ok(Self {
            bhattacharyya: finite_or_inf(Divergence::Bhattacharyya.combine(bh, flux)),
            kullback_leibler: finite_or_inf(Divergence::KullbackLeibler.combine(kl, flux)),
            renyi: finite_or_inf(Divergence::Renyi { alpha }.combine(re, flux)),
            renyi_alpha: alpha,
            least_squares: Divergence::LeastSquares.combine(ls, flux),
            flux,
        })
    }

    /// Value for one kind (Renyi only at the order these metrics were computed with)
    pub fn get(&self, divergence: &Divergence) -> Option<f64> {
        match *divergence {
            Divergence::Bhattacharyya => Some(self.bhattacharyya),
            Divergence::KullbackLeibler => Some(self.kullback_leibler),
            Divergence::Renyi { alpha } if alpha == self.renyi_alpha => Some(self.renyi),
            Divergence::Renyi { .. } => None,
            Divergence::LeastSquares => Some(self.least_squares),
        }
    }
}
