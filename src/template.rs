//! Intensity models that can be compared against an image.
//!
//! Anything that returns an intensity at a physical coordinate is an
//! [`IntensityModel`], including plain closures. Models that know how to
//! fill a whole grid themselves implement [`Render`]. A pre-rendered
//! [`Image`] is the simplest such model.
//!
//! The built-in templates are the usual building blocks for image-domain
//! feature extraction: Gaussians, rings, a slashed ring and a flat floor,
//! plus combinators to scale and add them.

use crate::error::{DivergenceError, Result};
use crate::image::Image;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Something with an intensity at every point of the plane.
pub trait IntensityModel {
    fn intensity_point(&self, x: f64, y: f64) -> f64;
}

impl<F> IntensityModel for F
where
    F: Fn(f64, f64) -> f64,
{
    #[inline]
    fn intensity_point(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// Something that can fill a target grid with its intensity.
pub trait Render {
    /// Overwrite every sample of `grid`.
    fn render(&self, grid: &mut Image) -> Result<()>;
}

impl Render for Image {
    fn render(&self, grid: &mut Image) -> Result<()> {
        grid.copy_from(self)
    }
}

/// [`Render`] adapter that samples an [`IntensityModel`] at pixel centres.
#[derive(Debug, Clone, Copy)]
pub struct Rendered<M>(pub M);

impl<M: IntensityModel> Render for Rendered<M> {
    fn render(&self, grid: &mut Image) -> Result<()> {
        grid.fill_with(|x, y| self.0.intensity_point(x, y));
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DivergenceError::InvalidParameter(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DivergenceError::InvalidParameter(format!(
            "{} must be finite, got {}",
            name, value
        )))
    }
}

/// Unit-flux circular Gaussian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub sigma: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Gaussian {
    pub fn new(sigma: f64, x0: f64, y0: f64) -> Result<Self> {
        check_positive("sigma", sigma)?;
        check_finite("x0", x0)?;
        check_finite("y0", y0)?;
        Ok(Self { sigma, x0, y0 })
    }
}

impl IntensityModel for Gaussian {
    #[inline]
    fn intensity_point(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.x0;
        let dy = y - self.y0;
        let s2 = self.sigma * self.sigma;
        (-(dx * dx + dy * dy) / (2.0 * s2)).exp() / (2.0 * PI * s2)
    }
}

/// Thin ring of radius `radius` with a Gaussian radial profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianRing {
    pub radius: f64,
    pub sigma: f64,
    pub x0: f64,
    pub y0: f64,
}

impl GaussianRing {
    pub fn new(radius: f64, sigma: f64, x0: f64, y0: f64) -> Result<Self> {
        check_positive("radius", radius)?;
        check_positive("sigma", sigma)?;
        check_finite("x0", x0)?;
        check_finite("y0", y0)?;
        Ok(Self {
            radius,
            sigma,
            x0,
            y0,
        })
    }

    #[inline]
    fn radial(&self, x: f64, y: f64) -> f64 {
        let r = ((x - self.x0).powi(2) + (y - self.y0).powi(2)).sqrt();
        let d = r - self.radius;
        (-(d * d) / (2.0 * self.sigma * self.sigma)).exp()
            / (2.0 * PI * self.radius * self.sigma * (2.0 * PI).sqrt())
    }
}

impl IntensityModel for GaussianRing {
    #[inline]
    fn intensity_point(&self, x: f64, y: f64) -> f64 {
        self.radial(x, y)
    }
}

/// Gaussian ring whose brightness falls off linearly across a diameter.
///
/// `slash` in [0, 1] is the fractional brightness drop from the bright side
/// to the dark side; `angle` (radians, from +x towards +y) points at the
/// bright side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlashedGaussianRing {
    pub ring: GaussianRing,
    pub slash: f64,
    pub angle: f64,
}

impl SlashedGaussianRing {
    pub fn new(radius: f64, sigma: f64, slash: f64, angle: f64, x0: f64, y0: f64) -> Result<Self> {
        let ring = GaussianRing::new(radius, sigma, x0, y0)?;
        if !(0.0..=1.0).contains(&slash) {
            return Err(DivergenceError::InvalidParameter(format!(
                "slash must lie in [0, 1], got {}",
                slash
            )));
        }
        check_finite("angle", angle)?;
        Ok(Self { ring, slash, angle })
    }
}

impl IntensityModel for SlashedGaussianRing {
    fn intensity_point(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.ring.x0;
        let dy = y - self.ring.y0;
        let phi = dy.atan2(dx);
        // 1 on the bright side, 1 - slash on the dark side
        let weight = 1.0 - self.slash * (1.0 - (phi - self.angle).cos()) / 2.0;
        weight * self.ring.radial(x, y)
    }
}

/// Flat background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub level: f64,
}

impl Constant {
    pub fn new(level: f64) -> Result<Self> {
        if !level.is_finite() || level < 0.0 {
            return Err(DivergenceError::InvalidParameter(format!(
                "background level must be non-negative and finite, got {}",
                level
            )));
        }
        Ok(Self { level })
    }
}

impl IntensityModel for Constant {
    #[inline]
    fn intensity_point(&self, _x: f64, _y: f64) -> f64 {
        self.level
    }
}

/// Model multiplied by a constant factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaled<M> {
    pub model: M,
    pub scale: f64,
}

impl<M> Scaled<M> {
    pub fn new(model: M, scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale < 0.0 {
            return Err(DivergenceError::InvalidParameter(format!(
                "scale must be non-negative and finite, got {}",
                scale
            )));
        }
        Ok(Self { model, scale })
    }
}

impl<M: IntensityModel> IntensityModel for Scaled<M> {
    #[inline]
    fn intensity_point(&self, x: f64, y: f64) -> f64 {
        self.scale * self.model.intensity_point(x, y)
    }
}

/// Pointwise sum of two models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sum<A, B> {
    pub a: A,
    pub b: B,
}

impl<A, B> Sum<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self { a, b }
    }
}

impl<A: IntensityModel, B: IntensityModel> IntensityModel for Sum<A, B> {
    #[inline]
    fn intensity_point(&self, x: f64, y: f64) -> f64 {
        self.a.intensity_point(x, y) + self.b.intensity_point(x, y)
    }
}
