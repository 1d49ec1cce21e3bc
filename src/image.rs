//! Intensity images on a regular, origin-centred pixel grid.
//!
//! An [`Image`] pairs an [`ImageGeometry`] with an `nalgebra` matrix of
//! samples. Rows index x and columns index y. The matrix is column-major,
//! so x varies fastest in [`Image::samples`]; every reduction in this crate
//! walks the samples in that order.

use crate::error::{DivergenceError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Grid dimensions and pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    /// Number of pixels along x
    pub nx: usize,
    /// Number of pixels along y
    pub ny: usize,
    /// Pixel width
    pub dx: f64,
    /// Pixel height
    pub dy: f64,
}

impl ImageGeometry {
    /// Create a validated geometry.
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64) -> Result<Self> {
        let geometry = Self { nx, ny, dx, dy };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Geometry covering a `fov_x` × `fov_y` field with `nx` × `ny` pixels.
    pub fn from_fov(fov_x: f64, fov_y: f64, nx: usize, ny: usize) -> Result<Self> {
        Self::new(nx, ny, fov_x / nx as f64, fov_y / ny as f64)
    }

    /// Check dimensions and pixel size.
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(DivergenceError::InvalidImage(format!(
                "empty grid {}x{}",
                self.nx, self.ny
            )));
        }
        if !(self.dx.is_finite() && self.dx > 0.0 && self.dy.is_finite() && self.dy > 0.0) {
            return Err(DivergenceError::InvalidImage(format!(
                "pixel size must be positive and finite, got ({}, {})",
                self.dx, self.dy
            )));
        }
        Ok(())
    }

    /// Total number of pixels
    #[inline]
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical extent (nx·dx, ny·dy)
    pub fn field_of_view(&self) -> (f64, f64) {
        (self.nx as f64 * self.dx, self.ny as f64 * self.dy)
    }

    /// x coordinate of the centre of pixel column `i`
    #[inline]
    pub fn x_centre(&self, i: usize) -> f64 {
        (i as f64 - (self.nx as f64 - 1.0) / 2.0) * self.dx
    }

    /// y coordinate of the centre of pixel row `j`
    #[inline]
    pub fn y_centre(&self, j: usize) -> f64 {
        (j as f64 - (self.ny as f64 - 1.0) / 2.0) * self.dy
    }

    /// Error unless `other` describes the same grid.
    pub fn ensure_matches(&self, other: &ImageGeometry) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(DivergenceError::ShapeMismatch {
                expected: *self,
                got: *other,
            })
        }
    }
}

impl std::fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} px @ ({}, {})", self.nx, self.ny, self.dx, self.dy)
    }
}

/// A 2-D grid of intensity samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImage")]
pub struct Image {
    geometry: ImageGeometry,
    data: DMatrix<f64>,
}

/// Wire form of [`Image`], checked before it becomes one.
#[derive(Deserialize)]
struct RawImage {
    geometry: ImageGeometry,
    data: DMatrix<f64>,
}

impl TryFrom<RawImage> for Image {
    type Error = DivergenceError;

    fn try_from(raw: RawImage) -> Result<Self> {
        raw.geometry.validate()?;
        if raw.data.nrows() != raw.geometry.nx || raw.data.ncols() != raw.geometry.ny {
            return Err(DivergenceError::SampleCountMismatch {
                expected: raw.geometry.len(),
                got: raw.data.len(),
            });
        }
        Ok(Self {
            geometry: raw.geometry,
            data: raw.data,
        })
    }
}

impl Image {
    /// All-zero image
    pub fn zeros(geometry: ImageGeometry) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            data: DMatrix::zeros(geometry.nx, geometry.ny),
        })
    }

    /// Build from samples listed with x varying fastest.
    pub fn from_samples(geometry: ImageGeometry, samples: Vec<f64>) -> Result<Self> {
        geometry.validate()?;
        if samples.len() != geometry.len() {
            return Err(DivergenceError::SampleCountMismatch {
                expected: geometry.len(),
                got: samples.len(),
            });
        }
        Ok(Self {
            geometry,
            data: DMatrix::from_vec(geometry.nx, geometry.ny, samples),
        })
    }

    /// Sample `f(x, y)` at every pixel centre.
    pub fn from_fn<F>(geometry: ImageGeometry, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        geometry.validate()?;
        let data = DMatrix::from_fn(geometry.nx, geometry.ny, |i, j| {
            f(geometry.x_centre(i), geometry.y_centre(j))
        });
        Ok(Self { geometry, data })
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.geometry.nx
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.geometry.ny
    }

    /// Pixel size (dx, dy)
    #[inline]
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.geometry.dx, self.geometry.dy)
    }

    /// Physical coordinate of the centre of pixel (i, j)
    #[inline]
    pub fn pixel_centre(&self, i: usize, j: usize) -> (f64, f64) {
        (self.geometry.x_centre(i), self.geometry.y_centre(j))
    }

    /// Sample at pixel (i, j).
    ///
    /// # Panics
    ///
    /// Panics if `i >= nx` or `j >= ny`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    /// Overwrite the sample at pixel (i, j).
    ///
    /// # Panics
    ///
    /// Panics if `i >= nx` or `j >= ny`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[(i, j)] = value;
    }

    /// Samples in canonical order (x fastest)
    #[inline]
    pub fn samples(&self) -> &[f64] {
        self.data.as_slice()
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f64] {
        self.data.as_mut_slice()
    }

    /// Underlying matrix, shape (nx, ny)
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Total flux (sum of samples, canonical order)
    pub fn flux(&self) -> f64 {
        self.samples().iter().sum()
    }

    /// Copy of this image scaled so its samples sum to 1.
    pub fn normalized(&self) -> Result<Image> {
        let flux = self.flux();
        if !flux.is_finite() || flux <= 0.0 {
            return Err(DivergenceError::InvalidImage(format!(
                "cannot normalize image with flux {}",
                flux
            )));
        }
        Ok(Self {
            geometry: self.geometry,
            data: self.data.map(|v| v / flux),
        })
    }

    /// Same dimensions and pixel size
    #[inline]
    pub fn same_geometry(&self, other: &Image) -> bool {
        self.geometry == other.geometry
    }

    /// Overwrite every sample with `f(x, y)` at the pixel centre.
    pub fn fill_with<F>(&mut self, f: F)
    where
        F: Fn(f64, f64) -> f64,
    {
        let geometry = self.geometry;
        for j in 0..geometry.ny {
            let y = geometry.y_centre(j);
            for i in 0..geometry.nx {
                self.data[(i, j)] = f(geometry.x_centre(i), y);
            }
        }
    }

    /// Copy samples from an image on the same grid.
    pub fn copy_from(&mut self, other: &Image) -> Result<()> {
        self.geometry.ensure_matches(&other.geometry)?;
        self.data.copy_from(&other.data);
        Ok(())
    }

    /// Flux-weighted centroid (x̄, ȳ); `None` for non-positive flux.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let flux = self.flux();
        if !flux.is_finite() || flux <= 0.0 {
            return None;
        }
        let mut sx = 0.0;
        let mut sy = 0.0;
        for j in 0..self.ny() {
            for i in 0..self.nx() {
                let (x, y) = self.pixel_centre(i, j);
                let v = self.data[(i, j)];
                sx += v * x;
                sy += v * y;
            }
        }
        Some((sx / flux, sy / flux))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DivergenceError::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON, rejecting matrices that disagree with the geometry.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawImage = serde_json::from_str(json)
            .map_err(|e| DivergenceError::SerializationError(e.to_string()))?;
        Image::try_from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_geometry_validation() {
        assert!(ImageGeometry::new(0, 4, 1.0, 1.0).is_err());
        assert!(ImageGeometry::new(4, 4, 0.0, 1.0).is_err());
        assert!(ImageGeometry::new(4, 4, 1.0, f64::NAN).is_err());

        let g = ImageGeometry::from_fov(8.0, 4.0, 4, 2).unwrap();
        assert_eq!(g.dx, 2.0);
        assert_eq!(g.dy, 2.0);
        assert_eq!(g.field_of_view(), (8.0, 4.0));
    }

    #[test]
    fn test_pixel_centres_are_origin_centred() {
        let g = ImageGeometry::new(4, 3, 1.0, 2.0).unwrap();
        assert_eq!(g.x_centre(0), -1.5);
        assert_eq!(g.x_centre(3), 1.5);
        assert_eq!(g.y_centre(0), -2.0);
        assert_eq!(g.y_centre(1), 0.0);
        assert_eq!(g.y_centre(2), 2.0);
    }

    #[test]
    fn test_samples_are_x_fastest() {
        let g = ImageGeometry::new(2, 2, 1.0, 1.0).unwrap();
        let img = Image::from_samples(g, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(img.get(1, 0), 2.0);
        assert_eq!(img.get(0, 1), 3.0);
        assert_eq!(img.flux(), 10.0);

        let bad = Image::from_samples(g, vec![1.0; 3]);
        assert!(matches!(
            bad,
            Err(DivergenceError::SampleCountMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_normalized() {
        let g = ImageGeometry::new(2, 2, 1.0, 1.0).unwrap();
        let img = Image::from_samples(g, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let norm = img.normalized().unwrap();
        assert!(norm.samples().iter().all(|&v| v == 0.25));
        assert!(approx_eq(norm.flux(), 1.0, 1e-12));

        let empty = Image::zeros(g).unwrap();
        assert!(matches!(
            empty.normalized(),
            Err(DivergenceError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_from_fn_and_centroid() {
        let g = ImageGeometry::new(5, 5, 1.0, 1.0).unwrap();
        let img = Image::from_fn(g, |x, y| if x == 1.0 && y == -2.0 { 3.0 } else { 0.0 }).unwrap();
        assert_eq!(img.get(3, 0), 3.0);
        let (cx, cy) = img.centroid().unwrap();
        assert!(approx_eq(cx, 1.0, 1e-12));
        assert!(approx_eq(cy, -2.0, 1e-12));
        assert!(Image::zeros(g).unwrap().centroid().is_none());
    }

    #[test]
    fn test_copy_from_checks_geometry() {
        let g = ImageGeometry::new(2, 2, 1.0, 1.0).unwrap();
        let h = ImageGeometry::new(2, 2, 0.5, 1.0).unwrap();
        let src = Image::from_samples(g, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut dst = Image::zeros(g).unwrap();
        dst.copy_from(&src).unwrap();
        assert_eq!(dst, src);

        assert!(dst.same_geometry(&src));
        dst.set(1, 1, 9.0);
        assert_eq!(dst.samples()[3], 9.0);

        let mut other = Image::zeros(h).unwrap();
        assert!(!other.same_geometry(&src));
        assert_eq!(other.pixel_size(), (0.5, 1.0));
        assert!(matches!(
            other.copy_from(&src),
            Err(DivergenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_serialization() {
        let g = ImageGeometry::new(3, 2, 0.5, 0.25).unwrap();
        let img = Image::from_samples(g, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let json = img.to_json().unwrap();
        let restored = Image::from_json(&json).unwrap();
        assert_eq!(img, restored);
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_range_panics() {
        let image = Image::zeros(ImageGeometry::new(2, 3, 1.0, 1.0).unwrap()).unwrap();
        image.get(2, 0);
    }

    #[test]
    fn test_deserialize_rejects_mismatched_matrix() {
        // 3x1 matrix under a 2x2 geometry
        let json = r#"{"geometry":{"nx":2,"ny":2,"dx":1.0,"dy":1.0},"data":[[1.0,1.0,1.0],3,1]}"#;

        assert!(matches!(
            Image::from_json(json),
            Err(DivergenceError::SampleCountMismatch { expected: 4, got: 3 })
        ));
        assert!(serde_json::from_str::<Image>(json).is_err());

        let empty = r#"{"geometry":{"nx":0,"ny":2,"dx":1.0,"dy":1.0},"data":[[],0,2]}"#;
        assert!(matches!(
            Image::from_json(empty),
            Err(DivergenceError::InvalidImage(_))
        ));
        assert!(serde_json::from_str::<Image>(empty).is_err());
    }
}
