//! Sky position to unit-vector conversion.
//!
//! Every containment test works on Cartesian unit vectors. A position given as
//! right ascension / declination in degrees is mapped to colatitude
//! `θ = π/180·(90 − dec)` and longitude `φ = π/180·ra`, then to
//! `(sin θ cos φ, sin θ sin φ, cos θ)`.
//!
//! The scalar and batched paths share [`unit_vector_from_angles`], so a point
//! converted on its own is bit-identical to the same point converted as part
//! of a batch.

use crate::errors::{MaskError, Result};

/// Degrees to radians, computed as `π / 180`.
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Unit vector for colatitude `theta` and longitude `phi`, both in radians.
#[inline]
pub fn unit_vector_from_angles(theta: f64, phi: f64) -> (f64, f64, f64) {
    let (sin_theta, cos_theta) = libm::sincos(theta);
    let (sin_phi, cos_phi) = libm::sincos(phi);
    (sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

/// Colatitude and longitude in radians for a position in decimal degrees.
#[inline]
pub fn radec_to_angles(ra_deg: f64, dec_deg: f64) -> (f64, f64) {
    (DEG_TO_RAD * (90.0 - dec_deg), DEG_TO_RAD * ra_deg)
}

/// Unit vector for a position in decimal degrees.
#[inline]
pub fn unit_vector(ra_deg: f64, dec_deg: f64) -> (f64, f64, f64) {
    let (theta, phi) = radec_to_angles(ra_deg, dec_deg);
    unit_vector_from_angles(theta, phi)
}

/// A batch of points stored as three equal-length coordinate columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitVectors {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl UnitVectors {
    /// Converts paired `ra`/`dec` arrays (decimal degrees) into unit vectors.
    ///
    /// # Errors
    /// Returns a validation error if the two arrays differ in length.
    pub fn from_radec(ra_deg: &[f64], dec_deg: &[f64]) -> Result<Self> {
        if ra_deg.len() != dec_deg.len() {
            return Err(MaskError::validation(
                "UnitVectors::from_radec",
                &format!(
                    "ra has {} elements but dec has {}",
                    ra_deg.len(),
                    dec_deg.len()
                ),
            ));
        }

        let n = ra_deg.len();
        let mut points = Self {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
        };
        for (&ra, &dec) in ra_deg.iter().zip(dec_deg) {
            let (x, y, z) = unit_vector(ra, dec);
            points.x.push(x);
            points.y.push(y);
            points.z.push(z);
        }
        Ok(points)
    }

    /// Wraps existing Cartesian columns.
    ///
    /// # Errors
    /// Returns a validation error if the columns differ in length.
    pub fn from_xyz(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(MaskError::validation(
                "UnitVectors::from_xyz",
                &format!(
                    "coordinate columns differ in length ({}, {}, {})",
                    x.len(),
                    y.len(),
                    z.len()
                ),
            ));
        }
        Ok(Self { x, y, z })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Borrowed view of the points in `range`.
    pub(crate) fn slice(&self, range: std::ops::Range<usize>) -> PointSlice<'_> {
        PointSlice {
            x: &self.x[range.clone()],
            y: &self.y[range.clone()],
            z: &self.z[range],
        }
    }

    pub(crate) fn as_slice(&self) -> PointSlice<'_> {
        self.slice(0..self.len())
    }
}

/// Borrowed, equal-length coordinate columns.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PointSlice<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub z: &'a [f64],
}

impl PointSlice<'_> {
    pub fn len(&self) -> usize {
        self.x.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_pole_maps_to_z_axis() {
        let (x, y, z) = unit_vector(123.0, 90.0);
        assert!(x.abs() < 1e-15);
        assert!(y.abs() < 1e-15);
        assert!((z - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_equator_ra_90_maps_to_y_axis() {
        let (x, y, z) = unit_vector(90.0, 0.0);
        assert!(x.abs() < 1e-15);
        assert!((y - 1.0).abs() < 1e-15);
        assert!(z.abs() < 1e-15);
    }

    #[test]
    fn test_batch_matches_scalar_bitwise() {
        let ra = [0.0, 12.5, 181.25, 359.999, 45.0];
        let dec = [-89.9, 0.0, 33.3, -12.0, 60.0];
        let points = UnitVectors::from_radec(&ra, &dec).unwrap();

        for i in 0..ra.len() {
            let (x, y, z) = unit_vector(ra[i], dec[i]);
            assert_eq!(points.x()[i].to_bits(), x.to_bits());
            assert_eq!(points.y()[i].to_bits(), y.to_bits());
            assert_eq!(points.z()[i].to_bits(), z.to_bits());
        }
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let result = UnitVectors::from_radec(&[1.0, 2.0], &[3.0]);
        assert!(matches!(result, Err(MaskError::Validation { .. })));

        let result = UnitVectors::from_xyz(vec![1.0], vec![0.0, 0.0], vec![0.0]);
        assert!(matches!(result, Err(MaskError::Validation { .. })));
    }

    #[test]
    fn test_unit_length() {
        let points = UnitVectors::from_radec(&[10.0, 200.0], &[-45.0, 71.0]).unwrap();
        for i in 0..points.len() {
            let norm =
                points.x()[i].powi(2) + points.y()[i].powi(2) + points.z()[i].powi(2);
            assert!((norm - 1.0).abs() < 1e-14);
        }
    }
}
