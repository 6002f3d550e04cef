//! Spherical caps: the one-sided regions every polygon is built from.
//!
//! A cap is stored as `(x, y, z, cm)`. `(x, y, z)` is the axis direction and
//! `cm = 1 − cos r` for angular radius `r`. A positive `cm` selects the region
//! within `r` of the axis; a negative `cm` selects the complement, the region
//! farther than `arccos(1 − |cm|)` from the axis.
//!
//! For a test direction `p`, `cd = 1 − axis·p` is `1 − cos θ` where θ is the
//! angle between `p` and the axis. Containment is then:
//!
//! ```text
//! cm <  0:  cd > |cm|
//! cm >= 0:  cd <  cm
//! ```
//!
//! ```
//! use celestial_mask::Cap;
//!
//! // 10° circle around the north pole
//! let cap = Cap::from_axis_radius(0.0, 90.0, 10.0);
//! let (x, y, z) = celestial_mask::points::unit_vector(0.0, 85.0);
//! assert!(cap.contains(x, y, z));
//! assert!(!cap.complement().contains(x, y, z));
//! ```

use crate::kernel::{self, Backend};
use crate::points::{unit_vector, UnitVectors, DEG_TO_RAD};
use serde::{Deserialize, Serialize};

/// A one-sided spherical region bounded by a circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cap {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// `1 − cos(radius)`, negated for the complementary region. Lies in `[-2, 2]`.
    pub cm: f64,
}

impl Cap {
    pub fn new(x: f64, y: f64, z: f64, cm: f64) -> Self {
        Self { x, y, z, cm }
    }

    /// Builds a cap from an `[x, y, z, cm]` row.
    pub fn from_array(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.cm]
    }

    /// Cap of angular radius `radius_deg` around the position `(ra_deg, dec_deg)`.
    pub fn from_axis_radius(ra_deg: f64, dec_deg: f64, radius_deg: f64) -> Self {
        let (x, y, z) = unit_vector(ra_deg, dec_deg);
        let cm = 1.0 - libm::cos(radius_deg * DEG_TO_RAD);
        Self::new(x, y, z, cm)
    }

    /// The same boundary with the other side selected.
    pub fn complement(&self) -> Self {
        Self::new(self.x, self.y, self.z, -self.cm)
    }

    /// `1 − cos θ` between the cap axis and the direction `(x, y, z)`.
    #[inline]
    pub fn cos_distance(&self, x: f64, y: f64, z: f64) -> f64 {
        1.0 - self.x * x - self.y * y - self.z * z
    }

    /// Applies the containment rule to a precomputed `1 − cos θ`.
    #[inline]
    pub fn accepts(&self, cd: f64) -> bool {
        if self.cm < 0.0 {
            cd > libm::fabs(self.cm)
        } else {
            cd < self.cm
        }
    }

    /// Returns `true` if the direction `(x, y, z)` lies in this cap.
    #[inline]
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        self.accepts(self.cos_distance(x, y, z))
    }

    /// Containment for every point of a batch, element by element.
    ///
    /// Each element equals [`Cap::contains`] on the same point.
    pub fn contains_batch(&self, points: &UnitVectors) -> Vec<bool> {
        self.contains_batch_with(points, Backend::detect())
    }

    /// [`Cap::contains_batch`] with an explicit containment backend.
    pub fn contains_batch_with(&self, points: &UnitVectors, backend: Backend) -> Vec<bool> {
        let mut mask = vec![true; points.len()];
        kernel::and_cap(self, backend, points.as_slice(), &mut mask);
        mask
    }
}

impl From<[f64; 4]> for Cap {
    fn from(values: [f64; 4]) -> Self {
        Self::from_array(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angular_distance_deg(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
        let (x1, y1, z1) = unit_vector(ra1, dec1);
        let (x2, y2, z2) = unit_vector(ra2, dec2);
        let dot = (x1 * x2 + y1 * y2 + z1 * z2).clamp(-1.0, 1.0);
        libm::acos(dot) / DEG_TO_RAD
    }

    #[test]
    fn test_small_cap_contains_nearby_points() {
        let cap = Cap::from_axis_radius(30.0, 20.0, 5.0);
        let (x, y, z) = unit_vector(31.0, 21.0);
        assert!(cap.contains(x, y, z));
        let (x, y, z) = unit_vector(40.0, 20.0);
        assert!(!cap.contains(x, y, z));
    }

    #[test]
    fn test_negative_cm_selects_complement() {
        let cap = Cap::from_axis_radius(0.0, 0.0, 30.0).complement();
        assert!(cap.cm < 0.0);
        let (x, y, z) = unit_vector(0.0, 0.0);
        assert!(!cap.contains(x, y, z));
        let (x, y, z) = unit_vector(180.0, 0.0);
        assert!(cap.contains(x, y, z));
    }

    #[test]
    fn test_containment_matches_angular_radius() {
        let radii = [0.5, 10.0, 45.0, 90.0, 135.0];
        let probes = [
            (0.0, 0.0),
            (10.0, 5.0),
            (100.0, -30.0),
            (200.0, 60.0),
            (300.0, -80.0),
            (45.0, 44.0),
        ];
        for &radius in &radii {
            let positive = Cap::from_axis_radius(20.0, 10.0, radius);
            let negative = positive.complement();
            let limit = libm::acos(1.0 - positive.cm) / DEG_TO_RAD;
            for &(ra, dec) in &probes {
                let dist = angular_distance_deg(20.0, 10.0, ra, dec);
                if (dist - limit).abs() < 1e-6 {
                    continue;
                }
                let (x, y, z) = unit_vector(ra, dec);
                assert_eq!(positive.contains(x, y, z), dist < limit, "r={radius} p=({ra},{dec})");
                assert_eq!(negative.contains(x, y, z), dist > limit, "r={radius} p=({ra},{dec})");
            }
        }
    }

    #[test]
    fn test_zero_cm_contains_nothing_at_axis_distance() {
        let cap = Cap::new(0.0, 0.0, 1.0, 0.0);
        let (x, y, z) = unit_vector(0.0, 10.0);
        assert!(!cap.contains(x, y, z));
    }

    #[test]
    fn test_batch_matches_scalar_for_all_backends() {
        let ra: Vec<f64> = (0..37).map(|i| i as f64 * 9.7).collect();
        let dec: Vec<f64> = (0..37).map(|i| -85.0 + i as f64 * 4.7).collect();
        let points = UnitVectors::from_radec(&ra, &dec).unwrap();
        let caps = [
            Cap::from_axis_radius(100.0, 10.0, 40.0),
            Cap::from_axis_radius(100.0, 10.0, 40.0).complement(),
            Cap::new(0.0, 0.0, 1.0, 1.0),
        ];

        for cap in &caps {
            let expected: Vec<bool> = (0..points.len())
                .map(|i| cap.contains(points.x()[i], points.y()[i], points.z()[i]))
                .collect();
            assert_eq!(cap.contains_batch_with(&points, Backend::Scalar), expected);
            assert_eq!(cap.contains_batch_with(&points, Backend::Simd), expected);
        }
    }

    #[test]
    fn test_array_round_trip() {
        let cap = Cap::from([0.1, 0.2, 0.97, -0.25]);
        assert_eq!(cap.to_array(), [0.1, 0.2, 0.97, -0.25]);
    }
}
