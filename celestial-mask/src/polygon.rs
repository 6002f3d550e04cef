//! Polygons as conjunctions of caps.
//!
//! A point is inside a polygon when every one of its caps contains it. Cap
//! order never changes the answer, but the scalar test stops at the first cap
//! that rejects the point. A polygon with no caps contains no tested point.

use crate::cap::Cap;
use crate::kernel::{self, Backend};
use crate::points::{radec_to_angles, unit_vector_from_angles, PointSlice, UnitVectors};
use serde::{Deserialize, Serialize};

/// Ordered list of caps whose intersection is the polygon's region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    caps: Vec<Cap>,
}

impl Polygon {
    pub fn new(caps: Vec<Cap>) -> Self {
        Self { caps }
    }

    pub fn caps(&self) -> &[Cap] {
        &self.caps
    }

    pub fn ncaps(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// Containment of a unit vector, stopping at the first rejecting cap.
    #[inline]
    pub fn contains_unit(&self, x: f64, y: f64, z: f64) -> bool {
        !self.caps.is_empty() && self.caps.iter().all(|cap| cap.contains(x, y, z))
    }

    /// Containment of colatitude `theta` and longitude `phi` in radians.
    pub fn contains_angles(&self, theta: f64, phi: f64) -> bool {
        let (x, y, z) = unit_vector_from_angles(theta, phi);
        self.contains_unit(x, y, z)
    }

    /// Containment of a position in decimal degrees.
    pub fn contains(&self, ra_deg: f64, dec_deg: f64) -> bool {
        let (theta, phi) = radec_to_angles(ra_deg, dec_deg);
        self.contains_angles(theta, phi)
    }

    /// Containment for every point of a batch.
    pub fn contains_batch(&self, points: &UnitVectors, backend: Backend) -> Vec<bool> {
        let mut mask = vec![true; points.len()];
        self.and_into(points.as_slice(), backend, &mut mask);
        mask
    }

    /// ANDs this polygon's caps into `mask`.
    pub(crate) fn and_into(&self, points: PointSlice<'_>, backend: Backend, mask: &mut [bool]) {
        if self.caps.is_empty() {
            mask.fill(false);
            return;
        }
        for cap in &self.caps {
            kernel::and_cap(cap, backend, points, mask);
        }
    }
}

impl From<Vec<Cap>> for Polygon {
    fn from(caps: Vec<Cap>) -> Self {
        Self::new(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::unit_vector;

    /// Band 0° < dec < 30° intersected with a 40° circle around (0°, 15°).
    fn lens() -> Polygon {
        Polygon::new(vec![
            Cap::new(0.0, 0.0, 1.0, 1.0),
            Cap::new(0.0, 0.0, 1.0, -(1.0 - libm::cos(60.0 * crate::points::DEG_TO_RAD))),
            Cap::from_axis_radius(0.0, 15.0, 40.0),
        ])
    }

    #[test]
    fn test_contains_requires_every_cap() {
        let polygon = lens();
        assert!(polygon.contains(10.0, 15.0));
        assert!(!polygon.contains(10.0, -5.0));
        assert!(!polygon.contains(10.0, 35.0));
        assert!(!polygon.contains(90.0, 15.0));
    }

    #[test]
    fn test_cap_order_does_not_matter() {
        let polygon = lens();
        let mut reversed: Vec<Cap> = polygon.caps().to_vec();
        reversed.reverse();
        let reversed = Polygon::new(reversed);

        for ra in (0..360).step_by(15) {
            for dec in (-80..=80).step_by(10) {
                assert_eq!(
                    polygon.contains(ra as f64, dec as f64),
                    reversed.contains(ra as f64, dec as f64)
                );
            }
        }
    }

    #[test]
    fn test_empty_polygon_contains_nothing() {
        let polygon = Polygon::default();
        assert!(!polygon.contains(0.0, 0.0));
        let points = UnitVectors::from_radec(&[0.0, 50.0], &[0.0, 10.0]).unwrap();
        assert_eq!(polygon.contains_batch(&points, Backend::Scalar), vec![false, false]);
        assert_eq!(polygon.contains_batch(&points, Backend::Simd), vec![false, false]);
    }

    #[test]
    fn test_batch_matches_scalar() {
        let polygon = lens();
        let ra: Vec<f64> = (0..60).map(|i| i as f64 * 6.0 - 30.0).collect();
        let dec: Vec<f64> = (0..60).map(|i| (i % 12) as f64 * 5.0 - 10.0).collect();
        let points = UnitVectors::from_radec(&ra, &dec).unwrap();

        let expected: Vec<bool> = ra
            .iter()
            .zip(&dec)
            .map(|(&r, &d)| polygon.contains(r, d))
            .collect();

        assert_eq!(polygon.contains_batch(&points, Backend::Scalar), expected);
        assert_eq!(polygon.contains_batch(&points, Backend::Simd), expected);
    }

    #[test]
    fn test_contains_angles_matches_degrees() {
        let polygon = lens();
        let (theta, phi) = radec_to_angles(5.0, 12.0);
        assert_eq!(polygon.contains_angles(theta, phi), polygon.contains(5.0, 12.0));
        let (x, y, z) = unit_vector(5.0, 12.0);
        assert_eq!(polygon.contains_unit(x, y, z), polygon.contains(5.0, 12.0));
    }
}
