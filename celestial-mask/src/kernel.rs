//! Interchangeable containment kernels.
//!
//! A kernel narrows a running boolean mask by one cap: every lane that is
//! still `true` stays `true` only if the cap contains that point. Lanes that
//! are already `false` are left alone, so a polygon's mask is the AND of its
//! caps however the work is split.
//!
//! Both kernels evaluate `1 − cx·x − cy·y − cz·z` with the same operation
//! order and feed the result through [`Cap::accepts`], so their outputs are
//! bit-identical. The SIMD kernel is only compiled with the `simd` feature;
//! without it [`Backend::Simd`] runs the scalar kernel.

use crate::cap::Cap;
use crate::points::PointSlice;
use serde::{Deserialize, Serialize};

/// Which containment kernel batched tests run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// One point at a time.
    Scalar,
    /// Four points per step using `wide::f64x4`.
    Simd,
}

impl Backend {
    /// The fastest backend compiled into this build.
    pub fn detect() -> Self {
        if Self::Simd.is_available() {
            Self::Simd
        } else {
            Self::Scalar
        }
    }

    /// Returns `true` if this backend runs natively in this build.
    pub fn is_available(self) -> bool {
        match self {
            Self::Scalar => true,
            Self::Simd => cfg!(feature = "simd"),
        }
    }

    /// Backend for a `use_fast_backend` setting.
    pub fn select(use_fast_backend: bool) -> Self {
        if use_fast_backend {
            Self::detect()
        } else {
            Self::Scalar
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::detect()
    }
}

/// Clears every lane of `mask` whose point lies outside `cap`.
pub(crate) fn and_cap(cap: &Cap, backend: Backend, points: PointSlice<'_>, mask: &mut [bool]) {
    debug_assert_eq!(points.len(), mask.len());
    match backend {
        #[cfg(feature = "simd")]
        Backend::Simd => simd::and_cap(cap, points, mask),
        _ => and_cap_scalar(cap, points, mask),
    }
}

fn and_cap_scalar(cap: &Cap, points: PointSlice<'_>, mask: &mut [bool]) {
    for (i, lane) in mask.iter_mut().enumerate() {
        if *lane {
            *lane = cap.contains(points.x[i], points.y[i], points.z[i]);
        }
    }
}

#[cfg(feature = "simd")]
mod simd {
    use super::{and_cap_scalar, Cap, PointSlice};
    use wide::f64x4;

    const LANES: usize = 4;

    pub(super) fn and_cap(cap: &Cap, points: PointSlice<'_>, mask: &mut [bool]) {
        let one = f64x4::splat(1.0);
        let cx = f64x4::splat(cap.x);
        let cy = f64x4::splat(cap.y);
        let cz = f64x4::splat(cap.z);

        let full = mask.len() - mask.len() % LANES;
        let (head, tail) = mask.split_at_mut(full);

        let chunks = head
            .chunks_exact_mut(LANES)
            .zip(points.x[..full].chunks_exact(LANES))
            .zip(points.y[..full].chunks_exact(LANES))
            .zip(points.z[..full].chunks_exact(LANES));

        for (((lanes, x), y), z) in chunks {
            if !lanes.iter().any(|&m| m) {
                continue;
            }
            let px = f64x4::from([x[0], x[1], x[2], x[3]]);
            let py = f64x4::from([y[0], y[1], y[2], y[3]]);
            let pz = f64x4::from([z[0], z[1], z[2], z[3]]);
            let cd = one - cx * px - cy * py - cz * pz;
            for (lane, d) in lanes.iter_mut().zip(cd.to_array()) {
                *lane = *lane && cap.accepts(d);
            }
        }

        let rest = PointSlice {
            x: &points.x[full..],
            y: &points.y[full..],
            z: &points.z[full..],
        };
        and_cap_scalar(cap, rest, tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::UnitVectors;

    fn grid(n: usize) -> UnitVectors {
        let ra: Vec<f64> = (0..n).map(|i| (i as f64 * 7.31) % 360.0).collect();
        let dec: Vec<f64> = (0..n).map(|i| -89.0 + (i as f64 * 3.17) % 178.0).collect();
        UnitVectors::from_radec(&ra, &dec).unwrap()
    }

    #[test]
    fn test_detect_is_available() {
        assert!(Backend::detect().is_available());
        assert!(Backend::Scalar.is_available());
        assert_eq!(Backend::select(false), Backend::Scalar);
    }

    #[test]
    fn test_kernels_agree_on_odd_lengths() {
        let cap = Cap::from_axis_radius(120.0, -20.0, 55.0);
        for n in [0, 1, 3, 4, 5, 8, 13, 101] {
            let points = grid(n);
            let mut scalar = vec![true; n];
            let mut fast = vec![true; n];
            and_cap(&cap, Backend::Scalar, points.as_slice(), &mut scalar);
            and_cap(&cap, Backend::Simd, points.as_slice(), &mut fast);
            assert_eq!(scalar, fast, "n = {n}");
        }
    }

    #[test]
    fn test_false_lanes_stay_false() {
        let cap = Cap::new(0.0, 0.0, 1.0, 2.0);
        let points = grid(9);
        let mut mask = vec![false, true, false, true, false, true, false, true, false];
        let before = mask.clone();
        and_cap(&cap, Backend::Simd, points.as_slice(), &mut mask);
        for (after, before) in mask.iter().zip(before) {
            assert!(!*after || before);
        }
    }
}
