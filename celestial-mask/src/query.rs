//! Point classification against a mask.
//!
//! Batched and single-point lookups resolve overlapping polygons
//! differently, and both rules are part of the contract:
//!
//! - [`QueryEngine::classify`] scans every polygon in storage order and the
//!   **last** polygon containing a point wins. [`areas_of`](QueryEngine::areas_of)
//!   and [`weights_of`](QueryEngine::weights_of) follow the same rule.
//! - [`QueryEngine::polygon_id`], [`weight`](QueryEngine::weight) and
//!   [`area`](QueryEngine::area) return the **first** containing polygon and
//!   stop scanning.
//!
//! Every query is an exhaustive scan over the polygon list. Batches are split
//! into chunks of [`QueryConfig::chunk_size`] points, which run on the rayon
//! pool when the `parallel` feature is enabled.

use crate::errors::{MaskError, Result};
use crate::mask::Mask;
use crate::options::QueryConfig;
use crate::points::{unit_vector, PointSlice, UnitVectors};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Id reported by [`QueryEngine::classify`] for points outside every polygon.
pub const UNMATCHED: i64 = -1;

/// Read-only query view over a [`Mask`].
///
/// Any number of engines can query the same mask concurrently.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    mask: &'a Mask,
    config: QueryConfig,
}

impl<'a> QueryEngine<'a> {
    pub fn new(mask: &'a Mask) -> Self {
        Self::with_config(mask, QueryConfig::default())
    }

    pub fn with_config(mask: &'a Mask, config: QueryConfig) -> Self {
        Self { mask, config }
    }

    pub fn mask(&self) -> &'a Mask {
        self.mask
    }

    pub fn config(&self) -> QueryConfig {
        self.config
    }

    /// Polygon id for every `(ra, dec)` pair in degrees, [`UNMATCHED`] where
    /// no polygon contains the point. Overlaps resolve to the last polygon.
    ///
    /// # Errors
    /// Returns a validation error when `ra` and `dec` differ in length.
    pub fn classify(&self, ra_deg: &[f64], dec_deg: &[f64]) -> Result<Vec<i64>> {
        let points = UnitVectors::from_radec(ra_deg, dec_deg)?;
        Ok(self.classify_points(&points))
    }

    /// [`classify`](Self::classify) for points already converted to unit vectors.
    pub fn classify_points(&self, points: &UnitVectors) -> Vec<i64> {
        let ids = self.mask.ids();
        self.match_positions(points)
            .into_iter()
            .map(|position| position.map_or(UNMATCHED, |i| ids[i]))
            .collect()
    }

    /// Storage position of the polygon each point classifies into, using
    /// the same last-match rule as [`classify`](Self::classify).
    ///
    /// # Errors
    /// Returns a validation error when `ra` and `dec` differ in length.
    pub fn classify_positions(&self, ra_deg: &[f64], dec_deg: &[f64]) -> Result<Vec<Option<usize>>> {
        let points = UnitVectors::from_radec(ra_deg, dec_deg)?;
        Ok(self.match_positions(&points))
    }

    /// Area of the polygon each point classifies into.
    ///
    /// # Errors
    /// Returns a lookup error naming the first point outside every polygon.
    pub fn areas_of(&self, ra_deg: &[f64], dec_deg: &[f64]) -> Result<Vec<f64>> {
        self.gather(ra_deg, dec_deg, self.mask.areas())
    }

    /// Weight of the polygon each point classifies into.
    ///
    /// # Errors
    /// Returns a lookup error naming the first point outside every polygon.
    pub fn weights_of(&self, ra_deg: &[f64], dec_deg: &[f64]) -> Result<Vec<f64>> {
        self.gather(ra_deg, dec_deg, self.mask.weights())
    }

    /// Id of the first polygon containing the point.
    pub fn polygon_id(&self, ra_deg: f64, dec_deg: f64) -> Option<i64> {
        self.first_match(ra_deg, dec_deg).map(|i| self.mask.ids()[i])
    }

    /// Weight of the first polygon containing the point.
    pub fn weight(&self, ra_deg: f64, dec_deg: f64) -> Option<f64> {
        self.first_match(ra_deg, dec_deg).map(|i| self.mask.weights()[i])
    }

    /// Area of the first polygon containing the point.
    pub fn area(&self, ra_deg: f64, dec_deg: f64) -> Option<f64> {
        self.first_match(ra_deg, dec_deg).map(|i| self.mask.areas()[i])
    }

    /// `(sum of areas, sum of weight × area)` over the whole mask.
    pub fn total_area(&self) -> (f64, f64) {
        self.mask.total_area()
    }

    /// Storage position of the first polygon containing the point.
    pub fn first_match(&self, ra_deg: f64, dec_deg: f64) -> Option<usize> {
        let (x, y, z) = unit_vector(ra_deg, dec_deg);
        self.mask
            .polygons()
            .iter()
            .position(|polygon| polygon.contains_unit(x, y, z))
    }

    fn gather(&self, ra_deg: &[f64], dec_deg: &[f64], values: &[f64]) -> Result<Vec<f64>> {
        let points = UnitVectors::from_radec(ra_deg, dec_deg)?;
        self.match_positions(&points)
            .into_iter()
            .enumerate()
            .map(|(k, position)| {
                position
                    .map(|i| values[i])
                    .ok_or_else(|| MaskError::lookup(k, ra_deg[k], dec_deg[k]))
            })
            .collect()
    }

    /// Storage position of the last polygon containing each point.
    fn match_positions(&self, points: &UnitVectors) -> Vec<Option<usize>> {
        let n = points.len();
        let chunk = self.config.chunk_size.max(1);
        let starts: Vec<usize> = (0..n).step_by(chunk).collect();

        #[cfg(feature = "parallel")]
        let parts: Vec<Vec<Option<usize>>> = starts
            .into_par_iter()
            .map(|start| self.match_chunk(points.slice(start..(start + chunk).min(n))))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let parts: Vec<Vec<Option<usize>>> = starts
            .into_iter()
            .map(|start| self.match_chunk(points.slice(start..(start + chunk).min(n))))
            .collect();

        tracing::trace!(points = n, chunks = parts.len(), polygons = self.mask.len(), "classified batch");
        parts.into_iter().flatten().collect()
    }

    fn match_chunk(&self, points: PointSlice<'_>) -> Vec<Option<usize>> {
        let mut matched = vec![None; points.len()];
        let mut inside = vec![true; points.len()];
        for (position, polygon) in self.mask.polygons().iter().enumerate() {
            inside.fill(true);
            polygon.and_into(points, self.config.backend, &mut inside);
            for (slot, &hit) in matched.iter_mut().zip(&inside) {
                if hit {
                    *slot = Some(position);
                }
            }
        }
        matched
    }
}

impl Mask {
    /// Query engine over this mask with the default configuration.
    pub fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(self)
    }
}
