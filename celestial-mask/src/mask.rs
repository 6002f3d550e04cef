//! The mask store: polygons plus index-aligned per-polygon attributes.
//!
//! A [`Mask`] keeps its polygons, ids, weights, areas, pixels and auxiliary
//! columns in parallel arrays. Every array always has one entry per polygon;
//! the only ways to change a mask are the attribute setters and column
//! add/remove, all of which validate their arguments before touching
//! anything. [`Mask::select`] returns a fully independent copy.
//!
//! Masks loaded from files go through id reconciliation exactly once, so
//! that afterwards `ids[i]` describes polygon `i`:
//!
//! - ids already `0..n` in order are left alone;
//! - a shuffled permutation of `0..n` is stably sorted, moving every array;
//! - anything else is copied into an `ids` column and replaced with `0..n`.

use crate::column::{is_reserved_name, normalize_name, Column, ColumnData, ColumnFormat, ColumnSet};
use crate::errors::{ConsistencyWarning, MaskError, Result, WarningLog};
use crate::polygon::Polygon;
use crate::selection::Selection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Pixelization scheme letter from the mask header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelScheme {
    /// `s`: equal-area fixed-size pixels.
    Simple,
    /// `d`: SDSS stripe pixels. Recorded but not implemented.
    Sdss,
}

impl PixelScheme {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            's' => Some(Self::Simple),
            'd' => Some(Self::Sdss),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Simple => 's',
            Self::Sdss => 'd',
        }
    }
}

/// `(resolution, scheme)` pair declared in the mask header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixelization {
    pub resolution: i32,
    pub scheme: PixelScheme,
}

impl fmt::Display for Pixelization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resolution, self.scheme.code())
    }
}

/// Provenance metadata carried verbatim through every codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskHeader {
    pub pixelization: Option<Pixelization>,
    pub snapped: bool,
    pub balkanized: bool,
}

/// One polygon and its core attributes, as pushed into a [`MaskBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonEntry {
    pub id: i64,
    pub polygon: Polygon,
    pub weight: f64,
    /// Steradians; `-1` when unknown.
    pub area: f64,
    pub pixel: i32,
}

impl PolygonEntry {
    /// Entry with the default attributes: weight 0, unknown area, pixel 0.
    pub fn new(id: i64, polygon: Polygon) -> Self {
        Self {
            id,
            polygon,
            weight: 0.0,
            area: -1.0,
            pixel: 0,
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn area(mut self, area: f64) -> Self {
        self.area = area;
        self
    }

    pub fn pixel(mut self, pixel: i32) -> Self {
        self.pixel = pixel;
        self
    }
}

/// Accumulates polygons into a [`Mask`].
#[derive(Debug, Default)]
pub struct MaskBuilder {
    mask: Mask,
}

impl MaskBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            mask: Mask {
                polygons: Vec::with_capacity(capacity),
                ids: Vec::with_capacity(capacity),
                weights: Vec::with_capacity(capacity),
                areas: Vec::with_capacity(capacity),
                pixels: Vec::with_capacity(capacity),
                ..Mask::default()
            },
        }
    }

    pub fn header(mut self, header: MaskHeader) -> Self {
        self.mask.header = header;
        self
    }

    pub fn push(&mut self, entry: PolygonEntry) -> &mut Self {
        self.mask.polygons.push(entry.polygon);
        self.mask.ids.push(entry.id);
        self.mask.weights.push(entry.weight);
        self.mask.areas.push(entry.area);
        self.mask.pixels.push(entry.pixel);
        self
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn build(self) -> Mask {
        self.mask
    }
}

/// Read-only view of one polygon and its attributes.
#[derive(Debug, Clone, Copy)]
pub struct PolygonView<'a> {
    pub index: usize,
    pub id: i64,
    pub polygon: &'a Polygon,
    pub weight: f64,
    pub area: f64,
    pub pixel: i32,
}

/// Ordered collection of polygons with per-polygon attributes and metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mask {
    polygons: Vec<Polygon>,
    ids: Vec<i64>,
    weights: Vec<f64>,
    areas: Vec<f64>,
    pixels: Vec<i32>,
    header: MaskHeader,
    columns: ColumnSet,
}

impl Mask {
    pub fn builder() -> MaskBuilder {
        MaskBuilder::default()
    }

    /// Number of polygons.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn polygon(&self, index: usize) -> Option<&Polygon> {
        self.polygons.get(index)
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    pub fn pixels(&self) -> &[i32] {
        &self.pixels
    }

    /// Cap count of every polygon.
    pub fn ncaps(&self) -> Vec<usize> {
        self.polygons.iter().map(Polygon::ncaps).collect()
    }

    /// Largest cap count across all polygons, 0 for an empty mask.
    pub fn max_ncaps(&self) -> usize {
        self.polygons.iter().map(Polygon::ncaps).max().unwrap_or(0)
    }

    pub fn header(&self) -> &MaskHeader {
        &self.header
    }

    pub fn set_header(&mut self, header: MaskHeader) {
        self.header = header;
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Polygons with their attributes, in storage order.
    pub fn iter(&self) -> impl Iterator<Item = PolygonView<'_>> + '_ {
        (0..self.len()).map(move |index| PolygonView {
            index,
            id: self.ids[index],
            polygon: &self.polygons[index],
            weight: self.weights[index],
            area: self.areas[index],
            pixel: self.pixels[index],
        })
    }

    /// `(sum of areas, sum of weight × area)`.
    pub fn total_area(&self) -> (f64, f64) {
        self.areas
            .iter()
            .zip(&self.weights)
            .fold((0.0, 0.0), |(area, weighted), (&a, &w)| {
                (area + a, weighted + a * w)
            })
    }

    /// Number of distinct pixel numbers in use.
    pub fn distinct_pixel_count(&self) -> usize {
        self.pixels.iter().collect::<HashSet<_>>().len()
    }

    pub fn set_weight(&mut self, selection: impl Into<Selection>, weight: f64) -> Result<()> {
        let indices = selection.into().resolve(self.len())?;
        fill(&mut self.weights, &indices, weight);
        Ok(())
    }

    /// Assigns `weights[k]` to the `k`-th selected polygon.
    pub fn set_weights(&mut self, selection: impl Into<Selection>, weights: &[f64]) -> Result<()> {
        let indices = selection.into().resolve(self.len())?;
        scatter(&mut self.weights, &indices, weights, "Mask::set_weights")
    }

    pub fn set_all_weights(&mut self, weight: f64) {
        self.weights.fill(weight);
    }

    pub fn set_area(&mut self, selection: impl Into<Selection>, area: f64) -> Result<()> {
        let indices = selection.into().resolve(self.len())?;
        fill(&mut self.areas, &indices, area);
        Ok(())
    }

    pub fn set_areas(&mut self, selection: impl Into<Selection>, areas: &[f64]) -> Result<()> {
        let indices = selection.into().resolve(self.len())?;
        scatter(&mut self.areas, &indices, areas, "Mask::set_areas")
    }

    pub fn set_all_areas(&mut self, area: f64) {
        self.areas.fill(area);
    }

    pub fn set_pixel(&mut self, selection: impl Into<Selection>, pixel: i32) -> Result<()> {
        let indices = selection.into().resolve(self.len())?;
        fill(&mut self.pixels, &indices, pixel);
        Ok(())
    }

    pub fn set_pixels(&mut self, selection: impl Into<Selection>, pixels: &[i32]) -> Result<()> {
        let indices = selection.into().resolve(self.len())?;
        scatter(&mut self.pixels, &indices, pixels, "Mask::set_pixels")
    }

    pub fn set_all_pixels(&mut self, pixel: i32) {
        self.pixels.fill(pixel);
    }

    /// Independent mask holding the selected polygons, in selection order.
    ///
    /// Ids, attributes, columns and header travel with their polygons.
    /// Mutating either mask afterwards never affects the other.
    ///
    /// # Errors
    /// Returns a validation error when the selection does not fit this mask.
    pub fn select(&self, selection: impl Into<Selection>) -> Result<Mask> {
        let indices = selection.into().resolve(self.len())?;
        Ok(self.take(&indices))
    }

    pub(crate) fn take(&self, indices: &[usize]) -> Mask {
        Mask {
            polygons: gather(&self.polygons, indices),
            ids: gather(&self.ids, indices),
            weights: gather(&self.weights, indices),
            areas: gather(&self.areas, indices),
            pixels: gather(&self.pixels, indices),
            header: self.header,
            columns: self.columns.take(indices),
        }
    }

    /// Adds a column with a format inferred from its element type.
    ///
    /// The name is trimmed and lower-cased. An existing column of the same
    /// name is replaced.
    ///
    /// # Errors
    /// Returns a validation error when `data` does not have one row per polygon.
    pub fn add_column(&mut self, name: &str, data: impl Into<ColumnData>) -> Result<()> {
        let data = data.into();
        let format = ColumnFormat::infer(&data);
        self.add_column_with_format(name, data, format)
    }

    /// Adds a column with an explicit serialization format.
    ///
    /// # Errors
    /// Returns a validation error for a length mismatch, an empty or reserved
    /// name, or a format that cannot store the data.
    pub fn add_column_with_format(
        &mut self,
        name: &str,
        data: impl Into<ColumnData>,
        format: ColumnFormat,
    ) -> Result<()> {
        let data = data.into();
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(MaskError::validation(
                "Mask::add_column",
                "column name cannot be empty",
            ));
        }
        if is_reserved_name(&name) {
            return Err(MaskError::validation(
                "Mask::add_column",
                &format!("'{}' is a core polygon attribute, not a column name", name),
            ));
        }
        if data.len() != self.len() {
            return Err(MaskError::validation(
                "Mask::add_column",
                &format!(
                    "column '{}' has {} rows but the mask has {} polygons",
                    name,
                    data.len(),
                    self.len()
                ),
            ));
        }
        format.validate_for(&data)?;
        self.columns.insert(Column::new(name, data, format));
        Ok(())
    }

    /// Removes a column and its format.
    ///
    /// # Errors
    /// Returns a validation error when no column has that name.
    pub fn remove_column(&mut self, name: &str) -> Result<Column> {
        self.columns.remove(name).ok_or_else(|| {
            MaskError::validation(
                "Mask::remove_column",
                &format!("no column named '{}'", normalize_name(name)),
            )
        })
    }

    /// Brings ids into canonical order after a file load.
    pub(crate) fn reconcile_ids(&mut self, keep_ids: bool, log: &mut WarningLog) -> Result<()> {
        let n = self.len();
        if n == 0 {
            return Ok(());
        }

        if keep_ids {
            let sequential = self.ids.iter().enumerate().all(|(i, &id)| id == i as i64);
            if sequential && self.columns.contains("ids") {
                return Ok(());
            }
            return self.move_ids_to_column();
        }

        if is_permutation(&self.ids) {
            let out_of_order = self
                .ids
                .iter()
                .enumerate()
                .filter(|&(i, &id)| id != i as i64)
                .count();
            if out_of_order > 0 {
                log.push(ConsistencyWarning::OutOfOrderIds {
                    count: out_of_order,
                });
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by_key(|&i| self.ids[i]);
                *self = self.take(&order);
            }
            return Ok(());
        }

        let min = self.ids.iter().copied().min().unwrap_or(0);
        let max = self.ids.iter().copied().max().unwrap_or(0);
        log.push(ConsistencyWarning::NonSequentialIds {
            min,
            max,
            expected_max: n as i64 - 1,
        });
        self.move_ids_to_column()
    }

    fn move_ids_to_column(&mut self) -> Result<()> {
        let n = self.len() as i64;
        let source_ids = std::mem::replace(&mut self.ids, (0..n).collect());
        self.add_column("ids", source_ids)
    }
}

fn is_permutation(ids: &[i64]) -> bool {
    let n = ids.len() as i64;
    let mut seen = vec![false; ids.len()];
    for &id in ids {
        if id < 0 || id >= n || seen[id as usize] {
            return false;
        }
        seen[id as usize] = true;
    }
    true
}

fn gather<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

fn fill<T: Copy>(target: &mut [T], indices: &[usize], value: T) {
    for &i in indices {
        target[i] = value;
    }
}

fn scatter<T: Copy>(target: &mut [T], indices: &[usize], values: &[T], operation: &str) -> Result<()> {
    if values.len() != indices.len() {
        return Err(MaskError::validation(
            operation,
            &format!(
                "{} values given for {} selected polygons",
                values.len(),
                indices.len()
            ),
        ));
    }
    for (&i, &value) in indices.iter().zip(values) {
        target[i] = value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::Cap;

    fn square(ra: f64, dec: f64) -> Polygon {
        Polygon::new(vec![Cap::from_axis_radius(ra, dec, 2.0)])
    }

    fn mask_with_ids(ids: &[i64]) -> Mask {
        let mut builder = MaskBuilder::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            builder.push(
                PolygonEntry::new(id, square(i as f64 * 10.0, 0.0))
                    .weight(id as f64 / 10.0)
                    .area(1e-6 * (id + 1) as f64)
                    .pixel((id % 2) as i32),
            );
        }
        builder.build()
    }

    #[test]
    fn test_entry_defaults() {
        let entry = PolygonEntry::new(3, Polygon::default());
        assert_eq!(entry.weight, 0.0);
        assert_eq!(entry.area, -1.0);
        assert_eq!(entry.pixel, 0);
    }

    #[test]
    fn test_parallel_arrays_stay_aligned() {
        let mask = mask_with_ids(&[0, 1, 2]);
        assert_eq!(mask.len(), 3);
        assert_eq!(mask.ids().len(), 3);
        assert_eq!(mask.weights().len(), 3);
        assert_eq!(mask.areas().len(), 3);
        assert_eq!(mask.pixels().len(), 3);
        assert_eq!(mask.ncaps(), vec![1, 1, 1]);
        assert_eq!(mask.max_ncaps(), 1);
    }

    #[test]
    fn test_setters_accept_every_selection_form() {
        let mut mask = mask_with_ids(&[0, 1, 2, 3]);
        mask.set_weight(1usize, 5.0).unwrap();
        mask.set_weight(vec![true, false, false, true], 7.0).unwrap();
        mask.set_weights(2usize..4, &[8.0, 9.0]).unwrap();
        assert_eq!(mask.weights(), &[7.0, 5.0, 8.0, 9.0]);

        mask.set_all_areas(0.5);
        mask.set_area(-1isize, 0.25).unwrap();
        assert_eq!(mask.areas(), &[0.5, 0.5, 0.5, 0.25]);

        mask.set_pixels(vec![3usize, 0], &[30, 10]).unwrap();
        assert_eq!(mask.pixels(), &[10, 1, 0, 30]);
        mask.set_all_pixels(4);
        assert_eq!(mask.distinct_pixel_count(), 1);
    }

    #[test]
    fn test_setter_shape_errors_leave_mask_unchanged() {
        let mut mask = mask_with_ids(&[0, 1, 2]);
        let before = mask.clone();
        assert!(mask.set_weights(.., &[1.0, 2.0]).is_err());
        assert!(mask.set_area(vec![true, false], 1.0).is_err());
        assert!(mask.set_pixel(3usize, 1).is_err());
        assert_eq!(mask, before);
    }

    #[test]
    fn test_total_area() {
        let mut mask = mask_with_ids(&[0, 1]);
        mask.set_areas(.., &[1e-6, 2e-6]).unwrap();
        mask.set_weights(.., &[1.0, 0.25]).unwrap();
        let (area, weighted) = mask.total_area();
        assert!((area - 3e-6).abs() < 1e-18);
        assert!((weighted - 1.5e-6).abs() < 1e-18);
    }

    #[test]
    fn test_select_is_independent_copy() {
        let mut mask = mask_with_ids(&[0, 1, 2, 3]);
        mask.add_column("flag", vec![10i32, 11, 12, 13]).unwrap();

        let mut derived = mask.select(vec![true, false, true, false]).unwrap();
        assert_eq!(derived.len(), 2);
        assert_eq!(derived.ids(), &[0, 2]);
        assert_eq!(
            derived.column("flag").unwrap().data(),
            &ColumnData::I32(vec![10, 12])
        );

        derived.set_all_weights(99.0);
        derived.remove_column("flag").unwrap();
        assert_eq!(mask.weights()[0], 0.0);
        assert!(mask.column("flag").is_some());

        mask.set_all_weights(-1.0);
        assert_eq!(derived.weights(), &[99.0, 99.0]);
    }

    #[test]
    fn test_select_single_index_is_length_one() {
        let mask = mask_with_ids(&[0, 1, 2]);
        let one = mask.select(2usize).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one.ids(), &[2]);
        assert_eq!(one.ncaps(), vec![1]);
    }

    #[test]
    fn test_add_column_validates_length() {
        let mut mask = mask_with_ids(&[0, 1, 2]);
        let err = mask.add_column("short", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, MaskError::Validation { .. }));
        assert!(mask.columns().is_empty());

        mask.add_column("  MagLim ", vec![21.0, 21.5, 22.0]).unwrap();
        assert!(mask.column("maglim").is_some());
        assert_eq!(mask.columns().names().collect::<Vec<_>>(), vec!["maglim"]);
        assert!(mask.remove_column("missing").is_err());
    }

    #[test]
    fn test_add_column_rejects_core_attribute_names() {
        let mut mask = mask_with_ids(&[0, 1]);
        for name in ["weight", " NCAPS", "str", "pixel", "xcaps", "CMCaps"] {
            let err = mask.add_column(name, vec![7.0, 8.0]).unwrap_err();
            assert!(matches!(err, MaskError::Validation { .. }), "{name}");
        }
        assert!(mask.columns().is_empty());
        mask.add_column("weights", vec![7.0, 8.0]).unwrap();
        mask.add_column("ids", vec![5_i64, 6]).unwrap();
    }

    #[test]
    fn test_reconcile_sorts_shuffled_permutation() {
        let mut mask = mask_with_ids(&[2, 0, 1]);
        mask.add_column("tag", vec!["two".to_string(), "zero".into(), "one".into()])
            .unwrap();
        let first_polygon = mask.polygons()[1].clone();

        let mut log = WarningLog::new();
        mask.reconcile_ids(false, &mut log).unwrap();

        assert_eq!(mask.ids(), &[0, 1, 2]);
        assert_eq!(mask.weights(), &[0.0, 0.1, 0.2]);
        assert_eq!(mask.polygons()[0], first_polygon);
        assert_eq!(
            mask.column("tag").unwrap().data(),
            &ColumnData::Str(vec!["zero".into(), "one".into(), "two".into()])
        );
        assert!(mask.column("ids").is_none());
        assert_eq!(
            log.into_inner(),
            vec![ConsistencyWarning::OutOfOrderIds { count: 3 }]
        );
    }

    #[test]
    fn test_reconcile_preserves_non_sequential_ids() {
        let mut mask = mask_with_ids(&[5, 7, 9]);
        let mut log = WarningLog::new();
        mask.reconcile_ids(false, &mut log).unwrap();

        assert_eq!(mask.ids(), &[0, 1, 2]);
        assert_eq!(
            mask.column("ids").unwrap().data(),
            &ColumnData::I64(vec![5, 7, 9])
        );
        assert!(matches!(
            log.into_inner()[0],
            ConsistencyWarning::NonSequentialIds { min: 5, max: 9, expected_max: 2 }
        ));
    }

    #[test]
    fn test_reconcile_duplicates_are_not_a_permutation() {
        let mut mask = mask_with_ids(&[0, 0, 1]);
        let mut log = WarningLog::new();
        mask.reconcile_ids(false, &mut log).unwrap();
        assert_eq!(mask.ids(), &[0, 1, 2]);
        assert!(mask.column("ids").is_some());
    }

    #[test]
    fn test_reconcile_keep_ids_always_moves_ids() {
        let mut mask = mask_with_ids(&[0, 1, 2]);
        let mut log = WarningLog::new();
        mask.reconcile_ids(true, &mut log).unwrap();
        assert!(mask.column("ids").is_some());
        assert!(log.into_inner().is_empty());
    }

    #[test]
    fn test_reconcile_keep_ids_keeps_existing_column_for_row_ids() {
        let mut mask = mask_with_ids(&[0, 1, 2]);
        mask.add_column("ids", vec![40_i64, 41, 42]).unwrap();
        let mut log = WarningLog::new();
        mask.reconcile_ids(true, &mut log).unwrap();
        assert_eq!(mask.column("ids").unwrap().data(), &ColumnData::I64(vec![40, 41, 42]));
    }

    #[test]
    fn test_in_order_ids_untouched() {
        let mut mask = mask_with_ids(&[0, 1, 2]);
        let before = mask.clone();
        let mut log = WarningLog::new();
        mask.reconcile_ids(false, &mut log).unwrap();
        assert_eq!(mask, before);
        assert!(log.into_inner().is_empty());
    }

    #[test]
    fn test_pixelization_display() {
        let p = Pixelization {
            resolution: 6,
            scheme: PixelScheme::Simple,
        };
        assert_eq!(p.to_string(), "6s");
        assert_eq!(PixelScheme::from_code('d'), Some(PixelScheme::Sdss));
        assert_eq!(PixelScheme::from_code('x'), None);
    }
}
