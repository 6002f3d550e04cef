//! Building masks from in-memory polygon records.
//!
//! Any row type that exposes the window-table fields (area, weight, pixel,
//! field number, cap count and flattened cap arrays) can be turned into a
//! [`Mask`] without touching the file system. Ids are assigned `0..n` in
//! record order, so no id reconciliation is needed.

use crate::cap::Cap;
use crate::errors::{MaskError, Result};
use crate::mask::{Mask, MaskBuilder, PolygonEntry};
use crate::polygon::Polygon;

/// A polygon row from an external table.
pub trait PolygonRecord {
    /// Area in steradians.
    fn area(&self) -> f64;
    fn weight(&self) -> f64;
    fn pixel(&self) -> i32;
    /// Survey field number, kept in an `ifield` column.
    fn ifield(&self) -> i32;
    fn ncaps(&self) -> usize;
    /// Cap axes flattened as `x0 y0 z0 x1 y1 z1 ...`; at least `3 * ncaps` values.
    fn xcaps(&self) -> &[f64];
    /// Cap sizes; at least `ncaps` values.
    fn cmcaps(&self) -> &[f64];
}

impl Mask {
    /// Builds a mask from records, one polygon per record.
    ///
    /// # Errors
    /// Returns a validation error when a record's cap arrays are shorter
    /// than its cap count.
    pub fn from_records<R: PolygonRecord>(records: &[R]) -> Result<Mask> {
        let mut builder = MaskBuilder::with_capacity(records.len());
        let mut ifields = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let polygon = polygon_from_record(index, record)?;
            builder.push(
                PolygonEntry::new(index as i64, polygon)
                    .weight(record.weight())
                    .area(record.area())
                    .pixel(record.pixel()),
            );
            ifields.push(record.ifield());
        }

        let mut mask = builder.build();
        mask.add_column("ifield", ifields)?;
        Ok(mask)
    }
}

fn polygon_from_record<R: PolygonRecord>(index: usize, record: &R) -> Result<Polygon> {
    let n = record.ncaps();
    let xcaps = record.xcaps();
    let cmcaps = record.cmcaps();
    if xcaps.len() < 3 * n || cmcaps.len() < n {
        return Err(MaskError::validation(
            "Mask::from_records",
            &format!(
                "record {} declares {} caps but has {} axis values and {} cap sizes",
                index,
                n,
                xcaps.len(),
                cmcaps.len()
            ),
        ));
    }

    let caps = xcaps
        .chunks_exact(3)
        .zip(cmcaps)
        .take(n)
        .map(|(axis, &cm)| Cap::new(axis[0], axis[1], axis[2], cm))
        .collect();
    Ok(Polygon::new(caps))
}
