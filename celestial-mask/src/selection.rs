//! Polygon selectors for derivation and attribute setters.
//!
//! Every selector form is resolved against the polygon count into an explicit
//! list of indices before use, so slicing, fancy indexing, and boolean masks
//! all flow through the same code. Negative indices count from the end.

use crate::errors::{MaskError, Result};

/// Which polygons an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A single polygon. Resolves to a one-element selection.
    Index(isize),
    /// `start..end` in steps of `step`, with slice semantics for open ends and negatives.
    Range {
        start: Option<isize>,
        end: Option<isize>,
        step: isize,
    },
    /// Explicit indices, in the order given. Repeats are allowed.
    IndexList(Vec<isize>),
    /// One flag per polygon.
    BooleanMask(Vec<bool>),
}

impl Selection {
    /// Every polygon, in order.
    pub fn all() -> Self {
        Self::Range {
            start: None,
            end: None,
            step: 1,
        }
    }

    pub fn slice(start: Option<isize>, end: Option<isize>, step: isize) -> Self {
        Self::Range { start, end, step }
    }

    /// Resolves to concrete indices into a collection of `len` polygons.
    ///
    /// # Errors
    /// Returns a validation error for out-of-range indices, a zero step, or
    /// a boolean mask whose length differs from `len`.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            Self::Index(i) => Ok(vec![normalize_index(*i, len)?]),
            Self::Range { start, end, step } => resolve_range(*start, *end, *step, len),
            Self::IndexList(indices) => indices
                .iter()
                .map(|&i| normalize_index(i, len))
                .collect(),
            Self::BooleanMask(flags) => {
                if flags.len() != len {
                    return Err(MaskError::validation(
                        "Selection::resolve",
                        &format!(
                            "boolean mask has {} elements but there are {} polygons",
                            flags.len(),
                            len
                        ),
                    ));
                }
                Ok(flags
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &keep)| keep.then_some(i))
                    .collect())
            }
        }
    }
}

fn normalize_index(index: isize, len: usize) -> Result<usize> {
    let len_signed = len as isize;
    let resolved = if index < 0 { index + len_signed } else { index };
    if resolved < 0 || resolved >= len_signed {
        return Err(MaskError::validation(
            "Selection::resolve",
            &format!("index {} is out of range for {} polygons", index, len),
        ));
    }
    Ok(resolved as usize)
}

fn resolve_range(
    start: Option<isize>,
    end: Option<isize>,
    step: isize,
    len: usize,
) -> Result<Vec<usize>> {
    if step == 0 {
        return Err(MaskError::validation(
            "Selection::resolve",
            "slice step cannot be zero",
        ));
    }

    let len = len as isize;
    let clamp = |value: isize, low: isize, high: isize| -> isize {
        let value = if value < 0 { value + len } else { value };
        value.clamp(low, high)
    };

    let mut indices = Vec::new();
    if step > 0 {
        let first = start.map_or(0, |s| clamp(s, 0, len));
        let stop = end.map_or(len, |e| clamp(e, 0, len));
        let mut i = first;
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let first = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = end.map_or(-1, |e| clamp(e, -1, len - 1));
        let mut i = first;
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    Ok(indices)
}

impl From<usize> for Selection {
    fn from(index: usize) -> Self {
        Self::Index(index as isize)
    }
}

impl From<isize> for Selection {
    fn from(index: isize) -> Self {
        Self::Index(index)
    }
}

impl From<std::ops::Range<usize>> for Selection {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::slice(Some(range.start as isize), Some(range.end as isize), 1)
    }
}

impl From<std::ops::RangeFrom<usize>> for Selection {
    fn from(range: std::ops::RangeFrom<usize>) -> Self {
        Self::slice(Some(range.start as isize), None, 1)
    }
}

impl From<std::ops::RangeTo<usize>> for Selection {
    fn from(range: std::ops::RangeTo<usize>) -> Self {
        Self::slice(None, Some(range.end as isize), 1)
    }
}

impl From<std::ops::RangeFull> for Selection {
    fn from(_: std::ops::RangeFull) -> Self {
        Self::all()
    }
}

impl From<Vec<usize>> for Selection {
    fn from(indices: Vec<usize>) -> Self {
        Self::IndexList(indices.into_iter().map(|i| i as isize).collect())
    }
}

impl From<&[usize]> for Selection {
    fn from(indices: &[usize]) -> Self {
        Self::IndexList(indices.iter().map(|&i| i as isize).collect())
    }
}

impl From<Vec<bool>> for Selection {
    fn from(flags: Vec<bool>) -> Self {
        Self::BooleanMask(flags)
    }
}

impl From<&[bool]> for Selection {
    fn from(flags: &[bool]) -> Self {
        Self::BooleanMask(flags.to_vec())
    }
}
