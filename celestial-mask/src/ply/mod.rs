//! Text polygon format (`.ply` / `.pol`).
//!
//! ```text
//! 2 polygons
//! pixelization 6s
//! snapped
//! polygon          0 ( 1 caps, 1.00000000 weight, 117 pixel, 0.000113440624955 str):
//!   0.00000000000000000000    0.00000000000000000000    1.00000000000000000000    0.01519224698779198048
//! polygon          1 ( ...
//! ```
//!
//! Header lines may appear in any order before the first polygon; only the
//! `n polygons` line is required. Weight, pixel and area are each optional on
//! a polygon line and default to 0, 0 and -1. Auxiliary columns are kept in
//! sibling files, see [`sibling`].

mod parser;
pub(crate) mod sibling;
mod writer;

use crate::errors::{ConsistencyWarning, Result, WarningLog};
use crate::mask::Mask;
use crate::options::{LoadOptions, WriteOptions};
use std::fs;
use std::path::Path;

/// Parses a text mask held in memory and reconciles its ids.
///
/// Sibling columns are not read since there is no file to find them by.
pub fn parse_str(content: &str, options: &LoadOptions) -> Result<(Mask, Vec<ConsistencyWarning>)> {
    let mut log = WarningLog::new();
    let mut mask = parser::parse_mask(content, "<memory>", &mut log)?;
    mask.reconcile_ids(options.keep_ids, &mut log)?;
    Ok((mask, log.into_inner()))
}

/// Renders `mask` as text. Auxiliary columns are not included.
pub fn to_string(mask: &Mask, options: &WriteOptions) -> String {
    writer::render_mask(mask, options.keep_ids)
}

pub(crate) fn read(path: &Path, options: &LoadOptions, log: &mut WarningLog) -> Result<Mask> {
    let content = fs::read_to_string(path)?;
    let mut mask = parser::parse_mask(&content, path.display(), log)?;
    if options.read_extra_columns {
        sibling::read_siblings(&mut mask, path, log)?;
    }
    Ok(mask)
}

pub(crate) fn write(mask: &Mask, path: &Path, options: &WriteOptions) -> Result<()> {
    fs::write(path, writer::render_mask(mask, options.keep_ids))?;
    if options.write_extra_columns {
        sibling::write_siblings(mask, path, options.weight_column.as_deref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_str_reconciles_ids() {
        let content = "2 polygons\n\
            polygon 1 ( 1 caps, 0.5 weight):\n0 0 1 0.1\n\
            polygon 0 ( 1 caps, 0.25 weight):\n0 0 -1 0.1\n";
        let (mask, warnings) = parse_str(content, &LoadOptions::default()).unwrap();
        assert_eq!(mask.ids(), &[0, 1]);
        assert_eq!(mask.weights(), &[0.25, 0.5]);
        assert_eq!(
            warnings,
            vec![ConsistencyWarning::OutOfOrderIds { count: 2 }]
        );
    }

    #[test]
    fn test_text_round_trip_in_memory() {
        let content = "1 polygons\nbalkanized\n\
            polygon 0 ( 2 caps, 0.5 weight, 3 pixel, 0.001 str):\n\
            0 0 1 0.1\n1 0 0 -0.2\n";
        let (mask, _) = parse_str(content, &LoadOptions::default()).unwrap();
        let rendered = to_string(&mask, &WriteOptions::default());
        let (again, warnings) = parse_str(&rendered, &LoadOptions::default()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(again, mask);
    }
}
