//! Binary mask files: a primary header carrying the mask metadata followed
//! by one `BINTABLE` extension with a row per polygon.
//!
//! | Column   | Form          | Content                                   |
//! |----------|---------------|-------------------------------------------|
//! | `XCAPS`  | `{3n}D`       | cap axes, zero-padded to the widest polygon |
//! | `CMCAPS` | `{n}D`        | cap sizes, zero-padded                    |
//! | `NCAPS`  | `J`           | caps actually used                        |
//! | `WEIGHT` | `D`           |                                           |
//! | `PIXEL`  | `J`           |                                           |
//! | `STR`    | `D`           | area in steradians                        |
//!
//! Any further table column is carried as an auxiliary [`Column`](crate::column::Column).

pub(crate) mod header;
pub(crate) mod table;
mod reader;
mod writer;

use crate::errors::{ConsistencyWarning, Result, WarningLog};
use crate::mask::Mask;
use crate::options::{LoadOptions, WriteOptions};
use std::path::Path;

pub(crate) const PIXRES: &str = "PIXRES";
pub(crate) const PIXTYPE: &str = "PIXTYPE";
pub(crate) const SNAPPED: &str = "SNAPPED";
pub(crate) const BLKNIZED: &str = "BLKNIZED";

/// Decodes a binary mask held in memory and reconciles its ids.
pub fn from_bytes(data: &[u8], options: &LoadOptions) -> Result<(Mask, Vec<ConsistencyWarning>)> {
    let mut log = WarningLog::new();
    let mut mask = reader::decode(data, "<memory>")?;
    mask.reconcile_ids(options.keep_ids, &mut log)?;
    Ok((mask, log.into_inner()))
}

/// Encodes `mask` as a complete binary file.
pub fn to_bytes(mask: &Mask, options: &WriteOptions) -> Result<(Vec<u8>, Vec<ConsistencyWarning>)> {
    let mut log = WarningLog::new();
    let bytes = writer::encode(mask, options, &mut log)?;
    Ok((bytes, log.into_inner()))
}

pub(crate) fn read(path: &Path) -> Result<Mask> {
    reader::read(path)
}

pub(crate) fn write(mask: &Mask, path: &Path, options: &WriteOptions, log: &mut WarningLog) -> Result<()> {
    writer::write(mask, path, options, log)
}

#[cfg(test)]
mod tests {
    use super::header::BLOCK_SIZE;
    use super::*;
    use crate::cap::Cap;
    use crate::column::{ColumnData, ColumnFormat};
    use crate::mask::{MaskHeader, PixelScheme, Pixelization, PolygonEntry};
    use crate::polygon::Polygon;

    fn sample_mask() -> Mask {
        let mut builder = Mask::builder().header(MaskHeader {
            pixelization: Some(Pixelization {
                resolution: 6,
                scheme: PixelScheme::Simple,
            }),
            snapped: true,
            balkanized: false,
        });
        builder.push(
            PolygonEntry::new(0, Polygon::new(vec![Cap::new(0.0, 0.0, 1.0, 0.1)]))
                .weight(0.5)
                .area(1e-6)
                .pixel(117),
        );
        builder.push(
            PolygonEntry::new(
                1,
                Polygon::new(vec![Cap::new(1.0, 0.0, 0.0, 0.2), Cap::new(0.0, 1.0, 0.0, -0.3)]),
            )
            .weight(1.0)
            .area(2e-6)
            .pixel(4),
        );
        builder.build()
    }

    #[test]
    fn test_core_round_trip() {
        let mask = sample_mask();
        let (bytes, warnings) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);

        let (again, warnings) = from_bytes(&bytes, &LoadOptions::default()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(again.len(), 2);
        assert_eq!(again.header(), mask.header());
        assert_eq!(again.polygons(), mask.polygons());
        assert_eq!(again.weights(), &[0.5, 1.0]);
        assert_eq!(again.areas(), &[1e-6, 2e-6]);
        assert_eq!(again.pixels(), &[117, 4]);
        assert!(again.columns().is_empty());
    }

    #[test]
    fn test_extra_columns_round_trip() {
        let mut mask = sample_mask();
        mask.add_column("flux", vec![1.5_f64, -2.25]).unwrap();
        mask.add_column("count", vec![u16::MAX, 7_u16]).unwrap();
        mask.add_column("tag", vec!["a".to_string(), "north".to_string()]).unwrap();
        mask.add_column("band", vec![vec![1_i64, 2, 3], vec![4]]).unwrap();

        let (bytes, _) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        let (again, _) = from_bytes(&bytes, &LoadOptions::default()).unwrap();

        assert_eq!(again.column("flux").unwrap().data(), &ColumnData::F64(vec![1.5, -2.25]));
        assert_eq!(again.column("count").unwrap().data(), &ColumnData::U16(vec![u16::MAX, 7]));
        assert_eq!(
            again.column("tag").unwrap().data(),
            &ColumnData::Str(vec!["a".to_string(), "north".to_string()])
        );
        assert_eq!(
            again.column("band").unwrap().data(),
            &ColumnData::IntArray(vec![vec![1, 2, 3], vec![4]])
        );
    }

    #[test]
    fn test_scaled_column_round_trip() {
        let mut mask = sample_mask();
        let format = ColumnFormat::new("I", None).with_scale(0.5).with_zero(10.0);
        mask.add_column_with_format("depth", vec![10.5_f64, 12.0], format)
            .unwrap();

        let (bytes, _) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        let (again, _) = from_bytes(&bytes, &LoadOptions::default()).unwrap();
        let column = again.column("depth").unwrap();
        assert_eq!(column.data(), &ColumnData::F64(vec![10.5, 12.0]));
        assert_eq!(column.format().scale, Some(0.5));
        assert_eq!(column.format().zero, Some(10.0));
    }

    #[test]
    fn test_pixel_extremes_round_trip_exactly() {
        let mut mask = sample_mask();
        mask.set_pixels(.., &[i32::MAX, i32::MIN]).unwrap();
        let (bytes, warnings) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        assert!(warnings.is_empty());
        let (again, _) = from_bytes(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(again.pixels(), &[i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_core_attribute_names_never_reach_the_table() {
        let mut mask = sample_mask();
        assert!(mask.add_column("weight", vec![7.0, 8.0]).is_err());
        assert!(mask.add_column("NCAPS", vec![99_i32, 98]).is_err());

        let (bytes, _) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        let (again, _) = from_bytes(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(again.weights(), &[0.5, 1.0]);
        assert_eq!(again.ncaps(), vec![1, 2]);
        assert!(again.columns().is_empty());
    }

    #[test]
    fn test_keep_ids_adds_ids_column() {
        let mut builder = Mask::builder();
        builder.push(PolygonEntry::new(42, Polygon::new(vec![Cap::new(0.0, 0.0, 1.0, 0.1)])));
        let mask = builder.build();

        let (bytes, _) = to_bytes(&mask, &WriteOptions::default().keep_ids(true)).unwrap();
        let (again, _) = from_bytes(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(again.column("ids").unwrap().data(), &ColumnData::I64(vec![42]));
    }

    #[test]
    fn test_unsigned_64_narrowing_is_reported() {
        let mut mask = sample_mask();
        mask.add_column("big", vec![1_u64, u64::MAX]).unwrap();
        let (_, warnings) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        assert_eq!(
            warnings,
            vec![ConsistencyWarning::UnsignedPrecisionLoss {
                column: "big".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_mask_round_trip() {
        let mask = Mask::default();
        let (bytes, _) = to_bytes(&mask, &WriteOptions::default()).unwrap();
        let (again, _) = from_bytes(&bytes, &LoadOptions::default()).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_rejects_non_fits_bytes() {
        assert!(from_bytes(b"not a fits file", &LoadOptions::default()).is_err());
    }
}
