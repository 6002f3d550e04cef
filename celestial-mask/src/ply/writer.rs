use crate::column::ColumnData;
use crate::mask::Mask;
use std::fmt::Write as _;

/// Renders `mask` in the text polygon format.
///
/// With `keep_ids` the values of an integer `ids` column are written as
/// polygon ids; otherwise the mask's own ids are used.
pub(crate) fn render_mask(mask: &Mask, keep_ids: bool) -> String {
    let ids = if keep_ids {
        mask.column("ids").and_then(|c| integer_values(c.data()))
    } else {
        None
    };
    let ids = ids.as_deref().unwrap_or(mask.ids());

    let mut out = String::with_capacity(64 + mask.len() * (96 + mask.max_ncaps() * 104));
    let header = mask.header();

    let _ = writeln!(out, "{} polygons", mask.len());
    if let Some(pixelization) = header.pixelization {
        let _ = writeln!(out, "pixelization {}", pixelization);
    }
    if header.snapped {
        out.push_str("snapped\n");
    }
    if header.balkanized {
        out.push_str("balkanized\n");
    }

    for view in mask.iter() {
        let _ = writeln!(
            out,
            "polygon {:>10} ( {} caps, {:.8} weight, {} pixel, {:.15} str):",
            ids[view.index],
            view.polygon.ncaps(),
            view.weight,
            view.pixel,
            view.area
        );
        for cap in view.polygon.caps() {
            let _ = writeln!(
                out,
                "{:25.20} {:25.20} {:25.20} {:25.20}",
                cap.x, cap.y, cap.z, cap.cm
            );
        }
    }
    out
}

fn integer_values(data: &ColumnData) -> Option<Vec<i64>> {
    let values = match data {
        ColumnData::I64(v) => v.clone(),
        ColumnData::I32(v) => v.iter().map(|&x| x as i64).collect(),
        ColumnData::I16(v) => v.iter().map(|&x| x as i64).collect(),
        ColumnData::U32(v) => v.iter().map(|&x| x as i64).collect(),
        ColumnData::U16(v) => v.iter().map(|&x| x as i64).collect(),
        _ => return None,
    };
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::Cap;
    use crate::mask::{MaskBuilder, MaskHeader, PixelScheme, Pixelization, PolygonEntry};
    use crate::polygon::Polygon;

    fn sample() -> Mask {
        let mut builder = MaskBuilder::with_capacity(1).header(MaskHeader {
            pixelization: Some(Pixelization {
                resolution: 6,
                scheme: PixelScheme::Simple,
            }),
            snapped: true,
            balkanized: false,
        });
        builder.push(
            PolygonEntry::new(0, Polygon::new(vec![Cap::new(0.0, 0.0, 1.0, 0.5)]))
                .weight(0.75)
                .area(0.125)
                .pixel(42),
        );
        builder.build()
    }

    #[test]
    fn test_render_layout() {
        let text = render_mask(&sample(), false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "1 polygons");
        assert_eq!(lines[1], "pixelization 6s");
        assert_eq!(lines[2], "snapped");
        assert_eq!(
            lines[3],
            "polygon          0 ( 1 caps, 0.75000000 weight, 42 pixel, 0.125000000000000 str):"
        );
        assert_eq!(
            lines[4],
            "   0.00000000000000000000    0.00000000000000000000    1.00000000000000000000    0.50000000000000000000"
        );
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_keep_ids_uses_ids_column() {
        let mut mask = sample();
        mask.add_column("ids", vec![17i64]).unwrap();
        assert!(render_mask(&mask, true).contains("polygon         17 ("));
        assert!(render_mask(&mask, false).contains("polygon          0 ("));
    }
}
