use super::header::{padded_len, parse_header, Header};
use super::table::TForm;
use super::{BLKNIZED, PIXRES, PIXTYPE, SNAPPED};
use crate::cap::Cap;
use crate::column::{is_reserved_name, normalize_name, ColumnData, ColumnFormat, I8_ZERO, U16_ZERO, U32_ZERO, U64_ZERO};
use crate::errors::{MaskError, Result};
use crate::mask::{Mask, MaskBuilder, MaskHeader, PixelScheme, Pixelization, PolygonEntry};
use crate::polygon::Polygon;
use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::path::Path;

static PIXELIZATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pixelization\s+(\d+)([sd])").unwrap());

pub(crate) fn read(path: &Path) -> Result<Mask> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap, &path.display().to_string())
}

/// Decodes a mask from the bytes of a complete file.
pub(crate) fn decode(data: &[u8], origin: &str) -> Result<Mask> {
    let (primary, primary_size) = parse_header(data, origin)?;
    if primary.logical("SIMPLE") != Some(true) {
        return Err(MaskError::format(origin, "primary header does not start with SIMPLE = T"));
    }
    let mask_header = read_mask_header(&primary);

    let mut offset = primary_size + padded_len(data_size(&primary));
    let table = loop {
        if offset >= data.len() {
            return Err(MaskError::format(origin, "no binary table extension found"));
        }
        let (extension, size) = parse_header(&data[offset..], origin)?;
        let body_start = offset + size;
        if extension.string("XTENSION").map(str::trim) == Some("BINTABLE") {
            break Table::new(&extension, &data[body_start.min(data.len())..], origin)?;
        }
        offset = body_start + padded_len(data_size(&extension));
    };

    let mut mask = table.polygons(mask_header)?;
    for field in &table.fields {
        if is_reserved_name(&field.name) {
            continue;
        }
        let Some(data) = table.column_data(field)? else {
            tracing::warn!(column = %field.name, tform = %field.format.tform, "skipping unsupported column");
            continue;
        };
        let format = column_format(field, &data);
        mask.add_column_with_format(&field.name, data, format)?;
    }

    tracing::debug!(
        origin,
        polygons = mask.len(),
        max_caps = mask.max_ncaps(),
        columns = mask.columns().len(),
        "read binary mask"
    );
    Ok(mask)
}

/// Size of an HDU's data section before padding.
fn data_size(header: &Header) -> usize {
    let naxis = header.integer("NAXIS").unwrap_or(0).max(0) as usize;
    if naxis == 0 {
        return 0;
    }
    let bits = header.integer("BITPIX").unwrap_or(8).unsigned_abs() as usize;
    let elements: usize = (1..=naxis)
        .map(|i| header.integer(&format!("NAXIS{}", i)).unwrap_or(0).max(0) as usize)
        .product();
    let pcount = header.integer("PCOUNT").unwrap_or(0).max(0) as usize;
    let gcount = header.integer("GCOUNT").unwrap_or(1).max(1) as usize;
    bits / 8 * gcount * (pcount + elements)
}

fn read_mask_header(primary: &Header) -> MaskHeader {
    let mut header = MaskHeader::default();
    let has_keywords = [PIXRES, PIXTYPE, SNAPPED, BLKNIZED]
        .iter()
        .any(|k| primary.contains(k));

    if has_keywords {
        let scheme = primary
            .string(PIXTYPE)
            .and_then(|s| s.trim().chars().next())
            .and_then(PixelScheme::from_code);
        if let (Some(resolution), Some(scheme)) = (primary.integer(PIXRES), scheme) {
            header.pixelization = Some(Pixelization {
                resolution: resolution as i32,
                scheme,
            });
        }
        header.snapped = primary.logical(SNAPPED).unwrap_or(false);
        header.balkanized = primary.logical(BLKNIZED).unwrap_or(false);
        return header;
    }

    for keyword in primary.iter() {
        let text = keyword.text();
        if let Some(c) = PIXELIZATION_REGEX.captures(&text) {
            let scheme = c[2].chars().next().and_then(PixelScheme::from_code);
            if let (Ok(resolution), Some(scheme)) = (c[1].parse(), scheme) {
                header.pixelization = Some(Pixelization { resolution, scheme });
            }
        } else if text.contains("snapped") {
            header.snapped = true;
        } else if text.contains("balkanized") {
            header.balkanized = true;
        }
    }
    header
}

struct Field {
    name: String,
    form: TForm,
    offset: usize,
    format: ColumnFormat,
}

#[derive(Clone, Copy)]
enum Raw {
    Bool(bool),
    Int(i128),
    Real(f64),
}

impl Raw {
    fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => b as u8 as f64,
            Self::Int(i) => i as f64,
            Self::Real(r) => r,
        }
    }

    fn as_i128(self) -> i128 {
        match self {
            Self::Bool(b) => b as i128,
            Self::Int(i) => i,
            Self::Real(r) => r as i128,
        }
    }
}

/// Unsigned and signed-byte storage conventions, or plain linear scaling.
#[derive(Clone, Copy, PartialEq)]
enum Scaling {
    Identity,
    I8,
    U16,
    U32,
    U64,
    Linear { zero: f64, scale: f64 },
}

impl Scaling {
    fn of(field: &Field) -> Self {
        let zero = field.format.zero.unwrap_or(0.0);
        let scale = field.format.scale.unwrap_or(1.0);
        if scale != 1.0 {
            return Self::Linear { zero, scale };
        }
        match field.form.code {
            'B' if zero == I8_ZERO => Self::I8,
            'I' if zero == U16_ZERO => Self::U16,
            'J' if zero == U32_ZERO => Self::U32,
            'K' if zero == U64_ZERO => Self::U64,
            _ if zero == 0.0 => Self::Identity,
            _ => Self::Linear { zero, scale },
        }
    }

    fn offset(self) -> i128 {
        match self {
            Self::I8 => -128,
            Self::U16 => 1 << 15,
            Self::U32 => 1 << 31,
            Self::U64 => 1 << 63,
            _ => 0,
        }
    }
}

struct Table<'a> {
    origin: String,
    rows: &'a [u8],
    heap: &'a [u8],
    row_size: usize,
    nrows: usize,
    fields: Vec<Field>,
}

impl<'a> Table<'a> {
    fn new(header: &Header, body: &'a [u8], origin: &str) -> Result<Self> {
        let row_size = header.required_size("NAXIS1", origin)?;
        let nrows = header.required_size("NAXIS2", origin)?;
        let tfields = header.required_size("TFIELDS", origin)?;
        let pcount = header.integer("PCOUNT").unwrap_or(0).max(0) as usize;

        let table_len = row_size
            .checked_mul(nrows)
            .ok_or_else(|| MaskError::format(origin, "NAXIS1 x NAXIS2 overflows"))?;
        if body.len() < table_len {
            return Err(MaskError::format(
                origin,
                &format!("table needs {} bytes but only {} remain", table_len, body.len()),
            ));
        }
        let heap_start = header
            .integer("THEAP")
            .map_or(table_len, |v| v.max(0) as usize);
        let heap_end = table_len.saturating_add(pcount).min(body.len());

        let mut fields = Vec::with_capacity(tfields);
        let mut offset = 0;
        for i in 1..=tfields {
            let field = read_field(header, i, offset, origin)?;
            offset += field.form.width();
            fields.push(field);
        }
        if offset > row_size {
            return Err(MaskError::format(
                origin,
                &format!("columns need {} bytes per row but NAXIS1 is {}", offset, row_size),
            ));
        }

        Ok(Self {
            origin: origin.to_string(),
            rows: &body[..table_len],
            heap: &body[heap_start.min(heap_end)..heap_end],
            row_size,
            nrows,
            fields,
        })
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn required(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| {
            MaskError::format(&self.origin, &format!("missing required column {}", name))
        })
    }

    fn cell(&self, field: &Field, row: usize) -> &'a [u8] {
        let start = row * self.row_size + field.offset;
        &self.rows[start..start + field.form.width()]
    }

    /// Raw bytes of every element in one cell, following heap descriptors.
    fn element_bytes(&self, field: &Field, row: usize) -> Result<&'a [u8]> {
        let cell = self.cell(field, row);
        if !field.form.variable {
            return Ok(cell);
        }
        if cell.is_empty() {
            return Ok(cell);
        }
        let (count, offset) = if field.form.wide_descriptor {
            (BigEndian::read_i64(&cell[..8]), BigEndian::read_i64(&cell[8..16]))
        } else {
            (
                BigEndian::read_i32(&cell[..4]) as i64,
                BigEndian::read_i32(&cell[4..8]) as i64,
            )
        };
        let size = TForm::element_size(field.form.code);
        let (Ok(count), Ok(offset)) = (usize::try_from(count), usize::try_from(offset)) else {
            return Err(self.bad_descriptor(field, row));
        };
        match count.checked_mul(size).and_then(|len| len.checked_add(offset)) {
            Some(end) if end <= self.heap.len() => Ok(&self.heap[offset..end]),
            _ => Err(self.bad_descriptor(field, row)),
        }
    }

    fn bad_descriptor(&self, field: &Field, row: usize) -> MaskError {
        MaskError::format(
            &self.origin,
            &format!("row {} of column {} points outside the heap", row, field.name),
        )
    }

    fn elements(&self, field: &Field, row: usize) -> Result<Vec<Raw>> {
        let code = field.form.code;
        let size = TForm::element_size(code);
        let bytes = self.element_bytes(field, row)?;
        Ok(bytes
            .chunks_exact(size.max(1))
            .map(|b| match code {
                'L' => Raw::Bool(b[0] == b'T'),
                'B' => Raw::Int(b[0] as i128),
                'I' => Raw::Int(BigEndian::read_i16(b) as i128),
                'J' => Raw::Int(BigEndian::read_i32(b) as i128),
                'K' => Raw::Int(BigEndian::read_i64(b) as i128),
                'E' => Raw::Real(BigEndian::read_f32(b) as f64),
                'D' => Raw::Real(BigEndian::read_f64(b)),
                _ => Raw::Int(0),
            })
            .collect())
    }

    fn reals(&self, field: &Field, row: usize) -> Result<Vec<f64>> {
        let zero = field.format.zero.unwrap_or(0.0);
        let scale = field.format.scale.unwrap_or(1.0);
        Ok(self
            .elements(field, row)?
            .into_iter()
            .map(|raw| raw.as_f64() * scale + zero)
            .collect())
    }

    fn first_integer(&self, field: &Field, row: usize) -> Result<i64> {
        let offset = Scaling::of(field).offset();
        let raw = self.elements(field, row)?.first().copied().map_or(0, Raw::as_i128);
        Ok(clamp_i64(raw + offset))
    }

    fn first_real(&self, field: &Field, row: usize) -> Result<f64> {
        Ok(self.reals(field, row)?.first().copied().unwrap_or(0.0))
    }

    /// Polygons and core attributes from the NCAPS/XCAPS/CMCAPS and
    /// optional STR/WEIGHT/PIXEL columns.
    fn polygons(&self, header: MaskHeader) -> Result<Mask> {
        let ncaps = self.required("NCAPS")?;
        let xcaps = self.required("XCAPS")?;
        let cmcaps = self.required("CMCAPS")?;
        let area = self.field("STR");
        let weight = self.field("WEIGHT");
        let pixel = self.field("PIXEL");

        let mut builder = MaskBuilder::with_capacity(self.nrows).header(header);
        for row in 0..self.nrows {
            let n = self.first_integer(ncaps, row)?;
            let axes = self.reals(xcaps, row)?;
            let sizes = self.reals(cmcaps, row)?;
            let n = usize::try_from(n)
                .ok()
                .filter(|&n| 3 * n <= axes.len() && n <= sizes.len())
                .ok_or_else(|| {
                    MaskError::format(
                        &self.origin,
                        &format!("row {} declares {} caps but stores {}", row, n, sizes.len()),
                    )
                })?;

            let caps = axes
                .chunks_exact(3)
                .zip(&sizes)
                .take(n)
                .map(|(axis, &cm)| Cap::new(axis[0], axis[1], axis[2], cm))
                .collect();

            let mut entry = PolygonEntry::new(row as i64, Polygon::new(caps));
            if let Some(field) = area {
                entry.area = self.first_real(field, row)?;
            }
            if let Some(field) = weight {
                entry.weight = self.first_real(field, row)?;
            }
            if let Some(field) = pixel {
                let pixel = self.first_integer(field, row)?;
                entry.pixel = i32::try_from(pixel).map_err(|_| {
                    MaskError::format(
                        &self.origin,
                        &format!("row {}: pixel {} does not fit in 32 bits", row, pixel),
                    )
                })?;
            }
            builder.push(entry);
        }
        Ok(builder.build())
    }

    /// Decodes an auxiliary column, or `None` for element types with no
    /// column representation.
    fn column_data(&self, field: &Field) -> Result<Option<ColumnData>> {
        let form = field.form;
        if !form.is_supported() || (form.repeat == 0 && !form.variable) {
            return Ok(None);
        }

        if form.code == 'A' {
            if form.variable {
                return Ok(None);
            }
            let values = (0..self.nrows)
                .map(|row| {
                    String::from_utf8_lossy(self.cell(field, row))
                        .trim_end_matches([' ', '\0'])
                        .to_string()
                })
                .collect();
            return Ok(Some(ColumnData::Str(values)));
        }

        let scaling = Scaling::of(field);
        let mut rows = Vec::with_capacity(self.nrows);
        for row in 0..self.nrows {
            rows.push(self.elements(field, row)?);
        }

        let is_array = form.variable || form.repeat > 1;
        if is_array {
            return Ok(Some(array_column(&rows, form, scaling)));
        }

        let ints: Vec<i128> = rows.iter().map(|r| first(r).as_i128()).collect();
        let reals: Vec<f64> = rows.iter().map(|r| first(r).as_f64()).collect();
        let data = match (scaling, form.code) {
            (Scaling::Linear { zero, scale }, _) => {
                ColumnData::F64(reals.iter().map(|v| v * scale + zero).collect())
            }
            (Scaling::I8, _) => ColumnData::I8(ints.iter().map(|v| (v - 128) as i8).collect()),
            (Scaling::U16, _) => ColumnData::U16(ints.iter().map(|v| (v + (1 << 15)) as u16).collect()),
            (Scaling::U32, _) => ColumnData::U32(ints.iter().map(|v| (v + (1 << 31)) as u32).collect()),
            (Scaling::U64, _) => ColumnData::U64(ints.iter().map(|v| (v + (1 << 63)) as u64).collect()),
            (_, 'L') => ColumnData::Bool(
                rows.iter()
                    .map(|r| matches!(first(r), Raw::Bool(true)))
                    .collect(),
            ),
            (_, 'B') => ColumnData::U8(ints.iter().map(|&v| v as u8).collect()),
            (_, 'I') => ColumnData::I16(ints.iter().map(|&v| v as i16).collect()),
            (_, 'J') => ColumnData::I32(ints.iter().map(|&v| v as i32).collect()),
            (_, 'K') => ColumnData::I64(ints.iter().map(|&v| v as i64).collect()),
            (_, 'E') => ColumnData::F32(reals.iter().map(|&v| v as f32).collect()),
            _ => ColumnData::F64(reals),
        };
        Ok(Some(data))
    }
}

fn first(row: &[Raw]) -> Raw {
    row.first().copied().unwrap_or(Raw::Int(0))
}

fn array_column(rows: &[Vec<Raw>], form: TForm, scaling: Scaling) -> ColumnData {
    match scaling {
        Scaling::Linear { zero, scale } => ColumnData::FloatArray(
            rows.iter()
                .map(|r| r.iter().map(|v| v.as_f64() * scale + zero).collect())
                .collect(),
        ),
        _ if form.is_real() => ColumnData::FloatArray(
            rows.iter()
                .map(|r| r.iter().map(|v| v.as_f64()).collect())
                .collect(),
        ),
        _ => {
            let offset = scaling.offset();
            ColumnData::IntArray(
                rows.iter()
                    .map(|r| r.iter().map(|v| clamp_i64(v.as_i128() + offset)).collect())
                    .collect(),
            )
        }
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn read_field(header: &Header, index: usize, offset: usize, origin: &str) -> Result<Field> {
    let key = |prefix: &str| format!("{}{}", prefix, index);
    let tform = header.string(&key("TFORM")).ok_or_else(|| {
        MaskError::format(origin, &format!("missing required keyword {}", key("TFORM")))
    })?;
    let form = TForm::parse(tform).map_err(|e| MaskError::format(origin, &e.to_string()))?;

    let name = header
        .string(&key("TTYPE"))
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_else(|| key("COL"));

    let mut format = ColumnFormat::new(tform.trim(), None);
    format.zero = header.real(&key("TZERO"));
    format.scale = header.real(&key("TSCAL"));
    format.unit = header.string(&key("TUNIT")).map(str::to_string);
    format.null = header.get(&key("TNULL")).map(|v| match v.as_string() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    });
    format.display = header.string(&key("TDISP")).map(str::to_string);
    format.dim = header.string(&key("TDIM")).map(str::to_string);

    Ok(Field {
        name,
        form,
        offset,
        format,
    })
}

/// Format stored with a decoded column: the file's binary metadata plus
/// the text rendering for the decoded element type.
fn column_format(field: &Field, data: &ColumnData) -> ColumnFormat {
    let inferred = ColumnFormat::infer(data);
    let mut format = field.format.clone();
    format.text = inferred.text;
    if format.validate_for(data).is_ok() {
        return format;
    }
    tracing::debug!(
        column = %normalize_name(&field.name),
        tform = %field.format.tform,
        "binary form does not fit decoded data, using inferred form"
    );
    ColumnFormat {
        unit: format.unit,
        null: format.null,
        display: format.display,
        dim: format.dim,
        ..inferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::header::Keyword;
    use crate::fits::to_bytes;
    use crate::options::WriteOptions;

    fn one_polygon() -> Mask {
        let mut builder = Mask::builder();
        builder.push(
            PolygonEntry::new(0, Polygon::new(vec![Cap::new(0.0, 0.0, 1.0, 0.1)]))
                .weight(1.0)
                .area(1e-6),
        );
        builder.build()
    }

    /// Swaps the primary header of an encoded file for one built from `cards`.
    fn with_primary(bytes: &[u8], cards: Vec<Keyword>) -> Vec<u8> {
        let (_, primary_size) = parse_header(bytes, "test").unwrap();
        let mut primary = Header::new();
        primary.add(Keyword::logical("SIMPLE", true));
        primary.add(Keyword::integer("BITPIX", 8));
        primary.add(Keyword::integer("NAXIS", 0));
        primary.add(Keyword::logical("EXTEND", true));
        for card in cards {
            primary.add(card);
        }
        let mut out = primary.to_bytes();
        out.extend_from_slice(&bytes[primary_size..]);
        out
    }

    #[test]
    fn test_comment_cards_supply_mask_header() {
        let (bytes, _) = to_bytes(&one_polygon(), &WriteOptions::default()).unwrap();
        let bytes = with_primary(
            &bytes,
            vec![
                Keyword::comment("pixelization 6s"),
                Keyword::comment("snapped"),
                Keyword::comment("balkanized"),
            ],
        );

        let mask = decode(&bytes, "test").unwrap();
        assert_eq!(
            mask.header(),
            &MaskHeader {
                pixelization: Some(Pixelization {
                    resolution: 6,
                    scheme: PixelScheme::Simple,
                }),
                snapped: true,
                balkanized: true,
            }
        );
        assert_eq!(mask.len(), 1);
    }

    #[test]
    fn test_keywords_take_precedence_over_comment_cards() {
        let (bytes, _) = to_bytes(&one_polygon(), &WriteOptions::default()).unwrap();
        let bytes = with_primary(
            &bytes,
            vec![Keyword::logical(SNAPPED, false), Keyword::comment("snapped")],
        );
        assert!(!decode(&bytes, "test").unwrap().header().snapped);
    }

    #[test]
    fn test_missing_bintable_is_format_error() {
        let mut primary = Header::new();
        primary.add(Keyword::logical("SIMPLE", true));
        primary.add(Keyword::integer("NAXIS", 0));
        let err = decode(&primary.to_bytes(), "test").unwrap_err();
        assert!(matches!(err, MaskError::Format { .. }));
    }
}
