use super::header::{pad_to_block, Header, Keyword};
use super::table::{integer_range, TForm};
use super::{BLKNIZED, PIXRES, PIXTYPE, SNAPPED};
use crate::column::{Column, ColumnData, ColumnFormat};
use crate::errors::{ConsistencyWarning, MaskError, Result, WarningLog};
use crate::mask::Mask;
use crate::options::WriteOptions;
use byteorder::{BigEndian, WriteBytesExt};
use std::fs;
use std::path::Path;

pub(crate) fn write(mask: &Mask, path: &Path, options: &WriteOptions, log: &mut WarningLog) -> Result<()> {
    let bytes = encode(mask, options, log)?;
    fs::write(path, bytes)?;
    tracing::debug!(
        path = %path.display(),
        polygons = mask.len(),
        max_caps = mask.max_ncaps(),
        columns = mask.columns().len(),
        "wrote binary mask"
    );
    Ok(())
}

/// Serializes `mask` as a primary header plus one binary table.
pub(crate) fn encode(mask: &Mask, options: &WriteOptions, log: &mut WarningLog) -> Result<Vec<u8>> {
    let max_caps = mask.max_ncaps();
    let mut fields = vec![
        OutField::core("XCAPS", TForm::fixed(3 * max_caps, 'D'), Source::Axes)
            .with_dim(format!("( 3, {})", max_caps)),
        OutField::core("CMCAPS", TForm::fixed(max_caps, 'D'), Source::Sizes),
        OutField::core("NCAPS", TForm::scalar('J'), Source::Ncaps),
        OutField::core("WEIGHT", TForm::scalar('D'), Source::Weight),
        OutField::core("PIXEL", TForm::scalar('J'), Source::Pixel),
        OutField::core("STR", TForm::scalar('D'), Source::Area),
    ];
    for column in mask.columns().iter() {
        fields.push(OutField::extra(column, log)?);
    }
    if options.keep_ids && mask.column("ids").is_none() {
        fields.push(OutField::core("IDS", TForm::scalar('K'), Source::Ids));
    }

    let row_size: usize = fields.iter().map(|f| f.form.width()).sum();
    let mut rows = Vec::with_capacity(row_size * mask.len());
    let mut heap = Vec::new();
    for row in 0..mask.len() {
        for field in &fields {
            field.encode_cell(mask, row, max_caps, &mut rows, &mut heap)?;
        }
    }

    let mut bytes = primary_header(mask).to_bytes();
    bytes.extend(table_header(&fields, row_size, mask.len(), heap.len()).to_bytes());
    let data_start = bytes.len();
    bytes.extend(rows);
    bytes.extend(heap);
    if bytes.len() > data_start {
        pad_to_block(&mut bytes, 0);
    }
    Ok(bytes)
}

fn primary_header(mask: &Mask) -> Header {
    let mut header = Header::new();
    header.add(Keyword::logical("SIMPLE", true));
    header.add(Keyword::integer("BITPIX", 8));
    header.add(Keyword::integer("NAXIS", 0));
    header.add(Keyword::logical("EXTEND", true));
    let meta = mask.header();
    if let Some(pixelization) = meta.pixelization {
        header.add(Keyword::integer(PIXRES, pixelization.resolution as i64));
        header.add(Keyword::string(PIXTYPE, pixelization.scheme.code().to_string()));
    }
    header.add(Keyword::logical(SNAPPED, meta.snapped));
    header.add(Keyword::logical(BLKNIZED, meta.balkanized));
    header
}

fn table_header(fields: &[OutField<'_>], row_size: usize, nrows: usize, heap_size: usize) -> Header {
    let mut header = Header::new();
    header.add(Keyword::string("XTENSION", "BINTABLE"));
    header.add(Keyword::integer("BITPIX", 8));
    header.add(Keyword::integer("NAXIS", 2));
    header.add(Keyword::integer("NAXIS1", row_size as i64));
    header.add(Keyword::integer("NAXIS2", nrows as i64));
    header.add(Keyword::integer("PCOUNT", heap_size as i64));
    header.add(Keyword::integer("GCOUNT", 1));
    header.add(Keyword::integer("TFIELDS", fields.len() as i64));

    for (i, field) in fields.iter().enumerate() {
        let n = i + 1;
        header.add(Keyword::string(format!("TTYPE{}", n), field.name.clone()));
        header.add(Keyword::string(format!("TFORM{}", n), field.form.to_string()));
        let meta = &field.meta;
        if let Some(unit) = &meta.unit {
            header.add(Keyword::string(format!("TUNIT{}", n), unit.clone()));
        }
        if let Some(null) = &meta.null {
            header.add(match null.trim().parse::<i64>() {
                Ok(value) => Keyword::integer(format!("TNULL{}", n), value),
                Err(_) => Keyword::string(format!("TNULL{}", n), null.clone()),
            });
        }
        if let Some(scale) = meta.scale {
            header.add(Keyword::real(format!("TSCAL{}", n), scale));
        }
        if let Some(zero) = meta.zero {
            header.add(Keyword::real(format!("TZERO{}", n), zero));
        }
        if let Some(display) = &meta.display {
            header.add(Keyword::string(format!("TDISP{}", n), display.clone()));
        }
        if let Some(dim) = &meta.dim {
            header.add(Keyword::string(format!("TDIM{}", n), dim.clone()));
        }
    }
    header
}

enum Source<'m> {
    Axes,
    Sizes,
    Ncaps,
    Weight,
    Pixel,
    Area,
    Ids,
    Extra(&'m ColumnData),
}

struct OutField<'m> {
    name: String,
    form: TForm,
    meta: ColumnFormat,
    source: Source<'m>,
}

#[derive(Clone, Copy)]
enum Value {
    Bool(bool),
    Int(i128),
    Real(f64),
}

impl Value {
    fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => b as u8 as f64,
            Self::Int(i) => i as f64,
            Self::Real(r) => r,
        }
    }
}

impl<'m> OutField<'m> {
    fn core(name: &str, form: TForm, source: Source<'m>) -> Self {
        Self {
            name: name.to_string(),
            form,
            meta: ColumnFormat::new(form.to_string(), None),
            source,
        }
    }

    fn with_dim(mut self, dim: String) -> Self {
        self.meta.dim = Some(dim);
        self
    }

    fn extra(column: &'m Column, log: &mut WarningLog) -> Result<Self> {
        let data = column.data();
        let meta = column.format().clone();
        let mut form = TForm::parse(&meta.tform)?;
        if !form.is_supported() {
            return Err(MaskError::validation(
                "fits::write",
                &format!("column '{}' has unsupported binary form '{}'", column.name(), meta.tform),
            ));
        }

        match data {
            ColumnData::Str(_) => {
                form = TForm::fixed(form.repeat.max(data.max_string_len()).max(1), 'A');
            }
            ColumnData::IntArray(rows) if form.variable || data.fixed_width().is_none() => {
                form = TForm::heap(form.code, rows.iter().map(Vec::len).max().unwrap_or(0));
            }
            ColumnData::FloatArray(rows) if form.variable || data.fixed_width().is_none() => {
                form = TForm::heap(form.code, rows.iter().map(Vec::len).max().unwrap_or(0));
            }
            ColumnData::U64(_) if form.code != 'K' => {
                log.push(ConsistencyWarning::UnsignedPrecisionLoss {
                    column: column.name().to_string(),
                });
            }
            _ => {}
        }

        Ok(Self {
            name: column.name().to_uppercase(),
            form,
            meta,
            source: Source::Extra(data),
        })
    }

    fn encode_cell(
        &self,
        mask: &Mask,
        row: usize,
        max_caps: usize,
        out: &mut Vec<u8>,
        heap: &mut Vec<u8>,
    ) -> Result<()> {
        let caps = mask.polygons()[row].caps();
        match self.source {
            Source::Axes => {
                for k in 0..max_caps {
                    let axis = caps.get(k).map_or([0.0; 3], |c| [c.x, c.y, c.z]);
                    for value in axis {
                        out.write_f64::<BigEndian>(value)?;
                    }
                }
            }
            Source::Sizes => {
                for k in 0..max_caps {
                    out.write_f64::<BigEndian>(caps.get(k).map_or(0.0, |c| c.cm))?;
                }
            }
            Source::Ncaps => out.write_i32::<BigEndian>(caps.len().min(i32::MAX as usize) as i32)?,
            Source::Weight => out.write_f64::<BigEndian>(mask.weights()[row])?,
            Source::Area => out.write_f64::<BigEndian>(mask.areas()[row])?,
            Source::Pixel => out.write_i32::<BigEndian>(mask.pixels()[row])?,
            Source::Ids => out.write_i64::<BigEndian>(mask.ids()[row])?,
            Source::Extra(data) => self.encode_extra(data, row, out, heap)?,
        }
        Ok(())
    }

    fn encode_extra(&self, data: &ColumnData, row: usize, out: &mut Vec<u8>, heap: &mut Vec<u8>) -> Result<()> {
        if let ColumnData::Str(values) = data {
            let mut bytes = values[row].as_bytes().to_vec();
            bytes.resize(self.form.repeat, b' ');
            out.extend_from_slice(&bytes);
            return Ok(());
        }

        let mut values = row_values(data, row);
        if self.form.variable {
            let offset = heap.len();
            for &value in &values {
                self.encode_element(value, heap)?;
            }
            out.write_i32::<BigEndian>(values.len() as i32)?;
            out.write_i32::<BigEndian>(offset as i32)?;
            return Ok(());
        }

        values.resize(self.form.repeat, Value::Int(0));
        for value in values {
            self.encode_element(value, out)?;
        }
        Ok(())
    }

    /// Stores one physical value as `(value - zero) / scale` in the field's type.
    fn encode_element(&self, value: Value, out: &mut Vec<u8>) -> Result<()> {
        let zero = self.meta.zero.unwrap_or(0.0);
        let scale = self.meta.scale.unwrap_or(1.0);
        let code = self.form.code;

        match code {
            'L' => out.push(if value.as_f64() != 0.0 { b'T' } else { b'F' }),
            'E' => out.write_f32::<BigEndian>(((value.as_f64() - zero) / scale) as f32)?,
            'D' => out.write_f64::<BigEndian>((value.as_f64() - zero) / scale)?,
            _ => {
                let stored = match value {
                    Value::Int(i) if scale == 1.0 && zero.fract() == 0.0 => i - zero as i128,
                    other => ((other.as_f64() - zero) / scale).round() as i128,
                };
                let (low, high) = integer_range(code);
                let stored = stored.clamp(low, high);
                match code {
                    'B' => out.push(stored as u8),
                    'I' => out.write_i16::<BigEndian>(stored as i16)?,
                    'J' => out.write_i32::<BigEndian>(stored as i32)?,
                    _ => out.write_i64::<BigEndian>(stored as i64)?,
                }
            }
        }
        Ok(())
    }
}

fn row_values(data: &ColumnData, row: usize) -> Vec<Value> {
    match data {
        ColumnData::Bool(v) => vec![Value::Bool(v[row])],
        ColumnData::U8(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::I8(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::I16(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::U16(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::I32(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::U32(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::I64(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::U64(v) => vec![Value::Int(v[row] as i128)],
        ColumnData::F32(v) => vec![Value::Real(v[row] as f64)],
        ColumnData::F64(v) => vec![Value::Real(v[row])],
        ColumnData::IntArray(v) => v[row].iter().map(|&x| Value::Int(x as i128)).collect(),
        ColumnData::FloatArray(v) => v[row].iter().map(|&x| Value::Real(x)).collect(),
        ColumnData::Str(_) => Vec::new(),
    }
}
