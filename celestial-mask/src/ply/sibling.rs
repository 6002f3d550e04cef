//! Auxiliary columns stored next to a text mask.
//!
//! A column named `maglim` for `survey.ply` lives in `survey.maglim`, one
//! row per polygon. When the mask's base name carries a weighting suffix
//! (`survey_obstime.pol`) the siblings may be named after the unsuffixed base
//! (`survey.maglim`).

use crate::column::{is_reserved_name, normalize_name, ColumnData};
use crate::errors::{ConsistencyWarning, Result, WarningLog};
use crate::mask::Mask;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// File endings that are never auxiliary columns.
const EXCLUDED_SUFFIXES: [&str; 6] = [".ply", ".pol", ".fits", ".list", ".eps", ".list.weight"];

/// Directory and base name (file name up to its first `.`) of `path`.
fn split_base(path: &Path) -> (PathBuf, String) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = match file_name.split_once('.') {
        Some((base, _)) => base.to_string(),
        None => file_name,
    };
    (dir, base)
}

/// Sibling column files for the mask at `path`, sorted by name.
pub(crate) fn discover(path: &Path) -> Result<Vec<PathBuf>> {
    let (dir, base) = split_base(path);
    let found = list_candidates(&dir, &base)?;
    if !found.is_empty() {
        return Ok(found);
    }
    match base.rsplit_once('_') {
        Some((stripped, _)) if !stripped.is_empty() => list_candidates(&dir, stripped),
        _ => Ok(found),
    }
}

fn list_candidates(dir: &Path, base: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}.", base);
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || name.len() == prefix.len() {
            continue;
        }
        if EXCLUDED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }
        if entry.file_type()?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// Column name of a sibling file: its last extension.
fn column_name(path: &Path) -> String {
    path.extension()
        .map(|ext| normalize_name(&ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Reads every sibling column of `path` into `mask`.
///
/// Files that cannot be parsed, or whose row count differs from the polygon
/// count, are skipped with a warning.
pub(crate) fn read_siblings(mask: &mut Mask, path: &Path, log: &mut WarningLog) -> Result<()> {
    for sibling in discover(path)? {
        let name = column_name(&sibling);
        if name.is_empty() {
            continue;
        }
        if is_reserved_name(&name) {
            log.push(ConsistencyWarning::ReservedSiblingName {
                path: sibling,
                name,
            });
            continue;
        }

        let parsed = fs::read(&sibling)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|content| parse_column(&content));
        let Some(data) = parsed else {
            log.push(ConsistencyWarning::UnreadableSibling { path: sibling });
            continue;
        };

        if data.len() != mask.len() {
            log.push(ConsistencyWarning::SiblingRowMismatch {
                path: sibling,
                rows: data.len(),
                expected: mask.len(),
            });
            continue;
        }

        tracing::debug!(column = %name, path = %sibling.display(), "read sibling column");
        mask.add_column(&name, data)?;
    }
    Ok(())
}

/// Parses sibling text, trying a fixed-width table, then variable-length
/// integer rows, then variable-length real rows.
pub(crate) fn parse_column(content: &str) -> Option<ColumnData> {
    let rows: Vec<Vec<&str>> = content
        .lines()
        .map(|line| line.split_whitespace().collect())
        .collect();

    parse_fixed_table(&rows)
        .or_else(|| parse_rows::<i64>(&rows).map(ColumnData::IntArray))
        .or_else(|| parse_rows::<f64>(&rows).map(ColumnData::FloatArray))
}

fn parse_fixed_table(rows: &[Vec<&str>]) -> Option<ColumnData> {
    let width = rows.first()?.len();
    if width == 0 || rows.iter().any(|row| row.len() != width) {
        return None;
    }

    if width == 1 {
        let tokens: Vec<&str> = rows.iter().map(|row| row[0]).collect();
        return parse_all::<i64>(&tokens)
            .map(ColumnData::I64)
            .or_else(|| parse_all::<f64>(&tokens).map(ColumnData::F64))
            .or_else(|| {
                Some(ColumnData::Str(
                    tokens.iter().map(|t| t.to_string()).collect(),
                ))
            });
    }

    parse_rows::<i64>(rows)
        .map(ColumnData::IntArray)
        .or_else(|| parse_rows::<f64>(rows).map(ColumnData::FloatArray))
}

fn parse_all<T: std::str::FromStr>(tokens: &[&str]) -> Option<Vec<T>> {
    tokens.iter().map(|t| t.parse().ok()).collect()
}

fn parse_rows<T: std::str::FromStr>(rows: &[Vec<&str>]) -> Option<Vec<Vec<T>>> {
    rows.iter().map(|row| parse_all(row)).collect()
}

/// Path of the sibling file holding column `name` for the mask at `path`.
pub(crate) fn sibling_path(path: &Path, name: &str, weight_column: Option<&str>) -> PathBuf {
    let (dir, mut base) = split_base(path);
    if let Some(weight) = weight_column {
        let suffix = format!("_{}", weight);
        if let Some(stripped) = base.strip_suffix(&suffix) {
            base = stripped.to_string();
        }
    }
    dir.join(format!("{}.{}", base, name))
}

/// Writes one sibling file per column that has a text format.
pub(crate) fn write_siblings(mask: &Mask, path: &Path, weight_column: Option<&str>) -> Result<()> {
    for column in mask.columns().iter() {
        let Some(text) = column.format().text else {
            continue;
        };
        let mut content = String::new();
        for row in 0..column.data().len() {
            let _ = writeln!(content, "{}", column.data().format_row(row, text));
        }
        let target = sibling_path(path, column.name(), weight_column);
        tracing::debug!(column = column.name(), path = %target.display(), "writing sibling column");
        fs::write(&target, content)?;
    }
    Ok(())
}
