use crate::cap::Cap;
use crate::errors::{ConsistencyWarning, MaskError, Result, WarningLog};
use crate::mask::{Mask, MaskBuilder, MaskHeader, PixelScheme, Pixelization, PolygonEntry};
use crate::polygon::Polygon;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

/// Most elements reserved up front for a count read from the file.
const MAX_PREALLOCATED: usize = 1 << 16;

const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

static POLYGON_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"polygon\s+(-?\d+)\s+\(\s*(\d+)\s+caps").unwrap());

static WEIGHT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({})\s+weight", NUMBER)).unwrap());

static AREA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"({})\s+str", NUMBER)).unwrap());

static PIXEL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(-?\d+)\s+pixel").unwrap());

static POLYGON_COUNT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\d+)\s+polygons").unwrap());

static PIXELIZATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pixelization\s+(-?\d+)([sd])").unwrap());

/// Parses a text mask. Ids are returned exactly as written.
pub(crate) fn parse_mask(content: &str, origin: impl Display, log: &mut WarningLog) -> Result<Mask> {
    let origin = origin.to_string();
    let mut lines = content.lines().enumerate().peekable();

    let mut declared = None;
    let mut header = MaskHeader::default();

    while let Some(&(_, line)) = lines.peek() {
        if POLYGON_REGEX.is_match(line) {
            break;
        }
        lines.next();
        classify_header_line(line, &origin, &mut declared, &mut header, log)?;
    }

    let declared = declared.ok_or_else(|| {
        MaskError::format(&origin, "did not find polygon count line \"n polygons\" in header")
    })?;

    let mut builder = MaskBuilder::with_capacity(declared.min(MAX_PREALLOCATED)).header(header);
    while let Some((_, line)) = lines.next() {
        let Some(captures) = POLYGON_REGEX.captures(line) else {
            continue;
        };
        if builder.len() == declared {
            return Err(MaskError::format(
                &origin,
                &format!("found more than the {} polygons declared in the header", declared),
            ));
        }

        let id = parse_number::<i64>(&captures[1], &origin)?;
        let ncaps = parse_number::<usize>(&captures[2], &origin)?;

        let mut caps = Vec::with_capacity(ncaps.min(MAX_PREALLOCATED));
        for _ in 0..ncaps {
            let (number, cap_line) = lines.next().ok_or_else(|| {
                MaskError::format(
                    &origin,
                    &format!("polygon {} ends before its {} caps", id, ncaps),
                )
            })?;
            caps.push(parse_cap_line(cap_line, number + 1, &origin)?);
        }

        let mut entry = PolygonEntry::new(id, Polygon::new(caps));
        if let Some(c) = WEIGHT_REGEX.captures(line) {
            entry.weight = parse_number(&c[1], &origin)?;
        }
        if let Some(c) = AREA_REGEX.captures(line) {
            entry.area = parse_number(&c[1], &origin)?;
        }
        if let Some(c) = PIXEL_REGEX.captures(line) {
            entry.pixel = parse_number(&c[1], &origin)?;
        }
        builder.push(entry);
    }

    if builder.len() < declared {
        log.push(ConsistencyWarning::PolygonCountMismatch {
            declared,
            found: builder.len(),
        });
    }

    Ok(builder.build())
}

fn classify_header_line(
    line: &str,
    origin: &str,
    declared: &mut Option<usize>,
    header: &mut MaskHeader,
    log: &mut WarningLog,
) -> Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }
    if let Some(c) = POLYGON_COUNT_REGEX.captures(line) {
        let count: i64 = parse_number(&c[1], origin)?;
        if count < 0 {
            return Err(MaskError::format(
                origin,
                &format!("negative polygon count {}", count),
            ));
        }
        *declared = Some(count as usize);
    } else if let Some(c) = PIXELIZATION_REGEX.captures(line) {
        let scheme = c[2].chars().next().and_then(PixelScheme::from_code);
        if let Some(scheme) = scheme {
            header.pixelization = Some(Pixelization {
                resolution: parse_number(&c[1], origin)?,
                scheme,
            });
        }
    } else if line.contains("snapped") {
        header.snapped = true;
    } else if line.contains("balkanized") {
        header.balkanized = true;
    } else {
        log.push(ConsistencyWarning::UnknownHeaderLine {
            line: line.trim().to_string(),
        });
    }
    Ok(())
}

fn parse_cap_line(line: &str, line_number: usize, origin: &str) -> Result<Cap> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map(|token| token.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| bad_cap_line(line, line_number, origin))?;

    match values.as_slice() {
        &[x, y, z, cm] => Ok(Cap::new(x, y, z, cm)),
        _ => Err(bad_cap_line(line, line_number, origin)),
    }
}

fn bad_cap_line(line: &str, line_number: usize, origin: &str) -> MaskError {
    MaskError::format(
        origin,
        &format!(
            "line {}: expected four numbers \"x y z cm\", got \"{}\"",
            line_number,
            line.trim()
        ),
    )
}

fn parse_number<T: std::str::FromStr>(token: &str, origin: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| MaskError::format(origin, &format!("cannot parse '{}' as a number", token)))
}
