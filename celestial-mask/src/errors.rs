//! Error and warning types for mask loading, mutation, and queries.
//!
//! Failures fall into four groups, each with its own [`MaskError`] variant:
//!
//! | Variant | Raised by | Effect |
//! |---------|-----------|--------|
//! | [`Format`](MaskError::Format) | missing `n polygons` line, bad cap line, unknown extension | aborts the load |
//! | [`Validation`](MaskError::Validation) | column length mismatch, bad selection, unsupported column type | operation fails, mask unchanged |
//! | [`Lookup`](MaskError::Lookup) | area/weight requested for a point outside every polygon | surfaced to the caller |
//! | [`Io`](MaskError::Io) | file system failures | aborts the operation |
//!
//! Problems that have a deterministic recovery are not errors. They are
//! reported as a [`ConsistencyWarning`], logged through `tracing`, and the
//! load carries on.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for mask operations.
#[derive(Error, Debug)]
pub enum MaskError {
    /// The input could not be interpreted as a mask.
    #[error("Format error in {origin}: {message}")]
    Format { origin: String, message: String },

    /// An argument did not match the shape of the mask.
    #[error("Validation error in {operation}: {message}")]
    Validation { operation: String, message: String },

    /// A point that no polygon contains was asked for a per-polygon value.
    #[error("Lookup error: point {point_index} (ra={ra}, dec={dec}) is not inside any polygon")]
    Lookup { point_index: usize, ra: f64, dec: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, MaskError>`.
pub type Result<T> = std::result::Result<T, MaskError>;

impl MaskError {
    /// Creates a [`Format`](Self::Format) error.
    pub fn format(origin: impl fmt::Display, reason: &str) -> Self {
        Self::Format {
            origin: origin.to_string(),
            message: reason.to_string(),
        }
    }

    /// Creates a [`Validation`](Self::Validation) error.
    pub fn validation(operation: &str, reason: &str) -> Self {
        Self::Validation {
            operation: operation.to_string(),
            message: reason.to_string(),
        }
    }

    /// Creates a [`Lookup`](Self::Lookup) error.
    pub fn lookup(point_index: usize, ra: f64, dec: f64) -> Self {
        Self::Lookup {
            point_index,
            ra,
            dec,
        }
    }
}

/// A recoverable inconsistency found while loading or writing a mask.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyWarning {
    /// Ids formed a permutation of `0..n` but were not in order; polygons were re-sorted.
    OutOfOrderIds { count: usize },
    /// Ids were not a permutation of `0..n`; they were kept in the `ids` column.
    NonSequentialIds { min: i64, max: i64, expected_max: i64 },
    /// A header line that matched no known keyword.
    UnknownHeaderLine { line: String },
    /// A sibling column file with the wrong number of rows.
    SiblingRowMismatch {
        path: PathBuf,
        rows: usize,
        expected: usize,
    },
    /// A sibling column file none of the table readers could parse.
    UnreadableSibling { path: PathBuf },
    /// A sibling column file named after a core polygon attribute.
    ReservedSiblingName { path: PathBuf, name: String },
    /// The file declared a different number of polygons than it contained.
    PolygonCountMismatch { declared: usize, found: usize },
    /// A 64-bit unsigned column was narrowed to 32 bits for binary storage.
    UnsignedPrecisionLoss { column: String },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrderIds { count } => write!(
                f,
                "found {} polygons out of order; reordering so that id == index",
                count
            ),
            Self::NonSequentialIds {
                min,
                max,
                expected_max,
            } => write!(
                f,
                "range of polygon ids is ({}, {}), not (0, {}); source ids kept in column 'ids'",
                min, max, expected_max
            ),
            Self::UnknownHeaderLine { line } => write!(f, "header line \"{}\" ignored", line),
            Self::SiblingRowMismatch {
                path,
                rows,
                expected,
            } => write!(
                f,
                "{} has {} rows but the mask has {} polygons; column skipped",
                path.display(),
                rows,
                expected
            ),
            Self::UnreadableSibling { path } => {
                write!(f, "could not read column from {}", path.display())
            }
            Self::ReservedSiblingName { path, name } => write!(
                f,
                "{} names the core attribute '{}'; column skipped",
                path.display(),
                name
            ),
            Self::PolygonCountMismatch { declared, found } => {
                write!(f, "got {} polygons, expecting {}", found, declared)
            }
            Self::UnsignedPrecisionLoss { column } => write!(
                f,
                "column '{}' holds 64-bit unsigned values; stored as 32-bit unsigned",
                column
            ),
        }
    }
}

/// Collects warnings for a single load or write, logging each one as it arrives.
#[derive(Debug, Default)]
pub(crate) struct WarningLog {
    warnings: Vec<ConsistencyWarning>,
}

impl WarningLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, warning: ConsistencyWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub(crate) fn into_inner(self) -> Vec<ConsistencyWarning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = MaskError::format("mask.ply", "missing polygon count");
        assert_eq!(
            err.to_string(),
            "Format error in mask.ply: missing polygon count"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = MaskError::validation("add_column", "length 3 does not match 4 polygons");
        assert!(err.to_string().contains("Validation error in add_column"));
        assert!(err.to_string().contains("length 3"));
    }

    #[test]
    fn test_lookup_error_display() {
        let err = MaskError::lookup(7, 10.5, -3.25);
        let msg = err.to_string();
        assert!(msg.contains("point 7"));
        assert!(msg.contains("ra=10.5"));
        assert!(msg.contains("dec=-3.25"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MaskError = io_error.into();
        assert!(matches!(err, MaskError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MaskError>();
        assert_send_sync::<ConsistencyWarning>();
    }

    #[test]
    fn test_warning_display() {
        let w = ConsistencyWarning::NonSequentialIds {
            min: 5,
            max: 9,
            expected_max: 2,
        };
        assert!(w.to_string().contains("(5, 9)"));
        assert!(w.to_string().contains("'ids'"));

        let w = ConsistencyWarning::PolygonCountMismatch {
            declared: 4,
            found: 3,
        };
        assert_eq!(w.to_string(), "got 3 polygons, expecting 4");
    }

    #[test]
    fn test_warning_log_collects_in_order() {
        let mut log = WarningLog::new();
        log.push(ConsistencyWarning::OutOfOrderIds { count: 2 });
        log.push(ConsistencyWarning::UnknownHeaderLine {
            line: "garbage".into(),
        });
        let warnings = log.into_inner();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0], ConsistencyWarning::OutOfOrderIds { count: 2 });
    }
}
