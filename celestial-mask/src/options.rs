//! Load, write, and query settings.

use crate::kernel::Backend;
use serde::{Deserialize, Serialize};

/// Settings for [`Mask::open_with`](crate::Mask::open_with).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Move source ids into an `ids` column and renumber polygons `0..n`.
    pub keep_ids: bool,
    /// Read auxiliary columns from sibling text files. Binary tables always
    /// carry their columns.
    pub read_extra_columns: bool,
}

impl LoadOptions {
    pub fn keep_ids(mut self, keep: bool) -> Self {
        self.keep_ids = keep;
        self
    }

    pub fn read_extra_columns(mut self, read: bool) -> Self {
        self.read_extra_columns = read;
        self
    }
}

/// Settings for [`Mask::save_with`](crate::Mask::save_with).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Write the stored ids instead of `0..n`.
    pub keep_ids: bool,
    /// Write auxiliary columns as sibling text files. Binary tables always
    /// carry their columns.
    pub write_extra_columns: bool,
    /// Weighting scheme named in the file name. A trailing `_<name>` on the
    /// base name is dropped when naming sibling files.
    pub weight_column: Option<String>,
}

impl WriteOptions {
    pub fn keep_ids(mut self, keep: bool) -> Self {
        self.keep_ids = keep;
        self
    }

    pub fn write_extra_columns(mut self, write: bool) -> Self {
        self.write_extra_columns = write;
        self
    }

    pub fn weight_column(mut self, name: impl Into<String>) -> Self {
        self.weight_column = Some(name.into());
        self
    }
}

/// Settings for batched queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Containment kernel for batched tests.
    pub backend: Backend,
    /// Minimum points per parallel work unit.
    pub chunk_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::detect(),
            chunk_size: 4096,
        }
    }
}

impl QueryConfig {
    /// Config that uses the fast backend when `use_fast_backend` is set and
    /// the scalar kernel otherwise.
    pub fn with_fast_backend(use_fast_backend: bool) -> Self {
        Self {
            backend: Backend::select(use_fast_backend),
            ..Self::default()
        }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let load = LoadOptions::default();
        assert!(!load.keep_ids);
        assert!(!load.read_extra_columns);

        let write = WriteOptions::default();
        assert!(!write.write_extra_columns);
        assert!(write.weight_column.is_none());

        assert_eq!(QueryConfig::default().backend, Backend::detect());
    }

    #[test]
    fn test_builders() {
        let write = WriteOptions::default().keep_ids(true).weight_column("MAGLIM");
        assert!(write.keep_ids);
        assert_eq!(write.weight_column.as_deref(), Some("MAGLIM"));

        assert_eq!(QueryConfig::with_fast_backend(false).backend, Backend::Scalar);
        assert_eq!(QueryConfig::default().chunk_size(0).chunk_size, 1);
    }
}
