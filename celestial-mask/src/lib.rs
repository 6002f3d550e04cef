//! Spherical polygon masks for survey geometry.
//!
//! A mask partitions the sky into polygons, each the intersection of
//! spherical caps. This crate loads masks from text (`.ply`/`.pol`) and
//! binary-table (`.fits`) files, classifies sky positions into polygons, and
//! writes masks back out together with any auxiliary per-polygon columns.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cap`] | [`Cap`]: one-sided spherical region and its containment test |
//! | [`polygon`] | [`Polygon`]: conjunction of caps, scalar and batched containment |
//! | [`kernel`] | [`Backend`]: interchangeable scalar / SIMD containment kernels |
//! | [`points`] | RA/Dec to unit-vector conversion, [`UnitVectors`](points::UnitVectors) batches |
//! | [`mask`] | [`Mask`] store, [`MaskBuilder`], attribute setters, id reconciliation |
//! | [`selection`] | [`Selection`] specifiers for `select` and the setters |
//! | [`column`] | Auxiliary columns and their [`ColumnFormat`] |
//! | [`query`] | [`QueryEngine`]: batched and single-point classification |
//! | [`ply`] | Text codec and sibling column files |
//! | [`fits`] | Binary-table codec |
//! | [`records`] | [`PolygonRecord`] source for database rows |
//! | [`options`] | [`LoadOptions`], [`WriteOptions`], [`QueryConfig`] |
//! | [`errors`] | [`MaskError`] and [`ConsistencyWarning`] |
//!
//! # Quick Start
//!
//! ```ignore
//! use celestial_mask::{Mask, QueryEngine};
//!
//! let mask = Mask::open("boss_geometry.ply")?;
//! let engine = QueryEngine::new(&mask);
//!
//! let ids = engine.classify(&[150.1, 210.7], &[2.2, 35.0])?;
//! let (area, effective_area) = engine.total_area();
//! ```
//!
//! # Features
//!
//! - **`simd`** (default): four-lane containment kernel built on `wide`.
//! - **`parallel`** (default): batched queries split across the rayon pool.
//! - **`cli`**: the `mask` binary.

pub mod cap;
pub mod column;
pub mod errors;
pub mod fits;
mod io;
pub mod kernel;
pub mod mask;
pub mod options;
pub mod ply;
pub mod points;
pub mod polygon;
pub mod query;
pub mod records;
pub mod selection;

pub use cap::Cap;
pub use column::{ColumnData, ColumnFormat, TextFormat};
pub use errors::{ConsistencyWarning, MaskError, Result};
pub use io::MaskFormat;
pub use kernel::Backend;
pub use mask::{Mask, MaskBuilder, MaskHeader, PixelScheme, Pixelization, PolygonEntry};
pub use options::{LoadOptions, QueryConfig, WriteOptions};
pub use polygon::Polygon;
pub use query::{QueryEngine, UNMATCHED};
pub use records::PolygonRecord;
pub use selection::Selection;
