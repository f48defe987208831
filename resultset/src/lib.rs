//! # Result sets
//!
//! The aligned dataset produced by a measurement run: an x axis, named
//! series of nullable samples that always have the same length as the x
//! axis, raw per-sample records and free-form metadata.
//!
//! Result sets are persisted as a single versioned JSON document which is
//! transparently compressed based on the file suffix (`.gz` and `.bz2`).
//! Documents written by older versions are migrated in memory on load.

#[macro_use]
extern crate tracing;

mod compression;
mod document;
mod error;
mod metadata;
mod raw;
mod resultset;
mod transform;

pub use compression::Compression;
pub use document::FORMAT_VERSION;
pub use error::{
    Error,
    Result,
};
pub use metadata::{
    epoch_seconds,
    format_time,
    from_epoch_seconds,
    parse_time,
    Metadata,
    TIME_SETTINGS,
};
pub use raw::RawSample;
pub use resultset::{
    ResultSet,
    MAX_FILENAME_LEN,
    RECORDED_SETTINGS,
    SUFFIX,
};
pub use transform::{
    DataTransform,
    DataTransformIter,
    TransformError,
};
