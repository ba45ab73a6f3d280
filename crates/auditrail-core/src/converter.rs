//! Columnar conversion interface
//!
//! A converter turns a closed line-delimited JSON log into a columnar file
//! next to it. Conversion is best-effort: failures are reported to the caller
//! of `convert` and never touch the source file.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Converts a completed line-delimited log file into a columnar file
pub trait ColumnarConverter: Send + Sync {
    /// File extension of the produced files (without the dot)
    fn extension(&self) -> &str;

    /// Convert `source`, returning the path of the columnar file
    fn convert(&self, source: &Path) -> Result<PathBuf>;
}

/// Path of the columnar file produced for `source`
///
/// Same directory and stem, extension replaced by `extension`.
pub fn columnar_path_for(source: &Path, extension: &str) -> PathBuf {
    source.with_extension(extension)
}
