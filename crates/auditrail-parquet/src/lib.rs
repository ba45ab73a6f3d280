//! Parquet conversion for closed audit log files
//!
//! Reads a line-delimited JSON file, infers an Arrow schema from its leading
//! records and writes a Snappy-compressed Parquet file next to it.

use arrow_json::reader::{infer_json_schema_from_seekable, ReaderBuilder};
use auditrail_core::{columnar_path_for, AuditError, ColumnarConverter, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Converts local JSON-lines files to Parquet
#[derive(Debug, Clone)]
pub struct ParquetConverter {
    max_infer_records: usize,
    batch_size: usize,
}

impl Default for ParquetConverter {
    fn default() -> Self {
        Self {
            max_infer_records: 1000,
            batch_size: 8192,
        }
    }
}

impl ParquetConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leading records used to infer the schema
    pub fn with_max_infer_records(mut self, records: usize) -> Self {
        self.max_infer_records = records.max(1);
        self
    }

    /// Rows per Arrow record batch
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    fn write_parquet(&self, source: &Path, target: &Path) -> Result<u64> {
        let (schema, inferred) = infer_json_schema_from_seekable(
            BufReader::new(File::open(source)?),
            Some(self.max_infer_records),
        )
        .map_err(|e| failure(source, e))?;
        if inferred == 0 {
            return Err(AuditError::ConversionFailure(format!(
                "{} contains no records",
                source.display()
            )));
        }

        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(schema.clone())
            .with_batch_size(self.batch_size)
            .build(BufReader::new(File::open(source)?))
            .map_err(|e| failure(source, e))?;

        let properties = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(File::create(target)?, schema, Some(properties))
            .map_err(|e| failure(source, e))?;

        let mut rows = 0u64;
        for batch in reader {
            let batch = batch.map_err(|e| failure(source, e))?;
            rows += batch.num_rows() as u64;
            writer.write(&batch).map_err(|e| failure(source, e))?;
        }
        writer.close().map_err(|e| failure(source, e))?;
        Ok(rows)
    }
}

impl ColumnarConverter for ParquetConverter {
    fn extension(&self) -> &str {
        "parquet"
    }

    /// Convert `source`, writing `<stem>.parquet` beside it
    ///
    /// Output goes to a temporary sibling first and is renamed into place, so
    /// a failed conversion never leaves a partial Parquet file.
    fn convert(&self, source: &Path) -> Result<PathBuf> {
        let target = columnar_path_for(source, self.extension());
        let partial = columnar_path_for(source, "parquet.partial");

        match self.write_parquet(source, &partial) {
            Ok(rows) => {
                fs::rename(&partial, &target)?;
                tracing::debug!(
                    source = %source.display(),
                    target = %target.display(),
                    rows,
                    "Wrote parquet file"
                );
                Ok(target)
            }
            Err(e) => {
                if let Err(remove) = fs::remove_file(&partial) {
                    if remove.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %partial.display(),
                            error = %remove,
                            "Failed to remove partial parquet file"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

fn failure(source: &Path, error: impl std::fmt::Display) -> AuditError {
    AuditError::ConversionFailure(format!("{}: {}", source.display(), error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lines(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_converts_json_lines() {
        let dir = TempDir::new().unwrap();
        let source = write_lines(
            &dir,
            "hdfs_audit.log",
            &[
                r#"{"repoType":1,"reqUser":"alice","result":1,"seq_num":1}"#,
                r#"{"repoType":1,"reqUser":"bob","result":0,"seq_num":2}"#,
                r#"{"repoType":1,"reqUser":"carol","result":1,"seq_num":3}"#,
            ],
        );

        let target = ParquetConverter::new().with_batch_size(2).convert(&source).unwrap();
        assert_eq!(target, dir.path().join("hdfs_audit.parquet"));
        assert!(!dir.path().join("hdfs_audit.parquet.partial").exists());

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&target).unwrap()).unwrap();
        let fields: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert!(fields.contains(&"reqUser".to_string()));
        assert!(fields.contains(&"seq_num".to_string()));

        let rows: usize = builder
            .build()
            .unwrap()
            .map(|batch| batch.unwrap().num_rows())
            .sum();
        assert_eq!(rows, 3);

        // Source is left as it was
        assert_eq!(fs::read_to_string(&source).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_empty_file_fails() {
        let dir = TempDir::new().unwrap();
        let source = write_lines(&dir, "empty.log", &[]);

        let result = ParquetConverter::new().convert(&source);
        assert!(matches!(result, Err(AuditError::ConversionFailure(_))));
        assert!(!dir.path().join("empty.parquet").exists());
        assert!(!dir.path().join("empty.parquet.partial").exists());
    }

    #[test]
    fn test_malformed_json_fails() {
        let dir = TempDir::new().unwrap();
        let source = write_lines(&dir, "broken.log", &[r#"{"a":1}"#, "not json"]);

        let result = ParquetConverter::new().convert(&source);
        assert!(matches!(result, Err(AuditError::ConversionFailure(_))));
        assert!(!dir.path().join("broken.parquet").exists());
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = ParquetConverter::new().convert(&dir.path().join("missing.log"));
        assert!(result.is_err());
    }
}
