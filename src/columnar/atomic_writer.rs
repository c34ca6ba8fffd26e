//! Atomic Parquet file writer with automatic cleanup on failure.
//!
//! Writes to a temporary file in the same directory as the destination,
//! then atomically replaces the destination on `finish()`. If dropped
//! before finishing, the temporary file is automatically cleaned up.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tempfile::NamedTempFile;

use crate::error::PushError;

/// An atomic Parquet writer.
///
/// Batches go to a temporary file which is persisted to the final path on
/// `finish()`. Dropping the writer without finishing deletes the temporary
/// file and leaves any existing destination untouched.
pub struct AtomicParquetWriter {
    writer: ArrowWriter<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
    rows_written: usize,
}

impl AtomicParquetWriter {
    /// Creates a writer for `final_path` with the given Arrow schema.
    ///
    /// The temporary file is created in the same directory as `final_path`
    /// so the final rename stays on one filesystem.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Io` if the parent directory cannot be determined,
    /// the temporary file cannot be created, or the Parquet writer fails to
    /// initialize.
    pub fn new(final_path: impl AsRef<Path>, schema: SchemaRef) -> Result<Self, PushError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = final_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if final_path.file_name().is_none() {
            return Err(PushError::Io(format!(
                "Cannot determine file name for: {}",
                final_path.display()
            )));
        }

        let temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| PushError::Io(format!("Failed to create temporary file: {}", e)))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let writer = ArrowWriter::try_new(BufWriter::new(temp_file), schema, Some(props))
            .map_err(|e| PushError::Io(format!("Failed to create Parquet writer: {}", e)))?;

        Ok(Self {
            writer,
            final_path,
            rows_written: 0,
        })
    }

    /// Appends one batch.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<(), PushError> {
        self.writer
            .write(batch)
            .map_err(|e| PushError::Io(format!("Failed to write Parquet batch: {}", e)))?;
        self.rows_written += batch.num_rows();
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Writes the footer, flushes and atomically persists the file.
    ///
    /// # Returns
    ///
    /// The final path on success.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Io` if closing, flushing or persisting fails.
    /// On error, the temporary file is cleaned up automatically.
    pub fn finish(self) -> Result<PathBuf, PushError> {
        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| PushError::Io(format!("Failed to close Parquet writer: {}", e)))?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| PushError::Io(format!("Failed to flush buffer: {}", e.error())))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            PushError::Io(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(self.final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn batch(ids: Vec<i64>, names: Vec<&str>) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    fn read_rows(path: &Path) -> i64 {
        let file = fs::File::open(path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        builder.metadata().file_metadata().num_rows()
    }

    #[test]
    fn test_successful_write() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.parquet");

        let mut writer = AtomicParquetWriter::new(&final_path, schema()).unwrap();
        writer.write(&batch(vec![1, 2], vec!["Alice", "Bob"])).unwrap();
        writer.write(&batch(vec![3], vec!["Carol"])).unwrap();
        assert_eq!(writer.rows_written(), 3);

        let result_path = writer.finish().expect("Failed to finish");
        assert_eq!(result_path, final_path);
        assert_eq!(read_rows(&final_path), 3);

        let magic = fs::read(&final_path).unwrap();
        assert_eq!(&magic[..4], b"PAR1");
    }

    #[test]
    fn test_zero_row_file_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        let final_path = temp_dir.path().join("empty.parquet");

        let writer = AtomicParquetWriter::new(&final_path, schema()).unwrap();
        writer.finish().unwrap();

        assert_eq!(read_rows(&final_path), 0);
    }

    #[test]
    fn test_drop_cleanup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.parquet");

        {
            let mut writer = AtomicParquetWriter::new(&final_path, schema()).unwrap();
            writer.write(&batch(vec![1], vec!["Alice"])).unwrap();
            // dropped without finish()
        }

        let entries_after: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(
            entries_after.is_empty(),
            "Directory should be empty after drop (temp file cleaned up)"
        );
        assert!(!final_path.exists());
    }

    #[test]
    fn test_overwrite_behavior() {
        let temp_dir = TempDir::new().unwrap();
        let final_path = temp_dir.path().join("output.parquet");
        fs::write(&final_path, "OLD_CONTENT").unwrap();

        let mut writer = AtomicParquetWriter::new(&final_path, schema()).unwrap();
        writer.write(&batch(vec![7], vec!["New"])).unwrap();
        writer.finish().unwrap();

        assert_eq!(read_rows(&final_path), 1);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let final_path = temp_dir.path().join("missing").join("output.parquet");

        let result = AtomicParquetWriter::new(&final_path, schema());
        assert!(matches!(result, Err(PushError::Io(_))));
    }
}
