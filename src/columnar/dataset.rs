use std::fs::File;
use std::path::{Path, PathBuf};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::PushError;

/// A Parquet artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub path: PathBuf,
    pub row_count: u64,
    /// Size of the file on disk.
    pub byte_size: u64,
}

impl Dataset {
    /// Reads the row count from the Parquet footer and the byte size from
    /// the file metadata. No row data is read.
    ///
    /// # Errors
    ///
    /// - `PushError::Io` - the file cannot be opened
    /// - `PushError::Format` - the file is not a readable Parquet file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PushError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| PushError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        let byte_size = file
            .metadata()
            .map_err(|e| PushError::Io(format!("Failed to read metadata: {}", e)))?
            .len();

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            PushError::Format(format!("{} is not a Parquet file: {}", path.display(), e))
        })?;
        let row_count = u64::try_from(builder.metadata().file_metadata().num_rows())
            .map_err(|_| PushError::Format("negative row count in Parquet footer".to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            row_count,
            byte_size,
        })
    }

    /// File name without extension, used to name split parts.
    pub fn stem(&self) -> Result<String, PushError> {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PushError::Io(format!("No file name in path: {}", self.path.display()))
            })
    }

    pub fn file_name(&self) -> Result<String, PushError> {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PushError::Io(format!("No file name in path: {}", self.path.display()))
            })
    }
}
