//! Row-order-preserving split of one Parquet artifact into N parts.
//!
//! Rows are streamed batch by batch from the source and sliced across part
//! writers, so the source is never held in memory as a whole. Part sizes
//! differ by at most one row: the first `rows % count` parts carry the
//! extra row. Exactly `count` parts are written even when some are empty.

use std::fs::File;
use std::path::{Path, PathBuf};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, info, warn};

use crate::columnar::atomic_writer::AtomicParquetWriter;
use crate::columnar::dataset::Dataset;
use crate::error::PushError;

/// Rows per batch read from the source.
const READ_BATCH_ROWS: usize = 8192;

/// Near-equal partition of `rows` into `count` contiguous groups.
///
/// Returns an empty vector when `count` is 0.
pub fn partition_sizes(rows: usize, count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let base = rows / count;
    let extra = rows % count;
    (0..count)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// File name of part `number` (1-based) of an artifact named `stem`.
pub fn part_file_name(stem: &str, number: usize) -> String {
    format!("{}_part_{}.parquet", stem, number)
}

/// Splits `dataset` into `count` Parquet files in `out_dir`.
///
/// The source file is left in place.
///
/// # Returns
///
/// One `Dataset` per part, in part order.
///
/// # Errors
///
/// - `PushError::Configuration` - `count` is 0
/// - `PushError::Format` - the source cannot be read as Parquet
/// - `PushError::Io` - a part cannot be written
pub async fn split_dataset(
    dataset: &Dataset,
    count: usize,
    out_dir: &Path,
) -> Result<Vec<Dataset>, PushError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| PushError::Io(format!("Failed to create output directory: {}", e)))?;

    let dataset = dataset.clone();
    let out_dir = out_dir.to_owned();

    tokio::task::spawn_blocking(move || split_dataset_blocking(&dataset, count, &out_dir))
        .await
        .map_err(|e| PushError::Internal(format!("Task join error: {}", e)))?
}

/// Blocking implementation of [`split_dataset`].
pub fn split_dataset_blocking(
    dataset: &Dataset,
    count: usize,
    out_dir: &Path,
) -> Result<Vec<Dataset>, PushError> {
    if count == 0 {
        return Err(PushError::Configuration(
            "split count must be at least 1".to_string(),
        ));
    }

    let mut finished: Vec<PathBuf> = Vec::with_capacity(count);
    if let Err(e) = write_parts(dataset, count, out_dir, &mut finished) {
        for path in &finished {
            if let Err(remove_err) = std::fs::remove_file(path) {
                warn!(
                    "[SPLITTER] Failed to remove partial part {}: {}",
                    path.display(),
                    remove_err
                );
            }
        }
        return Err(e);
    }

    let parts = finished
        .iter()
        .map(Dataset::open)
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "[SPLITTER] Split {} rows of {} into {} parts",
        dataset.row_count,
        dataset.path.display(),
        parts.len()
    );

    Ok(parts)
}

fn write_parts(
    dataset: &Dataset,
    count: usize,
    out_dir: &Path,
    finished: &mut Vec<PathBuf>,
) -> Result<(), PushError> {
    let stem = dataset.stem()?;
    let row_count = usize::try_from(dataset.row_count)
        .map_err(|_| PushError::Format("row count does not fit in memory index".to_string()))?;
    let sizes = partition_sizes(row_count, count);

    let file = File::open(&dataset.path).map_err(|e| {
        PushError::Io(format!("Failed to open {}: {}", dataset.path.display(), e))
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| PushError::Format(format!("Failed to read Parquet source: {}", e)))?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(READ_BATCH_ROWS)
        .build()
        .map_err(|e| PushError::Format(format!("Failed to read Parquet source: {}", e)))?;

    let part_path = |index: usize| out_dir.join(part_file_name(&stem, index + 1));

    let mut part = 0;
    let mut remaining = sizes[0];
    let mut writer = AtomicParquetWriter::new(part_path(part), schema.clone())?;
    let mut rows_seen = 0usize;

    for batch in reader {
        let batch =
            batch.map_err(|e| PushError::Format(format!("Failed to read Parquet batch: {}", e)))?;
        let mut offset = 0;

        while offset < batch.num_rows() {
            while remaining == 0 {
                debug!("[SPLITTER] Part {} complete ({} rows)", part + 1, writer.rows_written());
                finished.push(writer.finish()?);
                part += 1;
                if part >= count {
                    return Err(PushError::Format(format!(
                        "{} holds more rows than its footer reports ({})",
                        dataset.path.display(),
                        row_count
                    )));
                }
                remaining = sizes[part];
                writer = AtomicParquetWriter::new(part_path(part), schema.clone())?;
            }

            let take = remaining.min(batch.num_rows() - offset);
            writer.write(&batch.slice(offset, take))?;
            offset += take;
            remaining -= take;
            rows_seen += take;
        }
    }

    finished.push(writer.finish()?);

    // Trailing empty parts still get a zero-row file.
    for index in part + 1..count {
        let empty = AtomicParquetWriter::new(part_path(index), schema.clone())?;
        finished.push(empty.finish()?);
    }

    if rows_seen != row_count {
        return Err(PushError::Format(format!(
            "{} holds {} rows but its footer reports {}",
            dataset.path.display(),
            rows_seen,
            row_count
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Writes a Parquet file with one Int64 column holding 0..rows.
    fn write_sequence(dir: &Path, name: &str, rows: i64) -> Dataset {
        let path = dir.join(name);
        let schema = Arc::new(Schema::new(vec![Field::new("seq", DataType::Int64, false)]));
        let mut writer = AtomicParquetWriter::new(&path, schema.clone()).unwrap();
        // Several small batches so parts straddle batch boundaries.
        let mut start = 0;
        while start < rows {
            let end = (start + 7).min(rows);
            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(Int64Array::from((start..end).collect::<Vec<_>>()))],
            )
            .unwrap();
            writer.write(&batch).unwrap();
            start = end;
        }
        writer.finish().unwrap();
        Dataset::open(&path).unwrap()
    }

    fn read_sequence(path: &Path) -> Vec<i64> {
        let file = File::open(path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let mut values = Vec::new();
        for batch in reader {
            let batch = batch.unwrap();
            let column = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap();
            values.extend((0..column.len()).map(|i| column.value(i)));
        }
        values
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Partition Arithmetic
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn partition_of_reference_row_count() {
        let sizes = partition_sizes(1_000_007, 10);
        assert_eq!(sizes[..7], [100_001; 7]);
        assert_eq!(sizes[7..], [100_000; 3]);
        assert_eq!(sizes.iter().sum::<usize>(), 1_000_007);
    }

    #[test]
    fn partition_sums_and_balances() {
        for rows in [0usize, 1, 2, 9, 10, 11, 99, 100, 101, 12_345] {
            for count in 1..=12 {
                let sizes = partition_sizes(rows, count);
                assert_eq!(sizes.len(), count);
                assert_eq!(sizes.iter().sum::<usize>(), rows);
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1, "rows={} count={} sizes={:?}", rows, count, sizes);
            }
        }
    }

    #[test]
    fn fewer_rows_than_parts_leaves_trailing_empty_groups() {
        assert_eq!(partition_sizes(3, 5), vec![1, 1, 1, 0, 0]);
    }

    #[test]
    fn part_names_are_one_based() {
        assert_eq!(part_file_name("sales", 1), "sales_part_1.parquet");
        assert_eq!(part_file_name("sales", 10), "sales_part_10.parquet");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // File Splitting
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn split_preserves_order_and_counts() {
        let source_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let dataset = write_sequence(source_dir.path(), "sales.parquet", 103);

        let parts = split_dataset(&dataset, 10, out_dir.path()).await.unwrap();

        assert_eq!(parts.len(), 10);
        let rows: Vec<u64> = parts.iter().map(|p| p.row_count).collect();
        assert_eq!(rows, vec![11, 11, 11, 10, 10, 10, 10, 10, 10, 10]);

        let names: Vec<String> = parts.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(names[0], "sales_part_1.parquet");
        assert_eq!(names[9], "sales_part_10.parquet");

        let concatenated: Vec<i64> = parts.iter().flat_map(|p| read_sequence(&p.path)).collect();
        assert_eq!(concatenated, (0..103).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn split_keeps_source_file() {
        let dir = TempDir::new().unwrap();
        let dataset = write_sequence(dir.path(), "data.parquet", 20);

        split_dataset(&dataset, 3, dir.path()).await.unwrap();

        assert!(dataset.path.exists());
        assert_eq!(Dataset::open(&dataset.path).unwrap().row_count, 20);
    }

    #[tokio::test]
    async fn empty_groups_become_zero_row_files() {
        let source_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let dataset = write_sequence(source_dir.path(), "tiny.parquet", 2);

        let parts = split_dataset(&dataset, 4, out_dir.path()).await.unwrap();

        let rows: Vec<u64> = parts.iter().map(|p| p.row_count).collect();
        assert_eq!(rows, vec![1, 1, 0, 0]);
        for part in &parts {
            assert!(part.path.exists());
        }
    }

    #[tokio::test]
    async fn zero_row_source_yields_count_empty_parts() {
        let source_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let dataset = write_sequence(source_dir.path(), "none.parquet", 0);

        let parts = split_dataset(&dataset, 3, out_dir.path()).await.unwrap();

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.row_count == 0));
    }

    #[tokio::test]
    async fn count_of_one_copies_all_rows() {
        let source_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let dataset = write_sequence(source_dir.path(), "one.parquet", 15);

        let parts = split_dataset(&dataset, 1, out_dir.path()).await.unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(read_sequence(&parts[0].path), (0..15).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn zero_count_is_rejected() {
        let dir = TempDir::new().unwrap();
        let dataset = write_sequence(dir.path(), "data.parquet", 5);

        let result = split_dataset(&dataset, 0, dir.path()).await;
        assert!(matches!(result, Err(PushError::Configuration(_))));
    }

    #[tokio::test]
    async fn non_parquet_source_leaves_no_parts() {
        let source_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let path = source_dir.path().join("broken.parquet");
        std::fs::write(&path, b"not parquet").unwrap();
        let dataset = Dataset {
            path,
            row_count: 10,
            byte_size: 11,
        };

        let result = split_dataset(&dataset, 2, out_dir.path()).await;
        assert!(matches!(result, Err(PushError::Format(_))));
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }
}
