//! Tabular file → Parquet conversion.
//!
//! Delimited text is read twice: once to infer column types and count rows,
//! once to build Arrow batches. Neither pass holds more than one batch of
//! rows in memory. Spreadsheets are loaded whole (first worksheet only) and
//! go through the same inference and batching on their cell text.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use calamine::{open_workbook_auto, Data, Reader as _};
use csv::{Reader, ReaderBuilder, StringRecord};
use tracing::info;

use crate::columnar::atomic_writer::AtomicParquetWriter;
use crate::columnar::dataset::Dataset;
use crate::error::PushError;

/// Rows per Arrow batch written to the Parquet file.
const WRITE_BATCH_ROWS: usize = 8192;

// ─────────────────────────────────────────────────────────────────────────────
// Source Format
// ─────────────────────────────────────────────────────────────────────────────

/// Formats accepted as conversion input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Comma-separated (`.csv`).
    Csv,
    /// Tab-separated (`.tsv`, `.txt`).
    Tsv,
    /// Excel workbook (`.xls`, `.xlsx`); the first worksheet is converted.
    Spreadsheet,
}

impl SourceFormat {
    /// Picks the format from the file extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `PushError::Format` for unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, PushError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "tsv" | "txt" => Ok(SourceFormat::Tsv),
            "xls" | "xlsx" => Ok(SourceFormat::Spreadsheet),
            other => Err(PushError::Format(format!(
                "Unsupported file extension: {}",
                if other.is_empty() { "(none)" } else { other }
            ))),
        }
    }

    /// Field separator, `None` for spreadsheets.
    pub fn delimiter(self) -> Option<u8> {
        match self {
            SourceFormat::Csv => Some(b','),
            SourceFormat::Tsv => Some(b'\t'),
            SourceFormat::Spreadsheet => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Type Inference
// ─────────────────────────────────────────────────────────────────────────────

/// Narrowest column type that holds every non-empty value seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredType {
    /// Only empty values seen.
    Empty,
    Int64,
    Float64,
    Boolean,
    Utf8,
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl InferredType {
    fn observe(self, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        let is_int = || value.parse::<i64>().is_ok();
        let is_float = || value.parse::<f64>().is_ok();
        let is_bool = || parse_bool(value).is_some();

        match self {
            InferredType::Empty if is_int() => InferredType::Int64,
            InferredType::Empty if is_float() => InferredType::Float64,
            InferredType::Empty if is_bool() => InferredType::Boolean,
            InferredType::Empty => InferredType::Utf8,
            InferredType::Int64 if is_int() => InferredType::Int64,
            InferredType::Int64 | InferredType::Float64 if is_float() => InferredType::Float64,
            InferredType::Boolean if is_bool() => InferredType::Boolean,
            _ => InferredType::Utf8,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            InferredType::Int64 => DataType::Int64,
            InferredType::Float64 => DataType::Float64,
            InferredType::Boolean => DataType::Boolean,
            InferredType::Empty | InferredType::Utf8 => DataType::Utf8,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column Builders
// ─────────────────────────────────────────────────────────────────────────────

enum ColumnBuilder {
    Int64(Int64Builder),
    Float64(Float64Builder),
    Boolean(BooleanBuilder),
    Utf8(StringBuilder),
}

impl ColumnBuilder {
    fn for_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int64 => ColumnBuilder::Int64(Int64Builder::new()),
            DataType::Float64 => ColumnBuilder::Float64(Float64Builder::new()),
            DataType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::new()),
            _ => ColumnBuilder::Utf8(StringBuilder::new()),
        }
    }

    fn append(&mut self, value: &str, column: &str) -> Result<(), PushError> {
        let mismatch = || {
            PushError::Format(format!(
                "Value '{}' in column '{}' changed type between reads",
                value, column
            ))
        };

        match self {
            ColumnBuilder::Utf8(b) if value.is_empty() => b.append_null(),
            ColumnBuilder::Utf8(b) => b.append_value(value),
            ColumnBuilder::Int64(b) if value.is_empty() => b.append_null(),
            ColumnBuilder::Int64(b) => b.append_value(value.parse().map_err(|_| mismatch())?),
            ColumnBuilder::Float64(b) if value.is_empty() => b.append_null(),
            ColumnBuilder::Float64(b) => b.append_value(value.parse().map_err(|_| mismatch())?),
            ColumnBuilder::Boolean(b) if value.is_empty() => b.append_null(),
            ColumnBuilder::Boolean(b) => b.append_value(parse_bool(value).ok_or_else(mismatch)?),
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::Float64(b) => Arc::new(b.finish()),
            ColumnBuilder::Boolean(b) => Arc::new(b.finish()),
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Result of converting one source file.
#[derive(Debug, Clone)]
pub struct ConvertedArtifact {
    pub dataset: Dataset,
    /// Parquet file name, used as the push target name.
    pub file_name: String,
}

/// Output path for `source` inside `out_dir`: `<stem>.parquet`.
pub fn parquet_path_for(source: &Path, out_dir: &Path) -> Result<PathBuf, PushError> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PushError::Io(format!("No file name in path: {}", source.display())))?;
    Ok(out_dir.join(format!("{}.parquet", stem)))
}

/// Converts a delimited text file or spreadsheet to `<stem>.parquet` in
/// `out_dir`.
///
/// # Errors
///
/// - `PushError::Format` - unsupported extension, missing header, ragged
///   rows, invalid UTF-8 or an unreadable workbook
/// - `PushError::Io` - the source cannot be read or the output written
pub async fn convert_to_parquet(
    source: &Path,
    out_dir: &Path,
) -> Result<ConvertedArtifact, PushError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| PushError::Io(format!("Failed to create upload directory: {}", e)))?;

    let source = source.to_owned();
    let out_dir = out_dir.to_owned();

    tokio::task::spawn_blocking(move || convert_to_parquet_blocking(&source, &out_dir))
        .await
        .map_err(|e| PushError::Internal(format!("Task join error: {}", e)))?
}

/// Blocking implementation of [`convert_to_parquet`].
pub fn convert_to_parquet_blocking(
    source: &Path,
    out_dir: &Path,
) -> Result<ConvertedArtifact, PushError> {
    let format = SourceFormat::from_path(source)?;
    let output = parquet_path_for(source, out_dir)?;

    match format.delimiter() {
        Some(delimiter) => convert_delimited(source, delimiter, &output)?,
        None => convert_spreadsheet(source, &output)?,
    }

    let dataset = Dataset::open(&output)?;
    let file_name = dataset.file_name()?;

    Ok(ConvertedArtifact { dataset, file_name })
}

fn log_conversion(source: &Path, output: &Path, schema: &SchemaRef, rows: u64) {
    info!(
        "[CONVERT] {} -> {} ({} columns, {} rows)",
        source.display(),
        output.display(),
        schema.fields().len(),
        rows
    );
}

fn missing_header(source: &Path) -> PushError {
    PushError::Format(format!("{} has no header row", source.display()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Inference and Batching
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates column types and the row count over one pass.
struct SchemaTracker {
    names: Vec<String>,
    types: Vec<InferredType>,
    rows: u64,
}

impl SchemaTracker {
    fn new(names: Vec<String>) -> Self {
        let types = vec![InferredType::Empty; names.len()];
        Self {
            names,
            types,
            rows: 0,
        }
    }

    fn observe_row<'a>(&mut self, values: impl IntoIterator<Item = &'a str>) {
        for (slot, value) in self.types.iter_mut().zip(values) {
            *slot = slot.observe(value);
        }
        self.rows += 1;
    }

    fn finish(self) -> (SchemaRef, u64) {
        let fields: Vec<Field> = self
            .names
            .iter()
            .zip(&self.types)
            .map(|(name, t)| Field::new(name, t.data_type(), true))
            .collect();
        (Arc::new(Schema::new(fields)), self.rows)
    }
}

/// Builds Arrow batches of [`WRITE_BATCH_ROWS`] rows and writes them
/// atomically to the output file.
struct BatchWriter {
    schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
    pending: usize,
    writer: AtomicParquetWriter,
}

impl BatchWriter {
    fn new(output: &Path, schema: SchemaRef) -> Result<Self, PushError> {
        let writer = AtomicParquetWriter::new(output, schema.clone())?;
        let builders = Self::builders_for(&schema);
        Ok(Self {
            schema,
            builders,
            pending: 0,
            writer,
        })
    }

    fn builders_for(schema: &SchemaRef) -> Vec<ColumnBuilder> {
        schema
            .fields()
            .iter()
            .map(|f| ColumnBuilder::for_type(f.data_type()))
            .collect()
    }

    fn append_row<'a>(&mut self, values: impl IntoIterator<Item = &'a str>) -> Result<(), PushError> {
        for ((builder, field), value) in self
            .builders
            .iter_mut()
            .zip(self.schema.fields().iter())
            .zip(values)
        {
            builder.append(value, field.name())?;
        }
        self.pending += 1;

        if self.pending == WRITE_BATCH_ROWS {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PushError> {
        let columns: Vec<ArrayRef> = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), columns)
            .map_err(|e| PushError::Internal(format!("Failed to assemble batch: {}", e)))?;
        self.writer.write(&batch)?;
        self.builders = Self::builders_for(&self.schema);
        self.pending = 0;
        Ok(())
    }

    fn finish(mut self) -> Result<(), PushError> {
        if self.pending > 0 {
            self.flush()?;
        }
        self.writer.finish()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delimited Text
// ─────────────────────────────────────────────────────────────────────────────

fn convert_delimited(source: &Path, delimiter: u8, output: &Path) -> Result<(), PushError> {
    let (schema, rows) = infer_delimited(source, delimiter)?;
    log_conversion(source, output, &schema, rows);

    let mut reader = open_reader(source, delimiter)?;
    let mut batches = BatchWriter::new(output, schema)?;
    let mut record = StringRecord::new();

    while reader.read_record(&mut record).map_err(read_error)? {
        batches.append_row(record.iter())?;
    }

    batches.finish()
}

fn open_reader(source: &Path, delimiter: u8) -> Result<Reader<std::fs::File>, PushError> {
    let file = std::fs::File::open(source)
        .map_err(|e| PushError::Io(format!("Failed to open {}: {}", source.display(), e)))?;
    Ok(ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(file))
}

fn read_error(e: csv::Error) -> PushError {
    if e.is_io_error() {
        PushError::Io(format!("Failed to read source: {}", e))
    } else {
        PushError::Format(format!("Failed to parse source: {}", e))
    }
}

/// First pass: header, column types and row count.
fn infer_delimited(source: &Path, delimiter: u8) -> Result<(SchemaRef, u64), PushError> {
    let mut reader = open_reader(source, delimiter)?;
    let headers = reader.headers().map_err(read_error)?.clone();

    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(missing_header(source));
    }

    let mut tracker = SchemaTracker::new(headers.iter().map(str::to_string).collect());
    let mut record = StringRecord::new();

    while reader.read_record(&mut record).map_err(read_error)? {
        tracker.observe_row(record.iter());
    }

    Ok(tracker.finish())
}

// ─────────────────────────────────────────────────────────────────────────────
// Spreadsheets
// ─────────────────────────────────────────────────────────────────────────────

/// Text of one spreadsheet cell, as the delimited path would have read it.
/// Whole-number floats print without a fraction, so they infer as Int64.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Reads the first worksheet as rows of cell text, header row first.
fn read_first_sheet(source: &Path) -> Result<Vec<Vec<String>>, PushError> {
    std::fs::metadata(source)
        .map_err(|e| PushError::Io(format!("Failed to open {}: {}", source.display(), e)))?;

    let mut workbook = open_workbook_auto(source).map_err(|e| {
        PushError::Format(format!("Failed to open workbook {}: {}", source.display(), e))
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PushError::Format(format!("{} has no worksheets", source.display())))?
        .map_err(|e| PushError::Format(format!("Failed to read first worksheet: {}", e)))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn convert_spreadsheet(source: &Path, output: &Path) -> Result<(), PushError> {
    let rows = read_first_sheet(source)?;
    let (header, body) = rows.split_first().ok_or_else(|| missing_header(source))?;
    if header.iter().all(String::is_empty) {
        return Err(missing_header(source));
    }

    let mut tracker = SchemaTracker::new(header.clone());
    for row in body {
        tracker.observe_row(row.iter().map(String::as_str));
    }
    let (schema, row_count) = tracker.finish();
    log_conversion(source, output, &schema, row_count);

    let mut batches = BatchWriter::new(output, schema)?;
    for row in body {
        batches.append_row(row.iter().map(String::as_str))?;
    }
    batches.finish()
}
