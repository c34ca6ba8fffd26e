//! Columnar artifacts: conversion, inspection, size policy and splitting.

pub mod atomic_writer;
pub mod convert;
pub mod dataset;
pub mod size_policy;
pub mod splitter;

pub use atomic_writer::AtomicParquetWriter;
pub use convert::{convert_to_parquet, ConvertedArtifact, SourceFormat};
pub use dataset::Dataset;
pub use size_policy::{ChunkingDecision, SizePolicy};
pub use splitter::{partition_sizes, split_dataset};
