//! ODS QLIK CDC ingestion: discovering snapshot/CDC files in the archive
//! bucket, loading the initial snapshot, then continuously merging and
//! applying CDC batches against a Postgres fact/history table pair.

pub mod batch;
pub mod controller;
pub mod dfm;
pub mod discover;
pub mod snapshot;
pub mod tables;
pub mod types;

pub use controller::run_table_etl;
pub use tables::CUBIC_ODS_TABLES;
pub use types::{CDC_COLUMNS, ColumnSpec, DfmDetails, MERGED_FNAME, TableStatus};
