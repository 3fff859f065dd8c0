//! DMAP API mirroring: pulling CUBIC DMAP dataset endpoints into their
//! corresponding warehouse tables on a `last_updated` watermark.

pub mod client;
pub mod loader;
pub mod tables;

pub use client::{ApiResult, apikey_from_environment, download_from_url, get_api_results};
pub use loader::run_api_copy;
pub use tables::{DATASET_TABLES, DatasetTable, job_urls};
