#![warn(clippy::all)]

//! Object storage adapter for the ODS loader.
//!
//! Everything upstream (status store, CDC batch engine, DMAP loader) talks
//! to object storage exclusively through [`S3Client`]; no caller touches
//! `aws-sdk-s3` directly.

mod client;
mod error;
mod location;

pub use client::S3Client;
pub use error::{S3Error, S3Result};
pub use location::{InvalidBucketName, S3Location, validate_bucket_name};
