use std::fmt;

use crate::error::S3Error;

/// `s3://bucket/key`, `s3a://bucket/key` and bare `bucket/key` all resolve to
/// the same location.
const CUSTOM_SCHEMES: [&str; 2] = ["s3a", "s3n"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Location {
    bucket: String,
    key: String,
}

impl S3Location {
    pub fn parse(input: &str) -> Result<Self, S3Error> {
        let trimmed = input
            .strip_prefix("s3://")
            .or_else(|| {
                CUSTOM_SCHEMES
                    .iter()
                    .find_map(|scheme| input.strip_prefix(&format!("{scheme}://")))
            })
            .unwrap_or(input);

        let (bucket, key) = trimmed
            .split_once('/')
            .ok_or_else(|| S3Error::InvalidLocation(input.to_string()))?;

        if bucket.is_empty() || key.is_empty() {
            return Err(S3Error::InvalidLocation(input.to_string()));
        }

        validate_bucket_name(bucket).map_err(|reason| {
            S3Error::InvalidBucketName(bucket.to_string(), reason.to_string())
        })?;

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `bucket/key`, the form `copy_object`'s `CopySource` parameter expects.
    pub fn copy_source(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidBucketName {
    #[error("bucket name must be between 3 and 63 characters, got {0}")]
    InvalidLength(usize),
    #[error("bucket name must contain only lowercase letters, digits, dots and hyphens")]
    InvalidCharacters,
}

/// Enforces the subset of S3's bucket naming rules relevant to catching
/// obvious configuration typos early rather than failing deep in a batch.
pub fn validate_bucket_name(bucket: &str) -> Result<(), InvalidBucketName> {
    if bucket.len() < 3 || bucket.len() > 63 {
        return Err(InvalidBucketName::InvalidLength(bucket.len()));
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(InvalidBucketName::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s3_scheme() {
        let loc = S3Location::parse("s3://my-bucket/path/to/obj.csv.gz").unwrap();
        assert_eq!(loc.bucket(), "my-bucket");
        assert_eq!(loc.key(), "path/to/obj.csv.gz");
    }

    #[test]
    fn parses_bare_form() {
        let loc = S3Location::parse("my-bucket/path/to/obj.csv.gz").unwrap();
        assert_eq!(loc.bucket(), "my-bucket");
        assert_eq!(loc.key(), "path/to/obj.csv.gz");
    }

    #[test]
    fn parses_custom_scheme() {
        let loc = S3Location::parse("s3a://my-bucket/key").unwrap();
        assert_eq!(loc.bucket(), "my-bucket");
    }

    #[test]
    fn rejects_missing_key() {
        assert!(S3Location::parse("s3://my-bucket").is_err());
    }

    #[test]
    fn rejects_bad_bucket_name() {
        assert!(S3Location::parse("s3://AB/key").is_err());
    }
}
