use thiserror::Error;

/// Errors surfaced by the object-store adapter.
///
/// Every variant maps onto the `ObjectStoreUnavailable` entry of the error
/// taxonomy; callers that need finer-grained recovery (auth rejection,
/// transient transport) match on the inner `aws_sdk_s3` error via `source()`.
#[derive(Debug, Error)]
pub enum S3Error {
    #[error("invalid object location `{0}`")]
    InvalidLocation(String),

    #[error("invalid bucket name `{0}`: {1}")]
    InvalidBucketName(String, String),

    #[error("list objects failed for s3://{bucket}/{prefix}: {source}")]
    List {
        bucket: String,
        prefix: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("head object failed for {location}: {source}")]
    Head {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("get object failed for {location}: {source}")]
    Get {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("put object failed for {location}: {source}")]
    Put {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("copy object failed from {source_location} to {dest_location}: {source}")]
    Copy {
        source_location: String,
        dest_location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("delete object failed for {location}: {source}")]
    Delete {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("local filesystem error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type S3Result<T> = Result<T, S3Error>;
