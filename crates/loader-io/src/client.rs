use std::sync::{Arc, LazyLock};

use aws_config::timeout::TimeoutConfig;
use aws_smithy_async::rt::sleep::{self, SharedAsyncSleep, TokioSleep};
use aws_smithy_async::time::SharedTimeSource;
use aws_smithy_runtime_api::client::http::SharedHttpClient;
use aws_smithy_runtime_api::client::identity::{IdentityCache, SharedIdentityCache};
use aws_smithy_types::retry::RetryConfig;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::error::{S3Error, S3Result};
use crate::location::S3Location;

static IDENTITY_CACHE: LazyLock<SharedIdentityCache> =
    LazyLock::new(|| IdentityCache::lazy().build());

static SMITHY_HTTP_CLIENT: LazyLock<SharedHttpClient> = LazyLock::new(|| {
    aws_smithy_http_client::Builder::new()
        .tls_provider(aws_smithy_http_client::tls::Provider::Rustls(
            aws_smithy_http_client::tls::rustls_provider::CryptoMode::AwsLc,
        ))
        .build_https()
});

static RETRY_CONFIG: LazyLock<RetryConfig> = LazyLock::new(RetryConfig::adaptive);
static TIMEOUT_CONFIG: LazyLock<TimeoutConfig> = LazyLock::new(|| TimeoutConfig::builder().build());
static TIME_SOURCE: LazyLock<SharedTimeSource> = LazyLock::new(SharedTimeSource::default);
static TOKIO_SLEEP: LazyLock<Arc<dyn sleep::AsyncSleep>> =
    LazyLock::new(|| Arc::new(TokioSleep::new()) as Arc<dyn sleep::AsyncSleep>);
static SLEEP_IMPL: LazyLock<SharedAsyncSleep> =
    LazyLock::new(|| SharedAsyncSleep::from(TOKIO_SLEEP.clone()));


/// Thin async-object-storage facade over `aws-sdk-s3`.
///
/// Every operation takes either an [`S3Location`] or a raw `s3://bucket/key`
/// style string (parsed internally) so callers never have to juggle bucket
/// and key separately.
#[derive(Clone)]
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .http_client(SMITHY_HTTP_CLIENT.clone())
            .retry_config(RETRY_CONFIG.clone())
            .timeout_config(TIMEOUT_CONFIG.clone())
            .time_source(TIME_SOURCE.clone())
            .sleep_impl(SLEEP_IMPL.clone())
            .identity_cache(IDENTITY_CACHE.clone())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(false)
            .build();

        Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        }
    }

    fn parse(raw: &str) -> S3Result<S3Location> {
        S3Location::parse(raw)
    }

    /// Lists every object under `prefix`, transparently following
    /// continuation tokens. Zero-byte objects (folder markers) are skipped.
    /// When `in_filter` is set, only keys containing that substring survive.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        in_filter: Option<&str>,
    ) -> S3Result<Vec<S3Location>> {
        let mut out = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self
                .inner
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix);
            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }

            let page = req.send().await.map_err(|e| S3Error::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                if obj.size().unwrap_or(0) == 0 {
                    continue;
                }
                if let Some(filter) = in_filter {
                    if !key.contains(filter) {
                        continue;
                    }
                }
                out.push(S3Location::new(bucket, key));
            }

            continuation_token = page.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, location: &str) -> S3Result<bool> {
        let loc = Self::parse(location)?;
        match self
            .inner
            .head_object()
            .bucket(loc.bucket())
            .key(loc.key())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(S3Error::Head {
                        location: loc.to_string(),
                        source: Box::new(err),
                    })
                }
            }
        }
    }

    /// Returns the full object body. Prefer [`Self::download`] for large
    /// files destined for disk.
    #[instrument(skip(self))]
    pub async fn get(&self, location: &str) -> S3Result<Vec<u8>> {
        let loc = Self::parse(location)?;
        let out = self
            .inner
            .get_object()
            .bucket(loc.bucket())
            .key(loc.key())
            .send()
            .await
            .map_err(|e| S3Error::Get {
                location: loc.to_string(),
                source: Box::new(e),
            })?;

        let bytes = out.body.collect().await.map_err(|e| S3Error::Get {
            location: loc.to_string(),
            source: Box::new(e),
        })?;
        Ok(bytes.into_bytes().to_vec())
    }

    /// Downloads `location` to `local_path`, overwriting any existing file.
    #[instrument(skip(self))]
    pub async fn download(&self, location: &str, local_path: &std::path::Path) -> S3Result<()> {
        if local_path.exists() {
            tokio::fs::remove_file(local_path)
                .await
                .map_err(|e| S3Error::Io {
                    path: local_path.display().to_string(),
                    source: e,
                })?;
        }

        let loc = Self::parse(location)?;
        let out = self
            .inner
            .get_object()
            .bucket(loc.bucket())
            .key(loc.key())
            .send()
            .await
            .map_err(|e| S3Error::Get {
                location: loc.to_string(),
                source: Box::new(e),
            })?;

        let bytes = out.body.collect().await.map_err(|e| S3Error::Get {
            location: loc.to_string(),
            source: Box::new(e),
        })?;

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| S3Error::Io {
                path: local_path.display().to_string(),
                source: e,
            })?;
        file.write_all(&bytes.into_bytes())
            .await
            .map_err(|e| S3Error::Io {
                path: local_path.display().to_string(),
                source: e,
            })?;
        Ok(())
    }

    /// Uploads a local file to `location`.
    #[instrument(skip(self))]
    pub async fn put(&self, local_path: &std::path::Path, location: &str) -> S3Result<()> {
        let loc = Self::parse(location)?;
        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path)
            .await
            .map_err(|e| S3Error::Io {
                path: local_path.display().to_string(),
                source: std::io::Error::other(e),
            })?;

        self.inner
            .put_object()
            .bucket(loc.bucket())
            .key(loc.key())
            .body(body)
            .send()
            .await
            .map_err(|e| S3Error::Put {
                location: loc.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Uploads raw bytes to `location`, used by the status store for its
    /// small JSON documents where round-tripping through a temp file would
    /// be wasted effort.
    #[instrument(skip(self, body))]
    pub async fn put_bytes(&self, body: Vec<u8>, location: &str) -> S3Result<()> {
        let loc = Self::parse(location)?;
        self.inner
            .put_object()
            .bucket(loc.bucket())
            .key(loc.key())
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| S3Error::Put {
                location: loc.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, location: &str) -> S3Result<()> {
        let loc = Self::parse(location)?;
        self.inner
            .delete_object()
            .bucket(loc.bucket())
            .key(loc.key())
            .send()
            .await
            .map_err(|e| S3Error::Delete {
                location: loc.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Copy implemented as S3-side `copy_object` then delete of the source,
    /// matching the "rename" semantics the upstream pipeline relies on.
    #[instrument(skip(self))]
    pub async fn copy(&self, source: &str, dest: &str) -> S3Result<()> {
        let src = Self::parse(source)?;
        let dst = Self::parse(dest)?;

        self.inner
            .copy_object()
            .bucket(dst.bucket())
            .key(dst.key())
            .copy_source(src.copy_source())
            .send()
            .await
            .map_err(|e| S3Error::Copy {
                source_location: src.to_string(),
                dest_location: dst.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Copy-then-delete, used when the caller wants a move rather than a
    /// duplication.
    pub async fn rename(&self, source: &str, dest: &str) -> S3Result<()> {
        self.copy(source, dest).await?;
        self.delete(source).await
    }
}
