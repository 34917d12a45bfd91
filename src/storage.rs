use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Upload failure, with the failing phase kept for diagnosis. Callers treat
/// both phases as one kind; logs distinguish them.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("blob write failed")]
    Put(#[source] anyhow::Error),
    #[error("blob url resolution failed")]
    ResolveUrl(#[source] anyhow::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn resolve_url(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

/// Uploads one processed JPEG under a fresh random key and resolves its
/// durable fetch URL.
pub async fn upload_image(
    blobs: &dyn BlobStore,
    body: Bytes,
    url_ttl_secs: u64,
) -> Result<String, UploadError> {
    let key = format!("images/{}.jpg", Uuid::new_v4());
    blobs
        .put_object(&key, body, "image/jpeg")
        .await
        .map_err(UploadError::Put)?;
    let url = blobs
        .resolve_url(&key, url_ttl_secs)
        .await
        .map_err(UploadError::ResolveUrl)?;
    debug!(%key, "image uploaded");
    Ok(url)
}

#[derive(Clone)]
pub struct S3Blobs {
    client: Client,
    bucket: String,
}

impl S3Blobs {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3Blobs {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn resolve_url(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(seconds),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }
}
