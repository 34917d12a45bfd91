use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::pipeline::{Orchestrator, PipelineOptions, PreprocessOptions};
use crate::records::{RecordStore, RtdbStore};
use crate::storage::{BlobStore, S3Blobs};
use crate::vision::{OpenAiVision, VisionClient};

/// Explicitly constructed client bundle; no process-wide singletons. Pass
/// clones of the `Arc`s (or test doubles) wherever a collaborator is needed.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub vision: Arc<dyn VisionClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let blobs = Arc::new(
            S3Blobs::new(
                &config.blobs.endpoint,
                &config.blobs.bucket,
                &config.blobs.access_key,
                &config.blobs.secret_key,
                &config.blobs.region,
            )
            .await?,
        ) as Arc<dyn BlobStore>;

        let store = Arc::new(RtdbStore::new(
            config.store.base_url.clone(),
            config.store.auth_token.clone(),
        )) as Arc<dyn RecordStore>;

        let vision = Arc::new(OpenAiVision::new(
            config.vision.api_key.clone(),
            config.vision.base_url.clone(),
            config.vision.model.clone(),
            config.vision.max_tokens,
            Duration::from_secs(config.vision.timeout_secs),
        )?) as Arc<dyn VisionClient>;

        Ok(Self {
            config,
            store,
            blobs,
            vision,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        vision: Arc<dyn VisionClient>,
    ) -> Self {
        Self {
            config,
            store,
            blobs,
            vision,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            Arc::clone(&self.vision),
            PipelineOptions {
                preprocess: PreprocessOptions {
                    target_width: self.config.target_width,
                    jpeg_quality: self.config.jpeg_quality,
                },
                url_ttl_secs: self.config.blobs.url_ttl_secs,
                attach_retries: self.config.attach_retries,
                ..PipelineOptions::default()
            },
        )
    }
}
