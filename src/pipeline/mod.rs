//! Capture-to-result pipeline. One orchestrator drives, per captured image:
//! preprocess -> upload -> image record -> vision call -> extraction -> meal
//! attach. Images in a batch run as independent tasks; the batch settles only
//! once every task has reported success or failure.

pub mod extract;
pub mod preprocess;

use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::records::{Meal, RecordStore, StoreError};
use crate::storage::{upload_image, BlobStore, UploadError};
use crate::vision::{VisionClient, VisionError};
pub use extract::{extract_meals, ExtractError};
pub use preprocess::{preprocess, PreprocessError, PreprocessOptions};

/// Terminal failure of one image's chain. Variants mirror the step that
/// produced them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid image")]
    InvalidImage(#[from] PreprocessError),
    #[error("upload failed")]
    Upload(#[from] UploadError),
    #[error("vision analysis failed")]
    Vision(#[from] VisionError),
    #[error("meal extraction failed")]
    Extract(#[from] ExtractError),
    #[error("record store failed")]
    Store(#[from] StoreError),
    #[error("pipeline task failed")]
    Task(#[source] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub preprocess: PreprocessOptions,
    /// Lifetime of resolved blob URLs.
    pub url_ttl_secs: u64,
    /// Attempts for the meal-attach write, the only retried step: it races
    /// against store propagation of the freshly created image record.
    pub attach_retries: u32,
    pub attach_backoff: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preprocess: PreprocessOptions::default(),
            url_ttl_secs: 7 * 24 * 3600,
            attach_retries: 3,
            attach_backoff: Duration::from_millis(200),
        }
    }
}

/// Per-image result. Fields fill in as the chain progresses, so a failed
/// image still reports how far it got (an uploaded record without meals is
/// reviewable later).
#[derive(Debug)]
pub struct ImageOutcome {
    pub index: usize,
    pub image_id: Option<String>,
    pub image_url: Option<String>,
    pub meals_attached: usize,
    pub error: Option<PipelineError>,
}

impl ImageOutcome {
    fn pending(index: usize) -> Self {
        Self {
            index,
            image_id: None,
            image_url: None,
            meals_attached: 0,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ImageOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Aggregate message for the UI layer; `None` when everything succeeded.
    pub fn error_summary(&self) -> Option<String> {
        if self.failed() == 0 {
            return None;
        }
        let details: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| {
                o.error
                    .as_ref()
                    .map(|e| format!("image {}: {}", o.index, e))
            })
            .collect();
        Some(format!(
            "{} of {} images failed ({})",
            self.failed(),
            self.outcomes.len(),
            details.join("; ")
        ))
    }
}

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    vision: Arc<dyn VisionClient>,
    opts: PipelineOptions,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        vision: Arc<dyn VisionClient>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            store,
            blobs,
            vision,
            opts,
        }
    }

    /// Runs the full chain for every image concurrently and waits for all of
    /// them to settle. One image's failure never aborts its siblings.
    pub async fn process_batch(&self, user_id: &str, images: Vec<Bytes>) -> BatchReport {
        let mut tasks = JoinSet::new();
        for (index, raw) in images.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let blobs = Arc::clone(&self.blobs);
            let vision = Arc::clone(&self.vision);
            let opts = self.opts.clone();
            let user_id = user_id.to_string();
            tasks.spawn(async move {
                process_image(index, raw, &user_id, store, blobs, vision, opts).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(error = %err, "image task aborted"),
            }
        }
        outcomes.sort_by_key(|o| o.index);

        let report = BatchReport { outcomes };
        debug!(
            user_id,
            ok = report.succeeded(),
            failed = report.failed(),
            "batch settled"
        );
        report
    }
}

async fn process_image(
    index: usize,
    raw: Bytes,
    user_id: &str,
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    vision: Arc<dyn VisionClient>,
    opts: PipelineOptions,
) -> ImageOutcome {
    let mut outcome = ImageOutcome::pending(index);
    if let Err(err) = run_chain(&mut outcome, raw, user_id, &*store, &*blobs, &*vision, &opts).await
    {
        warn!(index, user_id, error = %err, "image pipeline failed");
        outcome.error = Some(err);
    }
    outcome
}

async fn run_chain(
    outcome: &mut ImageOutcome,
    raw: Bytes,
    user_id: &str,
    store: &dyn RecordStore,
    blobs: &dyn BlobStore,
    vision: &dyn VisionClient,
    opts: &PipelineOptions,
) -> Result<(), PipelineError> {
    let popts = opts.preprocess;
    let processed = tokio::task::spawn_blocking(move || preprocess(&raw, popts))
        .await
        .map_err(PipelineError::Task)??;

    let url = upload_image(blobs, processed, opts.url_ttl_secs).await?;
    outcome.image_url = Some(url.clone());

    let image_id = store.create_image_record(user_id, &url).await?;
    outcome.image_id = Some(image_id.clone());

    let reply = vision.analyze(&url).await?;
    let meals = extract_meals(&reply)?;

    attach_with_retry(
        store,
        user_id,
        &image_id,
        &meals,
        opts.attach_retries,
        opts.attach_backoff,
    )
    .await?;
    outcome.meals_attached = meals.len();
    Ok(())
}

/// Bounded retry with doubling backoff and a little jitter. Only the attach
/// write gets this treatment; every other step fails fast.
async fn attach_with_retry(
    store: &dyn RecordStore,
    user_id: &str,
    image_id: &str,
    meals: &[Meal],
    attempts: u32,
    base_backoff: Duration,
) -> Result<(), StoreError> {
    let mut delay = base_backoff;
    let mut tries = 0;
    loop {
        match store.attach_meals(user_id, image_id, meals).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tries += 1;
                if tries >= attempts.max(1) {
                    return Err(err);
                }
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
                warn!(image_id, tries, error = %err, "attach_meals failed, retrying");
                tokio::time::sleep(delay + jitter).await;
                delay *= 2;
            }
        }
    }
}
