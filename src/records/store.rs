use async_trait::async_trait;
use thiserror::Error;
use time::{Date, OffsetDateTime};

use super::types::{Facility, ImageRecord, Meal, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store request failed: {0}")]
    Write(#[source] anyhow::Error),
}

impl StoreError {
    pub(crate) fn write(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Write(err.into())
    }
}

/// CRUD-lite over the hierarchical document store. All writes are
/// single-document; there are no multi-document transactions, so callers
/// performing multi-step updates must tolerate `NotFound` from a racing
/// lookup (the orchestrator retries meal attachment for exactly this
/// reason).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_facility(&self, name: &str) -> Result<String, StoreError>;

    /// Registers a user and assigns its facility-local sequence number.
    async fn create_user(&self, name: &str, facility_id: &str) -> Result<String, StoreError>;

    async fn create_image_record(&self, user_id: &str, url: &str) -> Result<String, StoreError>;

    /// Attaches analyzed meals to an existing image record, keyed by the
    /// unique image id. Fails with [`StoreError::NotFound`] when the record
    /// has not propagated yet.
    async fn attach_meals(
        &self,
        user_id: &str,
        image_id: &str,
        meals: &[Meal],
    ) -> Result<(), StoreError>;

    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError>;

    async fn list_users(&self, facility_id: &str) -> Result<Vec<User>, StoreError>;

    async fn list_images(&self, user_id: &str) -> Result<Vec<ImageRecord>, StoreError>;

    /// Images submitted on the given UTC calendar day.
    async fn images_on_date(
        &self,
        user_id: &str,
        date: Date,
    ) -> Result<Vec<ImageRecord>, StoreError> {
        let images = self.list_images(user_id).await?;
        Ok(images
            .into_iter()
            .filter(|img| utc_date_of(img.submitted_at_ms) == Some(date))
            .collect())
    }
}

fn utc_date_of(millis: i64) -> Option<Date> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .map(|t| t.date())
}
