//! In-process record store. Backs tests and embedded use; unlike the REST
//! backend it assigns user sequence numbers atomically under a single lock,
//! so concurrent registrations never collide.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::store::{RecordStore, StoreError};
use super::types::{now_millis, Facility, ImageRecord, Meal, User};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    facilities: BTreeMap<String, Facility>,
    users: BTreeMap<String, User>,
    // user_id -> image_id -> record
    images: BTreeMap<String, BTreeMap<String, ImageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only happens after a panic in another test thread.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_facility(&self, name: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.lock();
        inner.facilities.insert(
            id.clone(),
            Facility {
                id: id.clone(),
                name: name.to_string(),
                submitted_at_ms: now_millis(),
            },
        );
        Ok(id)
    }

    async fn create_user(&self, name: &str, facility_id: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.lock();
        // Count and insert under one lock: sequence numbers stay unique.
        let number = inner
            .users
            .values()
            .filter(|u| u.facility_id == facility_id)
            .count()
            + 1;
        inner.users.insert(
            id.clone(),
            User {
                id: id.clone(),
                name: name.to_string(),
                number: number.to_string(),
                facility_id: facility_id.to_string(),
                submitted_at_ms: now_millis(),
            },
        );
        Ok(id)
    }

    async fn create_image_record(&self, user_id: &str, url: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.lock();
        inner.images.entry(user_id.to_string()).or_default().insert(
            id.clone(),
            ImageRecord {
                id: id.clone(),
                url: url.to_string(),
                submitted_at_ms: now_millis(),
                meals: None,
            },
        );
        Ok(id)
    }

    async fn attach_meals(
        &self,
        user_id: &str,
        image_id: &str,
        meals: &[Meal],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .images
            .get_mut(user_id)
            .and_then(|imgs| imgs.get_mut(image_id))
            .ok_or(StoreError::NotFound)?;
        record.meals = Some(meals.to_vec());
        Ok(())
    }

    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        Ok(self.lock().facilities.values().cloned().collect())
    }

    async fn list_users(&self, facility_id: &str) -> Result<Vec<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .filter(|u| u.facility_id == facility_id)
            .cloned()
            .collect())
    }

    async fn list_images(&self, user_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        Ok(self
            .lock()
            .images
            .get(user_id)
            .map(|imgs| imgs.values().cloned().collect())
            .unwrap_or_default())
    }
}
