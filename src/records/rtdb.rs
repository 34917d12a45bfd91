//! Document store client for a Firebase-RTDB-style REST backend.
//!
//! Documents live under `facilities/{id}`, `users/{id}` and
//! `users/{id}/images/{id}`; every node is addressed as `{base}/{path}.json`.
//! Timestamps are written with the server-value placeholder and read back as
//! unix milliseconds.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use super::store::{RecordStore, StoreError};
use super::types::{Facility, ImageRecord, Meal, User};

const SERVER_TIMESTAMP: &str = "timestamp";

pub struct RtdbStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Deserialize)]
struct FacilityDoc {
    facility_name: String,
    submitted_at: i64,
}

#[derive(Deserialize)]
struct UserDoc {
    user_name: String,
    user_number: String,
    facility_id: String,
    submitted_at: i64,
}

#[derive(Deserialize)]
struct ImageDoc {
    image_url: String,
    submitted_at: i64,
    meals: Option<Vec<Meal>>,
}

impl RtdbStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    fn auth_query(&self) -> Vec<(&'static str, String)> {
        self.auth_token
            .as_ref()
            .map(|t| vec![("auth", t.clone())])
            .unwrap_or_default()
    }

    async fn put_value(&self, path: &str, body: &Value) -> Result<(), StoreError> {
        let resp = self
            .client
            .put(self.endpoint(path))
            .query(&self.auth_query())
            .json(body)
            .send()
            .await
            .map_err(StoreError::write)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Write(anyhow!("put {path}: {status}")));
        }
        debug!(path, "document written");
        Ok(())
    }

    /// Reads a node; an absent node comes back as `Value::Null`.
    async fn get_value(&self, path: &str) -> Result<Value, StoreError> {
        let resp = self
            .client
            .get(self.endpoint(path))
            .query(&self.auth_query())
            .send()
            .await
            .map_err(StoreError::write)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Write(anyhow!("get {path}: {status}")));
        }
        resp.json().await.map_err(StoreError::write)
    }

    /// Users filtered server-side on the `facility_id` index.
    async fn users_of_facility(
        &self,
        facility_id: &str,
    ) -> Result<BTreeMap<String, UserDoc>, StoreError> {
        let mut query = self.auth_query();
        query.push(("orderBy", "\"facility_id\"".to_string()));
        query.push(("equalTo", format!("\"{facility_id}\"")));
        let resp = self
            .client
            .get(self.endpoint("users"))
            .query(&query)
            .send()
            .await
            .map_err(StoreError::write)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Write(anyhow!("query users: {status}")));
        }
        let value: Value = resp.json().await.map_err(StoreError::write)?;
        decode_map(value)
    }
}

fn decode_map<T: serde::de::DeserializeOwned>(
    value: Value,
) -> Result<BTreeMap<String, T>, StoreError> {
    if value.is_null() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_value(value).map_err(StoreError::write)
}

#[async_trait]
impl RecordStore for RtdbStore {
    async fn create_facility(&self, name: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let doc = json!({
            "facility_name": name,
            "submitted_at": { ".sv": SERVER_TIMESTAMP },
        });
        self.put_value(&format!("facilities/{id}"), &doc).await?;
        Ok(id)
    }

    async fn create_user(&self, name: &str, facility_id: &str) -> Result<String, StoreError> {
        // Read-count-then-write: two concurrent registrations can observe
        // the same count and get duplicate numbers. The REST API offers no
        // atomic counter, so the number is display-only metadata here.
        let existing = self.users_of_facility(facility_id).await?;
        let number = (existing.len() + 1).to_string();

        let id = Uuid::new_v4().to_string();
        let doc = json!({
            "user_name": name,
            "user_number": number,
            "facility_id": facility_id,
            "submitted_at": { ".sv": SERVER_TIMESTAMP },
        });
        self.put_value(&format!("users/{id}"), &doc).await?;
        Ok(id)
    }

    async fn create_image_record(&self, user_id: &str, url: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let doc = json!({
            "image_url": url,
            "submitted_at": { ".sv": SERVER_TIMESTAMP },
        });
        self.put_value(&format!("users/{user_id}/images/{id}"), &doc)
            .await?;
        Ok(id)
    }

    async fn attach_meals(
        &self,
        user_id: &str,
        image_id: &str,
        meals: &[Meal],
    ) -> Result<(), StoreError> {
        let path = format!("users/{user_id}/images/{image_id}");
        if self.get_value(&path).await?.is_null() {
            return Err(StoreError::NotFound);
        }
        let body = serde_json::to_value(meals).map_err(StoreError::write)?;
        self.put_value(&format!("{path}/meals"), &body).await
    }

    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        let docs: BTreeMap<String, FacilityDoc> = decode_map(self.get_value("facilities").await?)?;
        Ok(docs
            .into_iter()
            .map(|(id, d)| Facility {
                id,
                name: d.facility_name,
                submitted_at_ms: d.submitted_at,
            })
            .collect())
    }

    async fn list_users(&self, facility_id: &str) -> Result<Vec<User>, StoreError> {
        let docs = self.users_of_facility(facility_id).await?;
        Ok(docs
            .into_iter()
            .map(|(id, d)| User {
                id,
                name: d.user_name,
                number: d.user_number,
                facility_id: d.facility_id,
                submitted_at_ms: d.submitted_at,
            })
            .collect())
    }

    async fn list_images(&self, user_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        let docs: BTreeMap<String, ImageDoc> =
            decode_map(self.get_value(&format!("users/{user_id}/images")).await?)?;
        Ok(docs
            .into_iter()
            .map(|(id, d)| ImageRecord {
                id,
                url: d.image_url,
                submitted_at_ms: d.submitted_at,
                meals: d.meals,
            })
            .collect())
    }
}
