//! Calendar backend client.
//!
//! The bridge process owns EventKit authorization and exposes a small
//! HTTP contract; this module pins that contract behind the
//! [`CalendarBackend`] trait so the allotter and event creator can be
//! tested against an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Authorization state of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatus {
    pub authorized: bool,
    pub status_code: i32,
}

/// A calendar exposed by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub title: String,
    pub allows_modifications: bool,
    #[serde(default)]
    pub color_hex: Option<String>,
}

/// An existing event, as returned by `/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEvent {
    pub id: String,
    pub title: String,
    pub start_iso: String,
    pub end_iso: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub calendar_title: Option<String>,
}

/// Payload for `/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub start_iso: String,
    pub end_iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
}

/// Response from `/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
    pub title: String,
    pub start_iso: String,
    pub end_iso: String,
    #[serde(default)]
    pub calendar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    deleted: bool,
}

/// Operations the pipeline needs from a calendar service.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn status(&self) -> Result<BackendStatus>;

    async fn calendars(&self) -> Result<Vec<CalendarInfo>>;

    /// Events within the next `days` days, optionally restricted to one
    /// calendar.
    async fn events(&self, days: i64, calendar_id: Option<&str>) -> Result<Vec<BackendEvent>>;

    async fn add_event(&self, event: &NewEvent) -> Result<CreatedEvent>;

    /// Delete an event. Returns false when the event was already gone,
    /// which callers treat as success.
    async fn delete_event(&self, event_id: &str) -> Result<bool>;
}

/// HTTP client for the calendar bridge.
pub struct CalBridgeClient {
    client: Client,
    base_url: String,
}

impl CalBridgeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(BACKEND_TIMEOUT)
            .build()
            .map_err(|e| CoreError::BackendUnavailable {
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn unavailable(&self, e: reqwest::Error) -> CoreError {
        CoreError::BackendUnavailable {
            detail: format!("{} ({e})", self.base_url),
        }
    }

    async fn check<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CoreError::BackendRejected {
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|e| self.unavailable(e))
    }
}

#[async_trait]
impl CalendarBackend for CalBridgeClient {
    async fn status(&self) -> Result<BackendStatus> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        self.check(response).await
    }

    async fn calendars(&self) -> Result<Vec<CalendarInfo>> {
        let url = format!("{}/calendars", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        self.check(response).await
    }

    async fn events(&self, days: i64, calendar_id: Option<&str>) -> Result<Vec<BackendEvent>> {
        let url = format!("{}/events", self.base_url);
        let mut request = self.client.get(&url).query(&[("days", days.to_string())]);
        if let Some(id) = calendar_id {
            request = request.query(&[("calendar_id", id)]);
        }
        let response = request.send().await.map_err(|e| self.unavailable(e))?;
        self.check(response).await
    }

    async fn add_event(&self, event: &NewEvent) -> Result<CreatedEvent> {
        let url = format!("{}/add", self.base_url);
        let send = || self.client.post(&url).json(event).send();

        // One retry for transient transport failures; 4xx/5xx are final.
        let response = match send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!(error = %e, "event creation failed, retrying once");
                send().await.map_err(|e| self.unavailable(e))?
            }
            Err(e) => return Err(self.unavailable(e)),
        };
        self.check(response).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        let url = format!("{}/delete", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("event_id", event_id)])
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        // A missing event is success from the caller's point of view.
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        let parsed: DeleteResponse = self.check(response).await?;
        Ok(parsed.deleted)
    }
}

impl std::fmt::Debug for CalBridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalBridgeClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
