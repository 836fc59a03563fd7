// src/backend.rs
//! Backend API client: assignment and route records plus the third-party
//! fleet-GPS device endpoint

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::queue::{QueueRecord, RecordPayload};
use crate::track::sample::{Assignment, PositionSample};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Filter for fetching the assignment of one device on one day
#[derive(Debug, Clone)]
pub struct AssignmentFilter {
    pub device_id: String,
    pub date: NaiveDate,
}

/// Device record returned by the fleet-GPS provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetDevice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_kmh: f64,
}

impl FleetDevice {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteBody<'a> {
    collection_points: &'a [PositionSample],
}

/// Backend operations the sync coordinator and tracker depend on. Tests
/// substitute a scripted implementation.
pub trait Backend: Send + Sync {
    fn fetch_assignment(
        &self,
        filter: &AssignmentFilter,
    ) -> impl std::future::Future<Output = Result<Assignment>> + Send;

    fn submit_route(
        &self,
        assignment_id: &str,
        collection_points: &[PositionSample],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn submit_form(
        &self,
        payload: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn fetch_devices(&self) -> impl std::future::Future<Output = Result<Vec<FleetDevice>>> + Send;

    /// Submit one queue record according to its payload kind
    fn submit_record(
        &self,
        record: &QueueRecord,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            match &record.payload {
                RecordPayload::Sample(sample) => {
                    self.submit_route(&sample.assignment_id, std::slice::from_ref(sample))
                        .await
                }
                RecordPayload::Form(payload) => self.submit_form(payload).await,
            }
        }
    }
}

/// REST client over reqwest with a fixed per-request timeout. A timed-out
/// request is a failure for this drain pass; retries happen on the next
/// sync trigger, never inside the client.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    fleet_url: Option<String>,
    fleet_username: Option<String>,
    fleet_password: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TrackerError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            fleet_url: config
                .fleet_api_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            fleet_username: config.fleet_api_username.clone(),
            fleet_password: config.fleet_api_password.clone(),
        })
    }
}

impl Backend for HttpBackend {
    async fn fetch_assignment(&self, filter: &AssignmentFilter) -> Result<Assignment> {
        let url = format!("{}/assignment", self.base_url);
        let date = filter.date.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("device", filter.device_id.as_str()),
                ("date", date.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn submit_route(
        &self,
        assignment_id: &str,
        collection_points: &[PositionSample],
    ) -> Result<()> {
        let url = format!("{}/route/{}", self.base_url, assignment_id);
        self.client
            .put(&url)
            .json(&RouteBody { collection_points })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn submit_form(&self, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}/submission", self.base_url);
        self.client
            .post(&url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_devices(&self) -> Result<Vec<FleetDevice>> {
        let fleet_url = self.fleet_url.as_ref().ok_or_else(|| {
            TrackerError::Connection("No fleet-GPS endpoint configured".to_string())
        })?;

        let url = format!("{}/device", fleet_url);
        let mut request = self.client.get(&url);
        if let Some(username) = &self.fleet_username {
            request = request.basic_auth(username, self.fleet_password.as_deref());
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
