use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::AdapterError;

use super::{Camera, ImageSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Home Assistant REST client for `camera.*` entities.
///
/// Snapshots come from `/camera_proxy/<entity_id>` and discovery from
/// `/states`, both authenticated with the supervisor bearer token.
#[derive(Clone)]
pub struct HomeAssistantCamera {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    attributes: EntityAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct EntityAttributes {
    friendly_name: Option<String>,
}

impl HomeAssistantCamera {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn token(&self) -> Result<&str, AdapterError> {
        self.token
            .as_deref()
            .ok_or_else(|| AdapterError::NotConfigured("SUPERVISOR_TOKEN is not set".into()))
    }
}

#[async_trait]
impl ImageSource for HomeAssistantCamera {
    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, AdapterError> {
        let token = self.token()?;
        if !source_ref.starts_with("camera.") {
            return Err(AdapterError::NotConfigured(format!(
                "{source_ref} is not a camera entity"
            )));
        }

        let url = format!("{}/camera_proxy/{source_ref}", self.base_url);
        log_debug!("Fetching snapshot from {url}");
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_warn!("Snapshot request for {source_ref} failed with {status}");
            return Err(status_error(status, body));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn list_cameras(&self) -> Result<Vec<Camera>, AdapterError> {
        let token = self.token()?;
        let url = format!("{}/states", self.base_url);
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let states: Vec<EntityState> = response
            .json()
            .await
            .map_err(|err| AdapterError::Malformed(err.to_string()))?;
        Ok(cameras_from_states(states))
    }
}

fn status_error(status: StatusCode, body: String) -> AdapterError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AdapterError::RateLimited;
    }
    AdapterError::Status {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    }
}

fn cameras_from_states(states: Vec<EntityState>) -> Vec<Camera> {
    states
        .into_iter()
        .filter(|entity| entity.entity_id.starts_with("camera."))
        .map(|entity| Camera {
            name: entity
                .attributes
                .friendly_name
                .unwrap_or_else(|| entity.entity_id.clone()),
            entity_id: entity.entity_id,
            state: entity.state,
        })
        .collect()
}
