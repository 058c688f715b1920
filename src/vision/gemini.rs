use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::AdapterError;

use super::{RawVerdict, VisionClassifier};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClassifier {
    client: Client,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClassifier {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            model: model.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }
}

#[async_trait]
impl VisionClassifier for GeminiClassifier {
    async fn classify(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<RawVerdict, AdapterError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::NotConfigured("Gemini API key is not set".into()))?;

        let payload = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(image) } }
                ]
            }],
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": 256,
                "responseMimeType": "application/json"
            }
        });

        log_debug!("Classifying {} byte {mime_type} image with {}", image.len(), self.model);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            log_warn!("Gemini rate limit hit");
            return Err(AdapterError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| AdapterError::Malformed(err.to_string()))?;
        reply_text(body).map(|text| RawVerdict { text })
    }
}

fn reply_text(response: GenerateResponse) -> Result<String, AdapterError> {
    response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .find_map(|part| part.text.filter(|text| !text.trim().is_empty()))
        .ok_or_else(|| AdapterError::Malformed("response contains no text part".into()))
}
