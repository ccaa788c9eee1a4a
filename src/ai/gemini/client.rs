use crate::error::RemoteErrorKind;
use crate::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Error envelope returned by the Gemini REST API on failure.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

/// Assigns a [`RemoteErrorKind`] to a failed response from its status code and
/// the structured error body.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> (RemoteErrorKind, String) {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok();

    let reason_is_key = parsed.as_ref().is_some_and(|p| {
        p.error
            .details
            .iter()
            .filter_map(|d| d.reason.as_deref())
            .any(|r| r.starts_with("API_KEY"))
    });
    let status_not_found = parsed
        .as_ref()
        .is_some_and(|p| p.error.status == "NOT_FOUND");

    let kind = if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || reason_is_key
    {
        RemoteErrorKind::Credential
    } else if status == StatusCode::NOT_FOUND || status_not_found {
        RemoteErrorKind::NotFound
    } else {
        RemoteErrorKind::Other
    };

    let message = parsed
        .map(|p| p.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    (kind, message)
}

/// Lightweight Gemini REST client shared by every capability client.
pub struct GeminiHttpClient {
    pub(crate) client: Client,
    pub(crate) api_key: String,
    model: String,
    pub(crate) base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// Construct a Gemini client.
    ///
    /// `model` should be the bare model ID (for example `gemini-2.5-flash`),
    /// a `models/`-prefixed ID is accepted and stripped.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn require_api_key(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::remote(
                RemoteErrorKind::Credential,
                "An API key must be set before calling Gemini",
            ));
        }
        Ok(())
    }

    async fn read_json<Resp: DeserializeOwned>(response: reqwest::Response) -> Result<Resp> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            let (kind, message) = classify_failure(status, &error_text);
            return Err(Error::remote(
                kind,
                format!("Gemini API error (status {}): {}", status, message),
            ));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::remote(
                RemoteErrorKind::Other,
                format!("Failed to parse Gemini response: {}", e),
            )
        })
    }

    async fn post_to_url<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        self.require_api_key()?;

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        Self::read_json(response).await
    }

    fn model_url(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.base_url, self.model, method
        )
    }

    /// Calls `generateContent` for edit, idea and speech requests.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        self.post_to_url(self.model_url("generateContent"), request)
            .await
    }

    /// Calls `predict` for Imagen requests.
    pub async fn predict<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        self.post_to_url(self.model_url("predict"), request).await
    }

    /// Calls `predictLongRunning`, which answers with an operation resource.
    pub async fn predict_long_running<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        self.post_to_url(self.model_url("predictLongRunning"), request)
            .await
    }

    /// Fetches the current state of an operation by its resource name.
    pub async fn get_operation<Resp: DeserializeOwned>(&self, name: &str) -> Result<Resp> {
        self.require_api_key()?;

        let url = format!("{}/v1beta/{}", self.base_url, name.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch Gemini operation {}: {}", name, e);
                e
            })?;

        Self::read_json(response).await
    }

    /// Downloads generated media from a locator, passing the credential as the
    /// `key` query parameter.
    pub async fn download(&self, locator: &str) -> Result<Vec<u8>> {
        self.require_api_key()?;

        let response = self
            .client
            .get(locator)
            .timeout(self.timeout)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to download generated media: {}", e);
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Media download failed (status {}): {}", status, body);
            return Err(Error::ResultFetchFailure {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
