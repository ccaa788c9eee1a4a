use super::client::GeminiHttpClient;
use super::types::{Content, GenerateContentResponse, Part};
use crate::ai::{decode_image, require_text, ImageEditService};
use crate::models::{EncodedAsset, GeneratedImage};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EditRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: EditGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditGenerationConfig {
    response_modalities: Vec<String>,
}

/// Multi-image edit client backed by a Gemini image model.
pub struct GeminiEditClient {
    http: GeminiHttpClient,
}

impl GeminiEditClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(120),
                client,
            ),
        }
    }

    /// First inline part, in response order, that decodes as an image.
    fn first_image(response: &GenerateContentResponse) -> Option<GeneratedImage> {
        use base64::Engine as _;

        response.first_parts().iter().find_map(|p| match p {
            Part::InlineData { inline_data } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&inline_data.data)
                    .ok()?;
                decode_image(bytes, Some(&inline_data.mime_type))
            }
            _ => None,
        })
    }
}

super::impl_with_gemini_base_url!(GeminiEditClient);

#[async_trait]
impl ImageEditService for GeminiEditClient {
    async fn edit_image(&self, prompt: &str, assets: &[EncodedAsset]) -> Result<GeneratedImage> {
        require_text(prompt, "Prompt")?;
        if assets.is_empty() {
            return Err(Error::Validation(
                "At least one image is required for editing".to_string(),
            ));
        }

        let mut parts: Vec<Part> = assets.iter().map(Part::from).collect();
        parts.push(Part::text(prompt));

        let request = EditRequest {
            contents: vec![Content { role: None, parts }],
            generation_config: EditGenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        };

        tracing::debug!(
            "Requesting edit of {} image(s) from {}",
            assets.len(),
            self.http.model()
        );
        let response: GenerateContentResponse = self.http.generate_content(&request).await?;

        Self::first_image(&response)
            .ok_or_else(|| Error::NoResult("No edited image was returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::test_support;
    use crate::ai::test_png;
    use wiremock::{MockServer, ResponseTemplate};

    const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

    fn make_client(server: &MockServer) -> GeminiEditClient {
        GeminiEditClient::new("key".to_string(), DEFAULT_MODEL.to_string())
            .with_base_url(server.uri())
    }

    fn b64(bytes: &[u8]) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn asset() -> EncodedAsset {
        EncodedAsset {
            mime_type: "image/png".to_string(),
            data: b64(&test_png(2, 2)),
        }
    }

    #[tokio::test]
    async fn test_edit_returns_first_decodable_image() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "text": "Here is your edit" },
                            { "inlineData": { "mimeType": "image/png", "data": "!!!invalid!!!" } },
                            { "inlineData": { "mimeType": "image/png", "data": b64(&test_png(5, 3)) } },
                            { "inlineData": { "mimeType": "image/png", "data": b64(&test_png(9, 9)) } }
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let image = make_client(&server)
            .edit_image("make it red", &[asset()])
            .await
            .unwrap();
        assert_eq!((image.width, image.height), (5, 3));
    }

    #[tokio::test]
    async fn test_request_sends_images_before_prompt() {
        let server = MockServer::start().await;
        let first = asset();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "contents": [{
                    "parts": [
                        { "inlineData": { "mimeType": "image/png", "data": first.data } },
                        { "inlineData": { "mimeType": "image/png", "data": first.data } },
                        { "text": "merge these" }
                    ]
                }],
                "generationConfig": { "responseModalities": ["IMAGE"] }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(test_support::inline_response(
                    "image/png",
                    &b64(&test_png(1, 1)),
                )),
            )
            .expect(1)
            .mount(&server)
            .await;

        make_client(&server)
            .edit_image("merge these", &[first.clone(), first])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_text_only_response_is_no_result() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "I cannot edit that" }] }
                }]
            })))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .edit_image("make it red", &[asset()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoResult(_)));
    }

    #[tokio::test]
    async fn test_validation_short_circuits() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let err = client.edit_image("", &[asset()]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = client.edit_image("make it red", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
