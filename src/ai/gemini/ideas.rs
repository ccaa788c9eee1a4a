use super::client::GeminiHttpClient;
use super::types::{Content, GenerateContentResponse, Part};
use crate::ai::{require_text, IdeaService};
use crate::models::{Citation, IdeaResult};
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct IdeaRequest {
    contents: Vec<Content>,
    tools: Vec<SearchTool>,
}

#[derive(Debug, Serialize)]
struct SearchTool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

/// Web-grounded idea generation client.
pub struct GeminiIdeaClient {
    http: GeminiHttpClient,
}

impl GeminiIdeaClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(60),
                client,
            ),
        }
    }

    fn extract_text(response: &GenerateContentResponse) -> String {
        response
            .first_parts()
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn extract_citations(response: &GenerateContentResponse) -> Vec<Citation> {
        response
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.iter().map(Citation::from).collect())
            .unwrap_or_default()
    }
}

super::impl_with_gemini_base_url!(GeminiIdeaClient);

#[async_trait]
impl IdeaService for GeminiIdeaClient {
    async fn search_ideas(&self, topic: &str) -> Result<IdeaResult> {
        require_text(topic, "Topic")?;

        let request = IdeaRequest {
            contents: vec![Content::user(vec![Part::text(prompts::render(
                prompts::IDEA_SEARCH,
                &[("topic", topic.trim())],
            ))])],
            tools: vec![SearchTool {
                google_search: serde_json::Map::new(),
            }],
        };

        let response: GenerateContentResponse = self.http.generate_content(&request).await?;

        let text = Self::extract_text(&response);
        if text.trim().is_empty() {
            return Err(Error::NoResult("No ideas were generated".to_string()));
        }

        let citations = Self::extract_citations(&response);
        tracing::debug!("Idea search returned {} citation(s)", citations.len());

        Ok(IdeaResult { text, citations })
    }
}
