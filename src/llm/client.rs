use crate::error::{ConsolidationError, Result};
use crate::llm::types::*;
use reqwest::blocking::Client;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one user turn and returns the text of the first candidate.
    pub fn generate_content(
        &self,
        system_prompt: &str,
        parts: Vec<Part>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            system_instruction: Some(Content {
                role: "user".to_string(),
                parts: vec![Part::Text {
                    text: system_prompt.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
                response_schema,
            },
        };

        let res = self.client.post(&url).json(&payload).send()?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text()?;
            return Err(ConsolidationError::Oracle(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        first_text(res.json()?)
    }
}

pub(crate) fn first_text(body: GenerateContentResponse) -> Result<String> {
    let candidate = body
        .candidates
        .ok_or_else(|| ConsolidationError::Oracle("No candidates returned".to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| ConsolidationError::Oracle("Empty candidates list".to_string()))?;

    let content = candidate.content.ok_or_else(|| {
        ConsolidationError::Oracle(format!(
            "Candidate has no content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))
    })?;

    let text: String = content
        .parts
        .into_iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text),
            Part::InlineData { .. } => None,
        })
        .collect();

    if text.trim().is_empty() {
        return Err(ConsolidationError::Oracle(
            "Model returned non-text content".to_string(),
        ));
    }
    Ok(text)
}
