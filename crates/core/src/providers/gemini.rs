//! Google Gemini `generateContent` client.

use crate::models::{Prompt, Role};
use crate::providers::endpoint;
use crate::traits::LanguageModel;
use crate::ChatError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiChat {
    client: Client,
    base_url: Url,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl GeminiChat {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            temperature,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ChatError> {
        self.base_url = Url::parse(base_url.trim())?;
        Ok(self)
    }

    fn request_url(&self) -> Result<Url, ChatError> {
        Ok(endpoint(
            self.base_url.as_str(),
            &format!("models/{}:generateContent", self.model),
        )?)
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    fn model_id(&self) -> String {
        format!("gemini:{}", self.model)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ChatError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ChatError::MissingCredentials("gemini".to_string()))?;

        let response = self
            .client
            .post(self.request_url()?)
            .query(&[("key", api_key)])
            .json(&request_body(prompt, self.temperature))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ChatError::BackendResponse {
                backend: "gemini".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        parse_candidate_text(&parsed)
    }
}

fn request_body(prompt: &Prompt, temperature: f32) -> Value {
    let contents = prompt
        .messages
        .iter()
        .map(|message| {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": message.text }] })
        })
        .collect::<Vec<_>>();

    let mut body = json!({
        "contents": contents,
        "generationConfig": { "temperature": temperature },
    });

    if !prompt.system.trim().is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": prompt.system }] });
    }

    body
}

fn parse_candidate_text(payload: &Value) -> Result<String, ChatError> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| ChatError::BackendResponse {
            backend: "gemini".to_string(),
            details: match payload.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
                Some(reason) => format!("prompt blocked: {reason}"),
                None => "response has no candidate content".to_string(),
            },
        })?;

    Ok(parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromptMessage;

    #[test]
    fn history_roles_map_to_gemini_roles() {
        let prompt = Prompt {
            system: "Answer from context.".to_string(),
            messages: vec![
                PromptMessage::user("What is covered?"),
                PromptMessage::assistant("Electrical faults."),
                PromptMessage::user("For how long?"),
            ],
        };

        let body = request_body(&prompt, 0.2);

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "For how long?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Answer from context.");
        assert!(body["generationConfig"]["temperature"].as_f64().is_some());
    }

    #[test]
    fn empty_system_instruction_is_omitted() {
        let prompt = Prompt {
            system: String::new(),
            messages: vec![PromptMessage::user("hi")],
        };
        assert!(request_body(&prompt, 0.2).get("systemInstruction").is_none());
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let payload = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Two " }, { "text": "years." }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(parse_candidate_text(&payload).unwrap(), "Two years.");
    }

    #[test]
    fn blocked_prompt_is_a_backend_error() {
        let payload = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let error = parse_candidate_text(&payload).unwrap_err();
        assert!(error.to_string().contains("SAFETY"));
    }

    #[test]
    fn request_url_targets_generate_content() {
        let client = GeminiChat::new(Some("key".to_string()), "gemini-1.5-flash", 0.2, Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            client.request_url().unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = GeminiChat::new(Some("  ".to_string()), "gemini-1.5-flash", 0.2, Duration::from_secs(5))
            .unwrap();
        assert!(!client.is_configured());

        let result = client.generate(&Prompt::default()).await;
        assert!(matches!(result, Err(ChatError::MissingCredentials(_))));
    }
}
