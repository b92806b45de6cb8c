use crate::models::{Prompt, Role};
use crate::providers::endpoint;
use crate::traits::LanguageModel;
use crate::ChatError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use url::{Host, Url};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Any `/chat/completions` endpoint: OpenAI, OpenRouter, a local Ollama, ...
pub struct OpenAiCompatibleChat {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompatibleChat {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint(base_url, "chat/completions")?,
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleChat {
    fn model_id(&self) -> String {
        format!("openai-compatible:{}", self.model)
    }

    /// A key is required unless the endpoint is on this machine, e.g. a local Ollama.
    fn is_configured(&self) -> bool {
        self.api_key.is_some() || is_loopback(&self.endpoint)
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ChatError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&request_body(&self.model, prompt, self.temperature));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ChatError::BackendResponse {
                backend: "openai-compatible".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatError::BackendResponse {
                backend: "openai-compatible".to_string(),
                details: "response has no message content".to_string(),
            })
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(address)) => address.is_loopback(),
        Some(Host::Ipv6(address)) => address.is_loopback(),
        None => false,
    }
}

fn request_body(model: &str, prompt: &Prompt, temperature: f32) -> Value {
    let mut messages = Vec::with_capacity(prompt.messages.len() + 1);
    if !prompt.system.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": prompt.system }));
    }
    messages.extend(prompt.messages.iter().map(|message| {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        json!({ "role": role, "content": message.text })
    }));

    json!({
        "model": model,
        "temperature": temperature,
        "messages": messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromptMessage;

    #[test]
    fn system_prompt_leads_the_message_list() {
        let prompt = Prompt {
            system: "Answer from context.".to_string(),
            messages: vec![
                PromptMessage::user("Q1"),
                PromptMessage::assistant("A1"),
                PromptMessage::user("Q2"),
            ],
        };

        let body = request_body("llama3", &prompt, 0.2);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(body["model"], "llama3");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "Q2");
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = OpenAiCompatibleChat::new(
            "https://openrouter.ai/api/v1",
            None,
            "mistral",
            0.2,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert!(!client.is_configured());
    }

    #[test]
    fn keyless_local_endpoint_counts_as_configured() {
        let local = OpenAiCompatibleChat::new(
            DEFAULT_BASE_URL,
            None,
            "llama3",
            0.2,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(local.is_configured());

        let loopback_ip = OpenAiCompatibleChat::new(
            "http://127.0.0.1:8080/v1",
            None,
            "llama3",
            0.2,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(loopback_ip.is_configured());

        let keyed_remote = OpenAiCompatibleChat::new(
            "https://openrouter.ai/api/v1",
            Some("secret".to_string()),
            "mistral",
            0.2,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(keyed_remote.is_configured());
    }
}
