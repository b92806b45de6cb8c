use crate::extractor::{PageText, PdfExtractor};
use crate::models::{DocumentSource, Prompt};
use crate::traits::LanguageModel;
use crate::{ChatError, IngestError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

/// Treats document bytes as UTF-8 text; sources whose bytes start with `!` fail to parse.
pub struct TextExtractor;

impl PdfExtractor for TextExtractor {
    fn extract_pages(&self, source: &DocumentSource) -> Result<Vec<PageText>, IngestError> {
        match source {
            DocumentSource::Bytes { data, .. } if !data.starts_with(b"!") => Ok(vec![PageText {
                number: 1,
                text: String::from_utf8_lossy(data).to_string(),
            }]),
            _ => Err(IngestError::PdfParse(format!("cannot read {}", source.label()))),
        }
    }
}

pub fn text_document(name: &str, text: &str) -> DocumentSource {
    DocumentSource::from_bytes(name, text.as_bytes().to_vec())
}

/// Replays queued replies, then falls back to a numbered default, recording every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn with_replies(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> String {
        "scripted".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ChatError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| format!("answer {}", prompts.len())))
    }
}

/// Holds every generation until `release` is called; `entered` fires when a call starts waiting.
pub struct GatedModel {
    entered: Notify,
    gate: Semaphore,
    inner: ScriptedModel,
}

impl GatedModel {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
            inner: ScriptedModel::default(),
        }
    }

    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.inner.prompts()
    }
}

#[async_trait]
impl LanguageModel for GatedModel {
    fn model_id(&self) -> String {
        "gated".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ChatError> {
        self.entered.notify_one();
        self.gate.acquire().await.unwrap().forget();
        self.inner.generate(prompt).await
    }
}
