use crate::chunking::split_text;
use crate::config::KnowledgeBaseConfig;
use crate::conversation::ConversationEngine;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::VectorIndex;
use crate::ingest::extract_documents;
use crate::models::{AnswerResult, DocumentSource, IngestResult, RetrievedChunk, StatusSnapshot};
use crate::providers::{build_embedder, build_language_model};
use crate::traits::{Embedder, LanguageModel};
use crate::{IndexError, IngestError, KnowledgeBaseError};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of trying to make the engine bound before serving a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    AlreadyBound,
    Restored,
    NoArtifact,
}

/// The engine is bound exactly when it holds an index, so one flag backs both
/// `index_loaded` and `conversation_bound` in the snapshot.
#[derive(Debug, Default)]
struct BindingFlags {
    bound: AtomicBool,
    indexed_chunks: AtomicUsize,
    turns: AtomicUsize,
}

impl BindingFlags {
    fn publish(&self, engine: &ConversationEngine) {
        let indexed_chunks = engine.index().map_or(0, VectorIndex::len);
        let turns = engine.memory().map_or(0, |memory| memory.len());
        self.bound.store(engine.is_bound(), Ordering::SeqCst);
        self.indexed_chunks.store(indexed_chunks, Ordering::SeqCst);
        self.turns.store(turns, Ordering::SeqCst);
    }
}

/// Owns the single conversation binding and composes ingestion and answering.
///
/// `ingest`, `answer`, `search` and `reload` are serialised by one lock around the
/// engine. `status` never takes that lock; it reads flags published after each
/// mutation, so it may observe a binding that is being replaced.
pub struct KnowledgeBase {
    config: KnowledgeBaseConfig,
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    engine: Mutex<ConversationEngine>,
    flags: BindingFlags,
}

impl KnowledgeBase {
    pub fn new(
        config: KnowledgeBaseConfig,
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, KnowledgeBaseError> {
        config.validate()?;

        let engine = ConversationEngine::new(Arc::clone(&embedder), Arc::clone(&model))
            .with_top_k(config.top_k)
            .with_condensed_follow_ups(config.condense_follow_ups);

        Ok(Self {
            config,
            extractor,
            embedder,
            model,
            engine: Mutex::new(engine),
            flags: BindingFlags::default(),
        })
    }

    /// Builds the configured providers and the lopdf extractor.
    pub fn from_config(config: KnowledgeBaseConfig) -> Result<Self, KnowledgeBaseError> {
        config.validate()?;
        let embedder = build_embedder(&config.embedding, config.request_timeout)?;
        let model = build_language_model(&config.llm, config.request_timeout)
            .map_err(KnowledgeBaseError::Chat)?;
        Self::new(config, Arc::new(LopdfExtractor), embedder, model)
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    pub async fn ingest(
        &self,
        documents: Vec<DocumentSource>,
    ) -> Result<IngestResult, KnowledgeBaseError> {
        let mut engine = self.engine.lock().await;
        let requested = documents.len();

        let extractor = Arc::clone(&self.extractor);
        let report = tokio::task::spawn_blocking(move || {
            extract_documents(extractor.as_ref(), &documents)
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))?;

        if !report.has_text() {
            warn!(
                requested,
                skipped = report.skipped.len(),
                "no extractable text in document batch"
            );
            return Err(KnowledgeBaseError::NoExtractableText);
        }

        let text_length = report.text.chars().count();
        let chunks = split_text(&report.text, &self.config.chunking)?;
        let chunks_created = chunks.len();

        let index = VectorIndex::build(chunks, self.embedder.as_ref()).await?;
        index.ensure_compatible(self.embedder.as_ref())?;
        index.save(&self.config.artifact_path)?;

        let index_id = index.index_id();
        let embedding_model = index.embedding_model().to_string();
        engine.bind(index)?;
        self.flags.publish(&engine);

        info!(
            documents = report.documents_processed,
            skipped = report.skipped.len(),
            chunks = chunks_created,
            text_length,
            %index_id,
            "ingested document batch"
        );

        Ok(IngestResult {
            chunks_created,
            text_length,
            documents_processed: report.documents_processed,
            documents_skipped: report.skipped,
            index_id,
            embedding_model,
            ingested_at: Utc::now(),
        })
    }

    pub async fn answer(
        &self,
        question: &str,
        session_id: Option<String>,
    ) -> Result<AnswerResult, KnowledgeBaseError> {
        if question.trim().is_empty() {
            return Err(crate::ChatError::EmptyQuestion.into());
        }

        let mut engine = self.engine.lock().await;
        if self.recover(&mut engine)? == Recovery::NoArtifact {
            return Err(KnowledgeBaseError::NoKnowledgeBase);
        }

        info!(
            session_id = session_id.as_deref().unwrap_or("-"),
            question = %question,
            "processing question"
        );

        let result = engine.ask(question).await;
        self.flags.publish(&engine);
        let exchange = result?;

        debug!(
            answer = %exchange.answer.chars().take(100).collect::<String>(),
            sources = exchange.sources.len(),
            "generated answer"
        );

        Ok(AnswerResult {
            answer: exchange.answer,
            question: question.to_string(),
            session_id,
            sources: exchange.sources,
            answered_at: Utc::now(),
        })
    }

    /// Ranked chunks for `text` from the bound index; conversation memory is untouched.
    pub async fn search(
        &self,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, KnowledgeBaseError> {
        if text.trim().is_empty() {
            return Err(crate::ChatError::EmptyQuestion.into());
        }

        let mut engine = self.engine.lock().await;
        if self.recover(&mut engine)? == Recovery::NoArtifact {
            return Err(KnowledgeBaseError::NoKnowledgeBase);
        }

        Ok(engine.retrieve(text, k.max(1)).await?)
    }

    /// Rebinds from the persisted artifact, discarding the current conversation.
    /// Returns `false` when no artifact exists.
    pub async fn reload(&self) -> Result<bool, KnowledgeBaseError> {
        let mut engine = self.engine.lock().await;
        match VectorIndex::load(&self.config.artifact_path) {
            Ok(index) => {
                engine.bind(index)?;
                self.flags.publish(&engine);
                Ok(true)
            }
            Err(IndexError::NotFound(path)) => {
                warn!(path = %path.display(), "no persisted index to reload");
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let bound = self.flags.bound.load(Ordering::SeqCst);
        StatusSnapshot {
            index_loaded: bound,
            conversation_bound: bound,
            artifact_exists: self.config.artifact_path.is_file(),
            credentials_configured: self.model.is_configured(),
            indexed_chunks: self.flags.indexed_chunks.load(Ordering::SeqCst),
            conversation_turns: self.flags.turns.load(Ordering::SeqCst),
        }
    }

    /// Unbound --load attempt--> Bound | Unbound. Attempted at most once per call.
    fn recover(&self, engine: &mut ConversationEngine) -> Result<Recovery, KnowledgeBaseError> {
        if engine.is_bound() {
            return Ok(Recovery::AlreadyBound);
        }

        match VectorIndex::load(&self.config.artifact_path) {
            Ok(index) => {
                engine.bind(index)?;
                self.flags.publish(engine);
                info!(path = %self.config.artifact_path.display(), "restored knowledge base from disk");
                Ok(Recovery::Restored)
            }
            Err(IndexError::NotFound(path)) => {
                warn!(path = %path.display(), "no vector index found; process documents first");
                Ok(Recovery::NoArtifact)
            }
            Err(error) => Err(error.into()),
        }
    }
}
