use crate::index::VectorIndex;
use crate::models::{Prompt, PromptMessage, RetrievedChunk, Turn};
use crate::traits::{Embedder, LanguageModel};
use crate::{ChatError, IndexError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 4;

const ANSWER_INSTRUCTIONS: &str = "You answer questions about the user's documents. \
Use only the numbered context passages supplied with the latest question and the earlier \
conversation. If the passages do not contain the answer, say that you do not know instead \
of guessing.";

const CONDENSE_INSTRUCTIONS: &str = "Rewrite the follow-up question so that it can be \
understood without the conversation, keeping its original language. Reply with the \
rewritten question only.";

/// Ordered question/answer history of the active conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn record(&mut self, question: &str, answer: &str) {
        self.turns.push(Turn {
            question: question.to_string(),
            answer: answer.to_string(),
            asked_at: Utc::now(),
        });
    }

    fn as_messages(&self) -> impl Iterator<Item = PromptMessage> + '_ {
        self.turns.iter().flat_map(|turn| {
            [
                PromptMessage::user(turn.question.clone()),
                PromptMessage::assistant(turn.answer.clone()),
            ]
        })
    }
}

#[derive(Debug)]
struct BoundSession {
    index: VectorIndex,
    memory: ConversationMemory,
}

#[derive(Debug, Default)]
enum EngineState {
    #[default]
    Unbound,
    Bound(BoundSession),
}

/// Outcome of one answered question.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub answer: String,
    pub retrieval_query: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Binds one vector index and one conversation memory to a language model.
///
/// The engine is either unbound or bound to exactly one index. Binding again replaces
/// the index and starts an empty memory; there is no other way to reset the history.
pub struct ConversationEngine {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    condense_follow_ups: bool,
    state: EngineState,
}

impl ConversationEngine {
    pub fn new(embedder: Arc<dyn Embedder>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            embedder,
            model,
            top_k: DEFAULT_TOP_K,
            condense_follow_ups: false,
            state: EngineState::Unbound,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_condensed_follow_ups(mut self, enabled: bool) -> Self {
        self.condense_follow_ups = enabled;
        self
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, EngineState::Bound(_))
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        match &self.state {
            EngineState::Bound(session) => Some(&session.index),
            EngineState::Unbound => None,
        }
    }

    pub fn memory(&self) -> Option<&ConversationMemory> {
        match &self.state {
            EngineState::Bound(session) => Some(&session.memory),
            EngineState::Unbound => None,
        }
    }

    /// Replaces whatever is bound with `index` and a fresh memory.
    pub fn bind(&mut self, index: VectorIndex) -> Result<(), IndexError> {
        index.ensure_compatible(self.embedder.as_ref())?;
        self.state = EngineState::Bound(BoundSession {
            index,
            memory: ConversationMemory::default(),
        });
        Ok(())
    }

    pub async fn retrieve(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, ChatError> {
        let EngineState::Bound(session) = &self.state else {
            return Err(ChatError::NotBound);
        };
        Ok(session.index.query(self.embedder.as_ref(), text, k).await?)
    }

    pub async fn ask(&mut self, question: &str) -> Result<Exchange, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let EngineState::Bound(session) = &mut self.state else {
            return Err(ChatError::NotBound);
        };

        let retrieval_query = if self.condense_follow_ups && !session.memory.is_empty() {
            let rewritten = self
                .model
                .generate(&condense_prompt(&session.memory, question))
                .await?;
            let rewritten = rewritten.trim();
            if rewritten.is_empty() {
                question.to_string()
            } else {
                debug!(original = %question, rewritten = %rewritten, "condensed follow-up question");
                rewritten.to_string()
            }
        } else {
            question.to_string()
        };

        let sources = session
            .index
            .query(self.embedder.as_ref(), &retrieval_query, self.top_k)
            .await?;

        let prompt = answer_prompt(&sources, &session.memory, question);
        let answer = self.model.generate(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(ChatError::EmptyAnswer);
        }

        session.memory.record(question, &answer);

        Ok(Exchange {
            answer,
            retrieval_query,
            sources,
        })
    }
}

fn answer_prompt(sources: &[RetrievedChunk], memory: &ConversationMemory, question: &str) -> Prompt {
    let context = sources
        .iter()
        .enumerate()
        .map(|(index, chunk)| format!("[{}] {}", index + 1, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = memory.as_messages().collect::<Vec<_>>();
    messages.push(PromptMessage::user(format!(
        "Context:\n{context}\n\nQuestion: {question}"
    )));

    Prompt {
        system: ANSWER_INSTRUCTIONS.to_string(),
        messages,
    }
}

fn condense_prompt(memory: &ConversationMemory, question: &str) -> Prompt {
    let history = memory
        .turns()
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: CONDENSE_INSTRUCTIONS.to_string(),
        messages: vec![PromptMessage::user(format!(
            "Conversation:\n{history}\n\nFollow-up question: {question}"
        ))],
    }
}
