use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_chat_core::{
    sources_from_folder, ChatError, ChunkingConfig, DocumentSource, EmbeddingProvider,
    EmbeddingSettings, KnowledgeBase, KnowledgeBaseConfig, KnowledgeBaseError, LlmProvider,
    LlmSettings,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// File the vector index is persisted to
    #[arg(long, env = "PDF_CHAT_ARTIFACT", default_value = "vectorstore.json")]
    artifact: PathBuf,

    /// Embedding backend: char-ngram (offline) or ollama
    #[arg(long, env = "PDF_CHAT_EMBEDDING_PROVIDER", default_value = "char-ngram")]
    embedding_provider: EmbeddingProvider,

    /// Embedding model served by Ollama
    #[arg(long, env = "PDF_CHAT_EMBEDDING_MODEL", default_value = "all-minilm")]
    embedding_model: String,

    /// Embedding vector size (defaults to 128 for char-ngram, 384 for ollama)
    #[arg(long, env = "PDF_CHAT_EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Language model backend: gemini or openai-compatible
    #[arg(long, env = "PDF_CHAT_LLM_PROVIDER", default_value = "gemini")]
    llm_provider: LlmProvider,

    /// Language model name
    #[arg(long, env = "PDF_CHAT_LLM_MODEL", default_value = "gemini-1.5-flash")]
    llm_model: String,

    /// Override the language model base URL
    #[arg(long, env = "PDF_CHAT_LLM_URL")]
    llm_url: Option<String>,

    /// API key; falls back to GOOGLE_API_KEY or OPENAI_API_KEY
    #[arg(long, env = "PDF_CHAT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Characters carried over between consecutive chunks
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Separator text is split on before packing chunks
    #[arg(long, default_value = "\n")]
    separator: String,

    /// Treat --separator as a regular expression
    #[arg(long, default_value_t = false)]
    separator_regex: bool,

    /// Passages retrieved per question
    #[arg(long, default_value_t = 4)]
    top_k: usize,

    /// Rewrite follow-up questions into standalone ones before retrieval
    #[arg(long, default_value_t = false)]
    condense_follow_ups: bool,

    /// Timeout for embedding and language model requests, in seconds
    #[arg(long, env = "PDF_CHAT_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,
}

impl Cli {
    fn knowledge_base_config(&self) -> KnowledgeBaseConfig {
        let dimensions = self
            .embedding_dimensions
            .unwrap_or_else(|| self.embedding_provider.default_dimensions());

        KnowledgeBaseConfig {
            artifact_path: self.artifact.clone(),
            chunking: ChunkingConfig {
                separator: self.separator.clone(),
                separator_is_regex: self.separator_regex,
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            condense_follow_ups: self.condense_follow_ups,
            request_timeout: Duration::from_secs(self.timeout_secs),
            embedding: EmbeddingSettings {
                provider: self.embedding_provider,
                model: self.embedding_model.clone(),
                base_url: self.ollama_url.clone(),
                dimensions,
            },
            llm: LlmSettings {
                provider: self.llm_provider,
                model: self.llm_model.clone(),
                api_key: self.api_key.clone(),
                base_url: self.llm_url.clone(),
                temperature: self.temperature,
            }
            .with_env_credentials(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build a new knowledge base from PDFs, replacing the previous one.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Individual PDF files.
        files: Vec<PathBuf>,
    },
    /// Ask a single question.
    Ask {
        #[arg(long)]
        question: String,
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Hold a conversation, one question per line on stdin.
    Chat {
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Show the passages retrieved for a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "4")]
        top_k: usize,
    },
    /// Print the readiness snapshot as JSON.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let knowledge_base = KnowledgeBase::from_config(cli.knowledge_base_config())?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        artifact = %cli.artifact.display(),
        "pdf-chat boot"
    );

    match cli.command {
        Command::Ingest { folder, files } => {
            let mut documents = match &folder {
                Some(folder) => sources_from_folder(folder)?,
                None => Vec::new(),
            };
            documents.extend(files.into_iter().map(DocumentSource::Path));

            if documents.is_empty() {
                anyhow::bail!("pass --folder or at least one PDF path");
            }

            let requested = documents.len();
            let result = knowledge_base.ingest(documents).await?;

            for skipped in &result.documents_skipped {
                warn!(document = %skipped.label, reason = %skipped.reason, "skipped pdf");
            }

            println!(
                "{} chunks created from {}/{} documents ({} characters) at {}",
                result.chunks_created,
                result.documents_processed,
                requested,
                result.text_length,
                result.ingested_at.to_rfc3339()
            );
        }
        Command::Ask {
            question,
            session_id,
        } => match knowledge_base.answer(&question, session_id).await {
            Ok(result) => println!("{}", result.answer),
            Err(error) if error.is_user_actionable() => println!("{}", guidance(&error)),
            Err(error) => return Err(error.into()),
        },
        Command::Chat { session_id } => {
            let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if !knowledge_base.reload().await? {
                println!("No knowledge base yet. Run `pdf-chat ingest` first.");
                return Ok(());
            }

            eprintln!("Ready to answer questions (session {session_id}). Ctrl-D to quit.");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if matches!(line.trim(), "exit" | "quit") {
                    break;
                }

                match knowledge_base.answer(&line, Some(session_id.clone())).await {
                    Ok(result) => println!("{}\n", result.answer),
                    Err(error) if error.is_user_actionable() => println!("{}\n", guidance(&error)),
                    Err(error) => eprintln!("error: {error}\n"),
                }
            }
        }
        Command::Search { query, top_k } => {
            let hits = knowledge_base.search(&query, top_k).await?;
            println!("query: {query}");
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "[{}] score={:.4} position={} chunk={}",
                    rank + 1,
                    hit.score,
                    hit.position,
                    hit.chunk_id
                );
                println!("  chunk_text:\n{}", hit.text);
            }
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&knowledge_base.status())?);
        }
    }

    Ok(())
}

fn guidance(error: &KnowledgeBaseError) -> &'static str {
    match error {
        KnowledgeBaseError::Chat(ChatError::EmptyQuestion) => "Please type a question.",
        _ => "Received an empty answer. Please try rephrasing your question.",
    }
}
