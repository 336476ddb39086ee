//! Chat service coordinating ingestion, retrieval, and reply generation.
//!
//! [`ChatService`] owns long-lived handles to the model gateway, vector index,
//! database, file storage, and rate limiter so every HTTP handler reuses the
//! same components. Construct it once near process start and share it through
//! an `Arc`.

use crate::{
    config::get_config,
    gateway::{
        EmbeddingClient, GatewayError, GenerationClient, build_embedding_client,
        build_generation_client,
    },
    index::{
        ChunkMetadata, IndexError, RetrievedChunk, VectorEntry, VectorIndexClient,
        generate_point_id,
    },
    metrics::{ChatMetrics, MetricsSnapshot},
    processing::{
        ChunkingError, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, PdfError, chunk_pages, pdf,
    },
    ratelimit::{RateLimits, RateRule, RouteCategory, SlidingWindowLimiter},
    storage::{FileStorage, LocalFileStorage, StorageError},
    store::{ChatRecord, Database, MessageRecord, StoreError},
};
use async_trait::async_trait;
use std::sync::Arc;
use time::Duration;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Fixed instruction constraining the model to the supplied document context.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that answers questions using only the content from a PDF document.

- The context is provided as a list of passages with page numbers.
- Only use the given context to answer.
- If the information is not available, respond with: \"This information is not available in the document.\"
- Be concise and factual.
- Reference the page number in your answer when relevant.
";

/// Assistant reply persisted when the message quota is exhausted.
pub const RATE_LIMIT_REPLY: &str =
    "You have reached your daily message limit. Please try again later.";

/// Raw upload handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Display name of the uploaded file.
    pub file_name: String,
    /// Declared MIME type of the upload.
    pub content_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// A completed conversation turn: the reply plus both persisted rows.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Generated (or fixed quota) assistant reply.
    pub reply: String,
    /// Persisted user message.
    pub user_message: MessageRecord,
    /// Persisted assistant message.
    pub assistant_message: MessageRecord,
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// New-chat quota exhausted for this user.
    #[error("New chat quota exceeded; retry in {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the quota frees up.
        retry_after_seconds: u64,
    },
    /// Declared MIME type is not a PDF.
    #[error("Please upload a valid PDF file.")]
    InvalidFileType,
    /// The PDF contained no extractable text.
    #[error("The uploaded PDF is empty or couldn't be parsed.")]
    EmptyDocument,
    /// The bytes could not be parsed as a PDF.
    #[error(transparent)]
    UnreadablePdf(#[from] PdfError),
    /// Chunking was configured with an impossible window.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// The storage collaborator rejected the upload.
    #[error("Failed to store uploaded file: {0}")]
    Storage(#[from] StorageError),
    /// The embedding provider failed.
    #[error("Model provider failed during ingestion: {0}")]
    Provider(#[from] GatewayError),
    /// The vector index rejected the upsert.
    #[error("Vector index request failed: {0}")]
    Index(#[from] IndexError),
    /// The chat row could not be written.
    #[error("Failed to persist chat: {0}")]
    Persistence(#[from] StoreError),
}

/// Errors emitted by the conversation engine and read paths.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The caller sent an empty message.
    #[error("Message content must not be empty")]
    EmptyMessage,
    /// A hard-limited read route exceeded its quota.
    #[error("Rate limit exceeded; retry in {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the quota frees up.
        retry_after_seconds: u64,
    },
    /// Retrieval or generation failed after the rate check passed.
    #[error("Failed to produce a reply: {0}")]
    Generation(String),
    /// A database write or read failed.
    #[error("Failed to persist messages: {0}")]
    Persistence(#[from] StoreError),
}

/// Abstraction over the chat pipeline consumed by the HTTP surface.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Ingest a PDF upload into a new chat.
    async fn ingest(&self, upload: DocumentUpload, user_id: &str)
    -> Result<ChatRecord, IngestError>;

    /// Answer a user message with document-grounded generation.
    async fn respond(
        &self,
        chat_id: &str,
        content: &str,
        user_id: &str,
    ) -> Result<ChatTurn, ChatError>;

    /// List the caller's chats.
    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, ChatError>;

    /// Fetch a chat's message history ordered by creation time.
    async fn chat_messages(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Vec<MessageRecord>, ChatError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Tunables applied at service construction.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Qdrant collection shared by all chats.
    pub collection: String,
    /// Expected embedding dimensionality.
    pub embedding_dimension: usize,
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Chunk overlap in characters.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub top_k: usize,
}

/// Coordinates the full pipeline: extraction, chunking, embedding, indexing,
/// persistence, and grounded reply generation.
pub struct ChatService {
    embedding: Box<dyn EmbeddingClient>,
    generation: Box<dyn GenerationClient>,
    index: VectorIndexClient,
    store: Database,
    storage: Box<dyn FileStorage>,
    limiter: SlidingWindowLimiter,
    metrics: Arc<ChatMetrics>,
    options: ServiceOptions,
}

impl ChatService {
    /// Build a service from explicitly injected collaborators.
    pub fn new(
        embedding: Box<dyn EmbeddingClient>,
        generation: Box<dyn GenerationClient>,
        index: VectorIndexClient,
        store: Database,
        storage: Box<dyn FileStorage>,
        limiter: SlidingWindowLimiter,
        options: ServiceOptions,
    ) -> Self {
        Self {
            embedding,
            generation,
            index,
            store,
            storage,
            limiter,
            metrics: Arc::new(ChatMetrics::new()),
            options,
        }
    }

    /// Build a service from the process configuration, initializing backing
    /// services as needed.
    pub async fn from_config() -> Self {
        let config = get_config();

        tracing::info!("Initializing model gateway");
        let embedding = build_embedding_client(
            config.model_provider,
            &config.embedding_model,
            config.embedding_dimension,
            config.ollama_url.as_deref(),
        )
        .expect("Failed to build embedding client");
        let generation = build_generation_client(
            config.model_provider,
            &config.generation_model,
            config.ollama_url.as_deref(),
        )
        .expect("Failed to build generation client");

        let index = VectorIndexClient::new(&config.qdrant_url, config.qdrant_api_key.clone())
            .expect("Failed to connect to Qdrant");
        let vector_size = config.embedding_dimension as u64;
        index
            .create_collection_if_not_exists(&config.qdrant_collection_name, vector_size)
            .await
            .expect("Failed to ensure Qdrant collection exists");
        index
            .ensure_payload_indexes(&config.qdrant_collection_name)
            .await
            .expect("Failed to ensure Qdrant payload indexes");
        tracing::debug!(collection = %config.qdrant_collection_name, "Vector collection ready");

        let store = Database::connect(&config.database_url)
            .await
            .expect("Failed to open database");

        let storage_root = config.storage_root.clone().unwrap_or_else(|| "storage".into());
        let public_base = config
            .storage_public_url
            .clone()
            .unwrap_or_else(|| "http://localhost/files".into());
        let storage = Box::new(LocalFileStorage::new(storage_root, public_base));

        let mut limits = RateLimits::default();
        if let Some(limit) = config.chat_messages_per_day {
            limits.chat_messages = RateRule {
                limit,
                window: Duration::days(1),
            };
        }
        if let Some(limit) = config.new_chats_per_day {
            limits.new_chat = RateRule {
                limit,
                window: Duration::days(1),
            };
        }
        if let Some(limit) = config.history_reads_per_minute {
            let rule = RateRule {
                limit,
                window: Duration::minutes(1),
            };
            limits.chat_history = rule;
            limits.chat_list = rule;
        }

        let options = ServiceOptions {
            collection: config.qdrant_collection_name.clone(),
            embedding_dimension: config.embedding_dimension,
            chunk_size: config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: config.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            top_k: config.retrieval_top_k.unwrap_or(DEFAULT_TOP_K),
        };

        Self::new(
            embedding,
            generation,
            index,
            store,
            storage,
            SlidingWindowLimiter::new(limits),
            options,
        )
    }

    /// Ingest an uploaded PDF: extract, chunk, store, embed, index, and persist
    /// the chat row, in that order.
    ///
    /// The vector upsert happens before the chat insert so a visible chat is
    /// always retrievable; a failed insert after a successful upsert leaves the
    /// vectors orphaned, which is logged and accepted.
    pub async fn ingest(
        &self,
        upload: DocumentUpload,
        user_id: &str,
    ) -> Result<ChatRecord, IngestError> {
        let decision = self.limiter.check(RouteCategory::NewChat, user_id);
        if !decision.allowed {
            tracing::warn!(user_id, "New chat quota exhausted");
            return Err(IngestError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }

        if !upload.content_type.starts_with("application/pdf") {
            return Err(IngestError::InvalidFileType);
        }

        let pages = pdf::extract_pages(&upload.bytes)?;
        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(IngestError::EmptyDocument);
        }

        let chunks: Vec<_> = chunk_pages(
            &pages,
            self.options.chunk_size,
            self.options.chunk_overlap,
        )?
        .collect();
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let stored = self
            .storage
            .upload(&upload.bytes, &format!("docchat/{user_id}"), &upload.file_name)
            .await?;

        let chat = ChatRecord::new(
            upload.file_name,
            stored.path,
            stored.url,
            user_id.to_string(),
            stored.id,
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedding.embed(texts).await?;
        debug_assert_eq!(chunks.len(), embeddings.len());

        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorEntry {
                id: generate_point_id(),
                vector,
                metadata: ChunkMetadata {
                    chat_id: chat.id.clone(),
                    user_id: user_id.to_string(),
                    file_key: chat.file_key.clone(),
                    page_number: chunk.page_number,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                },
            })
            .collect();

        let indexed = self
            .index
            .upsert_points(&self.options.collection, entries)
            .await?;

        if let Err(error) = self.store.insert_chat(&chat).await {
            // vectors for this chat id are now orphaned; no compensation in-scope
            tracing::error!(user_id, chat_id = %chat.id, step = "persist_chat", error = %error, "Chat persistence failed after indexing");
            return Err(error.into());
        }

        self.metrics.record_document(indexed as u64);
        tracing::info!(
            user_id,
            chat_id = %chat.id,
            pdf_name = %chat.pdf_name,
            chunks = indexed,
            "Document ingested"
        );

        Ok(chat)
    }

    /// Answer one conversation turn.
    ///
    /// Quota-exhausted turns short-circuit generation and persist a fixed reply
    /// as a normal pair, preserving conversation continuity. Retrieval or
    /// generation failures persist nothing.
    pub async fn respond(
        &self,
        chat_id: &str,
        content: &str,
        user_id: &str,
    ) -> Result<ChatTurn, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let decision = self.limiter.check(RouteCategory::ChatMessages, user_id);
        if !decision.allowed {
            tracing::info!(user_id, chat_id, "Message quota exhausted; persisting fixed reply");
            let (user_message, assistant_message) = self
                .store
                .insert_message_pair(chat_id, content, RATE_LIMIT_REPLY)
                .await?;
            self.metrics.record_rate_limited_reply();
            return Ok(ChatTurn {
                reply: RATE_LIMIT_REPLY.to_string(),
                user_message,
                assistant_message,
            });
        }

        let mut vectors = self
            .embedding
            .embed(vec![content.to_string()])
            .await
            .map_err(|error| {
                tracing::error!(user_id, chat_id, step = "embed", error = %error, "Conversation step failed");
                ChatError::Generation(error.to_string())
            })?;
        let vector = vectors
            .pop()
            .ok_or_else(|| ChatError::Generation("embedding provider returned no vectors".into()))?;
        if vector.len() != self.options.embedding_dimension {
            return Err(ChatError::Generation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.options.embedding_dimension,
                vector.len()
            )));
        }

        let retrieved = self
            .index
            .query_points(&self.options.collection, vector, chat_id, self.options.top_k)
            .await
            .map_err(|error| {
                tracing::error!(user_id, chat_id, step = "retrieve", error = %error, "Conversation step failed");
                ChatError::Generation(error.to_string())
            })?;

        let context = build_context(&retrieved);
        let user_prompt = format!("Context:\n{context}\n\nQuestion: {content}");

        let reply = self
            .generation
            .generate(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|error| {
                tracing::error!(user_id, chat_id, step = "generate", error = %error, "Conversation step failed");
                ChatError::Generation(error.to_string())
            })?;

        let (user_message, assistant_message) = self
            .store
            .insert_message_pair(chat_id, content, &reply)
            .await?;
        self.metrics.record_answer();
        tracing::info!(
            user_id,
            chat_id,
            retrieved = retrieved.len(),
            "Conversation turn answered"
        );

        Ok(ChatTurn {
            reply,
            user_message,
            assistant_message,
        })
    }

    /// List the caller's chats, gated by the list quota.
    pub async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, ChatError> {
        let decision = self.limiter.check(RouteCategory::ChatList, user_id);
        if !decision.allowed {
            return Err(ChatError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }
        Ok(self.store.chats_for_user(user_id).await?)
    }

    /// Fetch a chat's full history, gated by the history quota.
    ///
    /// Only authentication is required; chat ownership is not verified here.
    pub async fn chat_messages(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let decision = self.limiter.check(RouteCategory::ChatHistory, user_id);
        if !decision.allowed {
            return Err(ChatError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }
        Ok(self.store.messages_for_chat(chat_id).await?)
    }

    /// Return the current activity counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl ChatApi for ChatService {
    async fn ingest(
        &self,
        upload: DocumentUpload,
        user_id: &str,
    ) -> Result<ChatRecord, IngestError> {
        ChatService::ingest(self, upload, user_id).await
    }

    async fn respond(
        &self,
        chat_id: &str,
        content: &str,
        user_id: &str,
    ) -> Result<ChatTurn, ChatError> {
        ChatService::respond(self, chat_id, content, user_id).await
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, ChatError> {
        ChatService::list_chats(self, user_id).await
    }

    async fn chat_messages(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        ChatService::chat_messages(self, chat_id, user_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ChatService::metrics_snapshot(self)
    }
}

/// Render retrieved chunks into the grounding context block.
///
/// Chunks arrive sorted by descending similarity (ties by chunk index); each is
/// prefixed with its page number so the model can cite provenance.
fn build_context(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .map(|chunk| format!("Page {}:\n{}", chunk.page_number, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(page: u32, index: usize, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("pt-{index}"),
            score: 0.5,
            page_number: page,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    #[test]
    fn context_prefixes_each_chunk_with_its_page() {
        let context = build_context(&[chunk(2, 4, "second page"), chunk(1, 0, "first page")]);
        assert_eq!(context, "Page 2:\nsecond page\n\nPage 1:\nfirst page");
    }

    #[test]
    fn context_is_empty_for_no_hits() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn system_prompt_demands_grounded_answers() {
        assert!(SYSTEM_PROMPT.contains("Only use the given context"));
        assert!(SYSTEM_PROMPT.contains("not available in the document"));
    }
}
