//! HTTP surface for DocChat.
//!
//! This module exposes a compact Axum router over the chat pipeline:
//!
//! - `POST /chats` – Upload a PDF (multipart `file` field), creating a chat whose
//!   chunks are embedded and indexed for retrieval.
//! - `GET /chats` – List the caller's chats, newest first.
//! - `GET /chats/:chat_id/messages` – Fetch a chat's message history in
//!   conversation order.
//! - `POST /chats/:chat_id/messages` – Send a message and receive a
//!   document-grounded reply.
//! - `GET /metrics` – Observe ingestion and conversation counters.
//!
//! Every chat route requires an `x-user-id` header carrying the verified user
//! identity; requests without one are rejected with `401`.

use crate::service::{ChatApi, ChatError, ChatTurn, DocumentUpload, IngestError};
use crate::store::{ChatRecord, MessageRecord};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header::RETRY_AFTER, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Largest accepted upload, in bytes.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the HTTP router exposing the chat API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ChatApi + 'static,
{
    Router::new()
        .route("/chats", get(list_chats::<S>).post(create_chat::<S>))
        .route(
            "/chats/:chat_id/messages",
            get(get_messages::<S>).post(send_message::<S>),
        )
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Verified caller identity taken from the `x-user-id` header.
struct AuthedUser(String);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Create a chat from a multipart PDF upload.
///
/// The upload arrives as a `file` field; its declared content type must be
/// `application/pdf`. On success the persisted chat row is returned with `201`.
async fn create_chat<S>(
    State(service): State<Arc<S>>,
    user: AuthedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ChatRecord>), ApiError>
where
    S: ChatApi,
{
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::InvalidInput(error.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(ToString::to_string)
            .unwrap_or_else(|| "upload.pdf".to_string());
        let content_type = field
            .content_type()
            .map(ToString::to_string)
            .unwrap_or_default();
        let bytes = field
            .bytes()
            .await
            .map_err(|error| ApiError::InvalidInput(error.to_string()))?;
        upload = Some(DocumentUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let upload = upload
        .ok_or_else(|| ApiError::InvalidInput("multipart field 'file' is required".to_string()))?;

    let chat = service.ingest(upload, &user.0).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

/// List the caller's chats.
async fn list_chats<S>(
    State(service): State<Arc<S>>,
    user: AuthedUser,
) -> Result<Json<Vec<ChatRecord>>, ApiError>
where
    S: ChatApi,
{
    let chats = service.list_chats(&user.0).await?;
    Ok(Json(chats))
}

/// Fetch a chat's message history in conversation order.
async fn get_messages<S>(
    State(service): State<Arc<S>>,
    user: AuthedUser,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ApiError>
where
    S: ChatApi,
{
    let messages = service.chat_messages(&chat_id, &user.0).await?;
    Ok(Json(messages))
}

/// Request body for `POST /chats/:chat_id/messages`.
#[derive(Deserialize)]
struct SendMessageRequest {
    /// The user's question.
    content: String,
}

/// Response body for `POST /chats/:chat_id/messages`.
#[derive(Serialize)]
struct SendMessageResponse {
    /// Assistant reply text.
    reply: String,
    /// The persisted user and assistant rows for this turn.
    messages: [MessageRecord; 2],
}

impl From<ChatTurn> for SendMessageResponse {
    fn from(turn: ChatTurn) -> Self {
        Self {
            reply: turn.reply,
            messages: [turn.user_message, turn.assistant_message],
        }
    }
}

/// Send a message to a chat and return the grounded reply.
async fn send_message<S>(
    State(service): State<Arc<S>>,
    user: AuthedUser,
    Path(chat_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError>
where
    S: ChatApi,
{
    let turn = service.respond(&chat_id, &request.content, &user.0).await?;
    Ok(Json(turn.into()))
}

/// Return the current activity counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: ChatApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// API-level error with an HTTP status mapping.
enum ApiError {
    Unauthenticated,
    InvalidInput(String),
    RateLimited { retry_after_seconds: u64 },
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Missing or empty x-user-id header".to_string(),
            ),
            Self::InvalidInput(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::RateLimited {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Rate limit exceeded; retry in {retry_after_seconds}s"),
            ),
            Self::Upstream(message) => (StatusCode::BAD_GATEWAY, message.clone()),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.clone()),
        };

        let body = Json(json!({ "error": message }));
        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            (
                status,
                [(RETRY_AFTER, retry_after_seconds.to_string())],
                body,
            )
                .into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::RateLimited {
                retry_after_seconds,
            } => Self::RateLimited {
                retry_after_seconds,
            },
            IngestError::InvalidFileType
            | IngestError::EmptyDocument
            | IngestError::UnreadablePdf(_) => Self::InvalidInput(error.to_string()),
            IngestError::Provider(_) | IngestError::Index(_) => Self::Upstream(error.to_string()),
            IngestError::Chunking(_) | IngestError::Storage(_) | IngestError::Persistence(_) => {
                Self::Internal(error.to_string())
            }
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::EmptyMessage => Self::InvalidInput(error.to_string()),
            ChatError::RateLimited {
                retry_after_seconds,
            } => Self::RateLimited {
                retry_after_seconds,
            },
            ChatError::Generation(_) => Self::Upstream(error.to_string()),
            ChatError::Persistence(_) => Self::Internal(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::service::{ChatApi, ChatError, ChatTurn, DocumentUpload, IngestError};
    use crate::store::{ChatRecord, MessageRecord, Role};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docchat-test-boundary";

    fn multipart_pdf_body(file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\ncontent-disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\ncontent-type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn message(chat_id: &str, role: Role, content: &str, created_at: i64) -> MessageRecord {
        MessageRecord {
            id: format!("msg-{created_at}"),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            role,
            created_at,
        }
    }

    fn stub_chat(user_id: &str) -> ChatRecord {
        ChatRecord::new(
            "report.pdf".to_string(),
            "docchat/user/report.pdf".to_string(),
            "http://localhost/files/docchat/user/report.pdf".to_string(),
            user_id.to_string(),
            "filekey".to_string(),
        )
    }

    #[tokio::test]
    async fn chat_routes_reject_requests_without_user_header() {
        let app = create_router(Arc::new(StubChatService::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/chats")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert!(json["error"].as_str().expect("error message").contains("x-user-id"));
    }

    #[tokio::test]
    async fn upload_route_hands_the_file_field_to_the_service() {
        let service = Arc::new(StubChatService::default());
        let app = create_router(service.clone());

        let body = multipart_pdf_body("report.pdf", "application/pdf", b"%PDF-1.4 fake");
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/chats")
                    .header("x-user-id", "user-7")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["pdf_name"], "report.pdf");
        assert_eq!(json["user_id"], "user-7");

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0.file_name, "report.pdf");
        assert_eq!(uploads[0].0.content_type, "application/pdf");
        assert_eq!(uploads[0].0.bytes, b"%PDF-1.4 fake");
        assert_eq!(uploads[0].1, "user-7");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_a_bad_request() {
        let app = create_router(Arc::new(StubChatService::default()));
        let body = format!(
            "--{BOUNDARY}\r\ncontent-disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n"
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/chats")
                    .header("x-user-id", "user-7")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn message_route_returns_the_reply_and_persisted_pair() {
        let service = Arc::new(StubChatService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/chats/chat-1/messages")
                    .header("x-user-id", "user-7")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"content":"What is on page 2?"}"#))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["reply"], "stub reply");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "system");

        let turns = service.turns.lock().await;
        assert_eq!(turns.as_slice(), [("chat-1".to_string(), "What is on page 2?".to_string())]);
    }

    #[tokio::test]
    async fn quota_exhaustion_maps_to_429_with_retry_after() {
        let service = Arc::new(StubChatService {
            deny_uploads: true,
            ..StubChatService::default()
        });
        let app = create_router(service);

        let body = multipart_pdf_body("report.pdf", "application/pdf", b"%PDF-1.4 fake");
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/chats")
                    .header("x-user-id", "user-7")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok()),
            Some("120")
        );
    }

    #[tokio::test]
    async fn metrics_route_reports_counters_without_auth() {
        let app = create_router(Arc::new(StubChatService::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["documents_ingested"], 3);
    }

    #[derive(Default)]
    struct StubChatService {
        uploads: Mutex<Vec<(DocumentUpload, String)>>,
        turns: Mutex<Vec<(String, String)>>,
        deny_uploads: bool,
    }

    #[async_trait]
    impl ChatApi for StubChatService {
        async fn ingest(
            &self,
            upload: DocumentUpload,
            user_id: &str,
        ) -> Result<ChatRecord, IngestError> {
            if self.deny_uploads {
                return Err(IngestError::RateLimited {
                    retry_after_seconds: 120,
                });
            }
            let chat = stub_chat(user_id);
            self.uploads.lock().await.push((upload, user_id.to_string()));
            Ok(chat)
        }

        async fn respond(
            &self,
            chat_id: &str,
            content: &str,
            _user_id: &str,
        ) -> Result<ChatTurn, ChatError> {
            self.turns
                .lock()
                .await
                .push((chat_id.to_string(), content.to_string()));
            Ok(ChatTurn {
                reply: "stub reply".to_string(),
                user_message: message(chat_id, Role::User, content, 1),
                assistant_message: message(chat_id, Role::System, "stub reply", 2),
            })
        }

        async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, ChatError> {
            Ok(vec![stub_chat(user_id)])
        }

        async fn chat_messages(
            &self,
            chat_id: &str,
            _user_id: &str,
        ) -> Result<Vec<MessageRecord>, ChatError> {
            Ok(vec![
                message(chat_id, Role::User, "question", 1),
                message(chat_id, Role::System, "answer", 2),
            ])
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 3,
                chunks_indexed: 12,
                messages_answered: 5,
                rate_limited_replies: 1,
            }
        }
    }
}
