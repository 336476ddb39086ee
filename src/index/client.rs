//! HTTP client wrapper for the Qdrant-backed vector index.

use crate::index::{
    filters::chat_filter,
    payload::{build_payload, parse_retrieved},
    types::{IndexError, QueryResponse, QueryResponseResult, RetrievedChunk, VectorEntry},
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

/// Per-request timeout applied to every index call; expiry surfaces as a
/// provider failure to the caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lightweight HTTP client for vector index operations.
///
/// All chats share one collection; logical partitioning happens through the
/// `chat_id` payload filter applied on every query.
pub struct VectorIndexClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl VectorIndexClient {
    /// Construct a new client for the given Qdrant endpoint.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, IndexError> {
        let client = Client::builder()
            .user_agent("docchat/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base_url = normalize_base_url(url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().map(|value| !value.is_empty()).unwrap_or(false),
            "Initialized vector index client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create the collection only when it is missing.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), IndexError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size).await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection ensured/created");
        })
        .await
    }

    /// Upload chunk vectors to the given collection, overwriting by point id.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        entries: Vec<VectorEntry>,
    ) -> Result<usize, IndexError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "vector": entry.vector,
                    "payload": build_payload(&entry.metadata),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Top-k similarity query scoped to one chat.
    ///
    /// Results are sorted by descending score; ties break by ascending chunk
    /// index so context assembly stays deterministic.
    pub async fn query_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "filter": chat_filter(chat_id),
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, chat_id, error = %error, "Index query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points, .. } => points,
        };

        let mut results: Vec<RetrievedChunk> = points
            .into_iter()
            .filter_map(|point| {
                parse_retrieved(stringify_point_id(point.id), point.score, point.payload)
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });

        Ok(results)
    }

    /// Ensure payload indexes exist for the fields every query filters on.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), IndexError> {
        let fields: [(&str, &str); 4] = [
            ("chat_id", "keyword"),
            ("user_id", "keyword"),
            ("page_number", "integer"),
            ("chunk_index", "integer"),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))?
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index ensured"
                );
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index already exists"
                );
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(collection = collection_name, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, IndexError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Index request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::ChunkMetadata;
    use httpmock::{Method::POST, Method::PUT, MockServer};
    use reqwest::Client;

    fn test_client(base_url: String) -> VectorIndexClient {
        VectorIndexClient {
            client: Client::builder()
                .user_agent("docchat-test")
                .build()
                .expect("client"),
            base_url,
            api_key: None,
        }
    }

    #[tokio::test]
    async fn query_points_applies_chat_filter_and_parses_hits() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/query")
                    .json_body_partial(
                        r#"{ "filter": { "must": [ { "key": "chat_id", "match": { "value": "chat-1" } } ] } }"#,
                    );
                then.status(200).json_body(serde_json::json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": [
                        {
                            "id": "pt-2",
                            "score": 0.7,
                            "payload": {
                                "chat_id": "chat-1",
                                "page_number": 2,
                                "chunk_index": 5,
                                "text": "second"
                            }
                        },
                        {
                            "id": "pt-1",
                            "score": 0.7,
                            "payload": {
                                "chat_id": "chat-1",
                                "page_number": 1,
                                "chunk_index": 2,
                                "text": "first"
                            }
                        }
                    ]
                }));
            })
            .await;

        let service = test_client(server.base_url());
        let results = service
            .query_points("docs", vec![0.1, 0.2], "chat-1", 3)
            .await
            .expect("query request");

        mock.assert();

        // equal scores break ties by ascending chunk index
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_index, 2);
        assert_eq!(results[0].text, "first");
        assert_eq!(results[1].chunk_index, 5);
    }

    #[tokio::test]
    async fn upsert_points_sends_payload_metadata() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .json_body_partial(
                        r#"{ "points": [ { "id": "pt-1", "payload": { "chat_id": "chat-1", "page_number": 1, "chunk_index": 0, "text": "body" } } ] }"#,
                    );
                then.status(200)
                    .json_body(serde_json::json!({ "status": "ok", "time": 0.0, "result": {} }));
            })
            .await;

        let service = test_client(server.base_url());
        let inserted = service
            .upsert_points(
                "docs",
                vec![VectorEntry {
                    id: "pt-1".into(),
                    vector: vec![0.5, 0.5],
                    metadata: ChunkMetadata {
                        chat_id: "chat-1".into(),
                        user_id: "user-1".into(),
                        file_key: "file-1".into(),
                        page_number: 1,
                        chunk_index: 0,
                        text: "body".into(),
                    },
                }],
            )
            .await
            .expect("upsert request");

        mock.assert();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn upsert_skips_network_for_empty_batches() {
        let service = test_client("http://127.0.0.1:1".into());
        let inserted = service.upsert_points("docs", Vec::new()).await.expect("noop");
        assert_eq!(inserted, 0);
    }
}
