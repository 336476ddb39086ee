//! Helpers for constructing and parsing index payloads.

use crate::index::types::{ChunkMetadata, RetrievedChunk};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(metadata: &ChunkMetadata) -> Value {
    json!({
        "chat_id": metadata.chat_id,
        "user_id": metadata.user_id,
        "file_key": metadata.file_key,
        "page_number": metadata.page_number,
        "chunk_index": metadata.chunk_index,
        "text": metadata.text,
    })
}

/// Reconstruct a retrieved chunk from a scored point's payload.
///
/// Returns `None` when the payload is missing the fields this crate writes,
/// which would indicate foreign data in the collection.
pub(crate) fn parse_retrieved(
    id: String,
    score: f32,
    payload: Option<Map<String, Value>>,
) -> Option<RetrievedChunk> {
    let payload = payload?;
    let page_number = payload.get("page_number")?.as_u64()? as u32;
    let chunk_index = payload.get("chunk_index")?.as_u64()? as usize;
    let text = payload.get("text")?.as_str()?.to_string();

    Some(RetrievedChunk {
        id,
        score,
        page_number,
        chunk_index,
        text,
    })
}

/// Construct a fresh point identifier suitable for the index.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ChunkMetadata {
        ChunkMetadata {
            chat_id: "chat-1".into(),
            user_id: "user-1".into(),
            file_key: "file-1".into(),
            page_number: 3,
            chunk_index: 7,
            text: "sample".into(),
        }
    }

    #[test]
    fn payload_round_trips_through_parse() {
        let payload = build_payload(&metadata());
        let map = payload.as_object().expect("object payload").clone();
        let retrieved =
            parse_retrieved("pt-1".into(), 0.9, Some(map)).expect("parsed chunk");

        assert_eq!(retrieved.page_number, 3);
        assert_eq!(retrieved.chunk_index, 7);
        assert_eq!(retrieved.text, "sample");
    }

    #[test]
    fn parse_rejects_foreign_payloads() {
        let mut map = Map::new();
        map.insert("something_else".into(), Value::String("x".into()));
        assert!(parse_retrieved("pt-1".into(), 0.5, Some(map)).is_none());
        assert!(parse_retrieved("pt-2".into(), 0.5, None).is_none());
    }

    #[test]
    fn point_ids_are_unique() {
        assert_ne!(generate_point_id(), generate_point_id());
    }
}
