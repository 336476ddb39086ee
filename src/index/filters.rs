//! Filter helpers for index queries.

use serde_json::{Value, json};

/// Compose the hard equality filter that scopes a query to one chat's chunks.
///
/// Every retrieval query carries this filter, so a chat can never surface
/// another document's content regardless of similarity.
pub fn chat_filter(chat_id: &str) -> Value {
    json!({
        "must": [
            {
                "key": "chat_id",
                "match": { "value": chat_id }
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_filter_matches_exact_id() {
        assert_eq!(
            chat_filter("chat-42"),
            json!({
                "must": [
                    {
                        "key": "chat_id",
                        "match": { "value": "chat-42" }
                    }
                ]
            })
        );
    }
}
