use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and conversation activity.
#[derive(Default)]
pub struct ChatMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    messages_answered: AtomicU64,
    rate_limited_replies: AtomicU64,
}

impl ChatMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks indexed for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a conversation turn answered through retrieval and generation.
    pub fn record_answer(&self) {
        self.messages_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a turn that was short-circuited by the message quota.
    pub fn record_rate_limited_reply(&self) {
        self.rate_limited_replies.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            messages_answered: self.messages_answered.load(Ordering::Relaxed),
            rate_limited_replies: self.rate_limited_replies.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the activity counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of PDFs ingested since startup.
    pub documents_ingested: u64,
    /// Total chunk count indexed across all documents.
    pub chunks_indexed: u64,
    /// Conversation turns answered via retrieval and generation.
    pub messages_answered: u64,
    /// Conversation turns answered with the fixed quota reply.
    pub rate_limited_replies: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = ChatMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn records_conversation_outcomes() {
        let metrics = ChatMetrics::new();
        metrics.record_answer();
        metrics.record_answer();
        metrics.record_rate_limited_reply();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_answered, 2);
        assert_eq!(snapshot.rate_limited_replies, 1);
    }
}
