/// Document ranking and storage collaborators
use thiserror::Error;

/// A document returned by the ranker for a query
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub doc_id: String,
    pub score: f32,
}

impl RankedDocument {
    pub fn new(doc_id: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

#[derive(Debug, Error)]
pub enum RankerError {
    #[error("Ranker unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed ranker response: {0}")]
    Malformed(String),
}

pub trait Ranker: Send + Sync {
    /// At most `k` documents, best first
    fn rank(&self, query: &str, k: usize) -> Result<Vec<RankedDocument>, RankerError>;

    fn rank_batch(
        &self,
        queries: &[String],
        k: usize,
    ) -> Result<Vec<Vec<RankedDocument>>, RankerError> {
        queries.iter().map(|query| self.rank(query, k)).collect()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document `{0}` not found")]
    NotFound(String),
    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

pub trait DocumentStore: Send {
    fn get_text(&self, doc_id: &str) -> Result<String, StoreError>;

    /// Release held resources. Called once when the owning worker stops.
    fn close(&mut self) {}
}
