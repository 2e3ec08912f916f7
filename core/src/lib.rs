pub mod annotator;
pub mod batching;
pub mod config;
pub mod decode;
pub mod example;
pub mod index;
mod infer;
pub mod pipeline;
pub mod retriever;
pub mod splitter;
pub mod topk;
pub mod workers;

use open_qa_backend::BackendError;
use std::fmt;
use thiserror::Error;

pub use pipeline::Pipeline;

/// Unit whose annotation failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationUnit {
    Query(usize),
    Passage { index: usize, doc_id: String },
}

impl fmt::Display for AnnotationUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnnotationUnit::Query(index) => write!(f, "query {index}"),
            AnnotationUnit::Passage { index, doc_id } => {
                write!(f, "passage {index} of document `{doc_id}`")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Retrieval error: {0}")]
    Retrieval(String),
    #[error("Document `{0}` not found")]
    NotFound(String),
    #[error("Annotation error on {unit}: {message}")]
    Annotation {
        unit: AnnotationUnit,
        message: String,
    },
    #[error("Inference error on batch {batch}: {source}")]
    Inference {
        batch: usize,
        #[source]
        source: BackendError,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Annotation workers are shut down")]
    WorkersShutdown,
}

impl QaError {
    /// Label used for the `err` dimension of failure metrics
    pub fn kind(&self) -> &'static str {
        match self {
            QaError::Retrieval(_) => "retrieval",
            QaError::NotFound(_) => "not_found",
            QaError::Annotation { .. } => "annotation",
            QaError::Inference { .. } => "inference",
            QaError::Configuration(_) => "configuration",
            QaError::WorkersShutdown => "shutdown",
        }
    }
}
