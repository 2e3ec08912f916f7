/// Scoring units handed to the reader
use crate::index::IdentityIndex;
use crate::retriever::RankedDocument;
use open_qa_backend::{Annotation, Candidates};
use std::sync::Arc;

/// Correlates a scoring unit back to its origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExampleKey {
    /// Position of the question in the batch
    pub query: usize,
    /// Rank of the document for that question
    pub doc_rank: usize,
    /// Position in the flattened passage list
    pub passage: usize,
}

#[derive(Debug, Clone)]
pub struct Example {
    pub key: ExampleKey,
    pub question: Arc<Annotation>,
    pub passage: Arc<Annotation>,
    pub candidates: Option<Arc<Candidates>>,
}

/// Emit one example per (query, ranked document, passage) whose question and passage
/// annotations are both non-empty
pub fn build_examples(
    rankings: &[Vec<RankedDocument>],
    index: &IdentityIndex,
    questions: &[Arc<Annotation>],
    passages: &[Arc<Annotation>],
    candidates: &[Option<Arc<Candidates>>],
) -> Vec<Example> {
    let mut examples = Vec::new();
    for (query, ranked) in rankings.iter().enumerate() {
        let question = &questions[query];
        if question.is_empty() {
            continue;
        }
        for (doc_rank, document) in ranked.iter().enumerate() {
            let Some(range) = index.passage_range(&document.doc_id) else {
                continue;
            };
            for passage in range {
                if passages[passage].is_empty() {
                    continue;
                }
                examples.push(Example {
                    key: ExampleKey {
                        query,
                        doc_rank,
                        passage,
                    },
                    question: question.clone(),
                    passage: passages[passage].clone(),
                    candidates: candidates.get(query).cloned().flatten(),
                });
            }
        }
    }
    examples
}
