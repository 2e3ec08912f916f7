#![allow(dead_code)]

use open_qa_backend::{Backend, BackendError, Batch, CoreBackend, RawSpan, ReaderKind, Spans};
use open_qa_backend::Annotation;
use open_qa_core::annotator::{Annotator, AnnotatorError, SimpleAnnotator};
use open_qa_core::config::PipelineConfig;
use open_qa_core::retriever::{
    DocumentStore, RankedDocument, Ranker, RankerError, StoreError,
};
use open_qa_core::workers::WorkerState;
use open_qa_core::Pipeline;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In memory documents, counting every fetch
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<HashMap<String, String>>,
    fetches: Arc<Mutex<HashMap<String, usize>>>,
    closed: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new(docs: &[(&str, &str)]) -> Self {
        let docs = docs
            .iter()
            .map(|(id, text)| (id.to_string(), text.to_string()))
            .collect();
        Self {
            docs: Arc::new(docs),
            ..Default::default()
        }
    }

    pub fn fetches(&self, doc_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(doc_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DocumentStore for MemoryStore {
    fn get_text(&self, doc_id: &str) -> Result<String, StoreError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(doc_id.to_string())
            .or_default() += 1;
        self.docs
            .get(doc_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(doc_id.to_string()))
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns a fixed ranking per query
#[derive(Debug, Default)]
pub struct FixedRanker {
    rankings: HashMap<String, Vec<RankedDocument>>,
    pub fail: bool,
}

impl FixedRanker {
    pub fn new(rankings: &[(&str, &[(&str, f32)])]) -> Self {
        let rankings = rankings
            .iter()
            .map(|(query, docs)| {
                let docs = docs
                    .iter()
                    .map(|(id, score)| RankedDocument::new(*id, *score))
                    .collect();
                (query.to_string(), docs)
            })
            .collect();
        Self {
            rankings,
            fail: false,
        }
    }
}

impl Ranker for FixedRanker {
    fn rank(&self, query: &str, k: usize) -> Result<Vec<RankedDocument>, RankerError> {
        if self.fail {
            return Err(RankerError::Unavailable("index is offline".to_string()));
        }
        let mut docs = self.rankings.get(query).cloned().unwrap_or_default();
        docs.truncate(k);
        Ok(docs)
    }
}

/// Word annotator failing on any text containing `poison`
#[derive(Debug, Clone)]
pub struct PoisonedAnnotator {
    inner: SimpleAnnotator,
    poison: &'static str,
}

impl PoisonedAnnotator {
    pub fn new(poison: &'static str) -> Self {
        Self {
            inner: SimpleAnnotator::new(),
            poison,
        }
    }
}

impl Annotator for PoisonedAnnotator {
    fn tokenize(&mut self, text: &str) -> Result<Annotation, AnnotatorError> {
        if text.contains(self.poison) {
            return Err(AnnotatorError(format!("cannot annotate `{}`", self.poison)));
        }
        self.inner.tokenize(text)
    }
}

/// Word annotator recording how many times each text is tokenized
#[derive(Debug, Clone, Default)]
pub struct CountingAnnotator {
    inner: SimpleAnnotator,
    counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl CountingAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> HashMap<String, usize> {
        self.counts.lock().unwrap().clone()
    }

    pub fn count_containing(&self, pattern: &str) -> usize {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .filter(|(text, _)| text.contains(pattern))
            .map(|(_, count)| count)
            .sum()
    }
}

impl Annotator for CountingAnnotator {
    fn tokenize(&mut self, text: &str) -> Result<Annotation, AnnotatorError> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(text.to_string())
            .or_default() += 1;
        self.inner.tokenize(text)
    }
}

/// Answers with the first passage token found in `answers`, scored by the map.
/// Spans cover `width` tokens.
#[derive(Debug, Clone)]
pub struct KeywordReader {
    kind: ReaderKind,
    answers: HashMap<String, f32>,
    width: usize,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    fail: bool,
}

impl KeywordReader {
    pub fn new(kind: ReaderKind, answers: &[(&str, f32)]) -> Self {
        Self {
            kind,
            answers: answers
                .iter()
                .map(|(word, score)| (word.to_string(), *score))
                .collect(),
            width: 1,
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn failing(kind: ReaderKind) -> Self {
        Self {
            fail: true,
            ..Self::new(kind, &[])
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl CoreBackend for KeywordReader {
    fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn kind(&self) -> ReaderKind {
        self.kind
    }

    fn predict(&self, batch: Batch) -> Result<Spans, BackendError> {
        if self.fail {
            return Err(BackendError::Inference("reader crashed".to_string()));
        }
        self.batch_sizes.lock().unwrap().push(batch.len());

        let mut spans = Spans::default();
        for (i, row) in batch.rows.iter().enumerate() {
            let offset = self.kind.passage_offset(row.question.len());
            let found = row.passage.words().into_iter().enumerate().find(|(_, word)| {
                let allowed = row
                    .candidates
                    .as_ref()
                    .map_or(true, |candidates| candidates.contains(*word));
                allowed && self.answers.contains_key(*word)
            });
            if let Some((position, word)) = found {
                spans.insert(
                    i,
                    RawSpan {
                        start: position + offset,
                        end: position + offset + self.width - 1,
                        score: self.answers[word],
                    },
                );
            }
        }
        Ok(spans)
    }
}

pub const HAMLET: &str =
    "Hamlet is a tragedy.\n\nIt was written by William Shakespeare around 1600.";
pub const MACBETH: &str = "Macbeth is a play.\nSome say it was written by Marlowe.";

pub fn pipeline(
    config: PipelineConfig,
    ranker: FixedRanker,
    store: MemoryStore,
    reader: KeywordReader,
) -> Pipeline {
    pipeline_with_annotator(config, ranker, store, reader, SimpleAnnotator::new())
}

pub fn pipeline_with_annotator<A>(
    config: PipelineConfig,
    ranker: FixedRanker,
    store: MemoryStore,
    reader: KeywordReader,
    annotator: A,
) -> Pipeline
where
    A: Annotator + Clone + Sync + 'static,
{
    let backend = Backend::from_backend(Box::new(reader));
    Pipeline::new(config, Arc::new(ranker), backend, move || {
        Ok(WorkerState::new(store.clone(), annotator.clone()))
    })
    .unwrap()
}

pub fn config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        ..Default::default()
    }
}
