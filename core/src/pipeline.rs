/// Question answering pipeline
use crate::batching::Batcher;
use crate::config::{PipelineConfig, ProcessOptions};
use crate::decode::{self, Prediction};
use crate::example::build_examples;
use crate::index::IdentityIndex;
use crate::infer;
use crate::retriever::{RankedDocument, Ranker};
use crate::topk::Aggregator;
use crate::workers::{WorkerState, Workers};
use crate::{AnnotationUnit, QaError};
use open_qa_backend::{Annotation, Backend, Candidates, ReaderKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Retrieve, split, annotate, read and rank answers for batches of questions
#[derive(Clone)]
pub struct Pipeline {
    ranker: Arc<dyn Ranker>,
    workers: Workers,
    backend: Backend,
    batcher: Batcher,
    config: PipelineConfig,
}

impl Pipeline {
    /// `worker_factory` builds the document store and annotator of each annotation worker
    pub fn new<F>(
        config: PipelineConfig,
        ranker: Arc<dyn Ranker>,
        backend: Backend,
        worker_factory: F,
    ) -> Result<Self, QaError>
    where
        F: Fn() -> Result<WorkerState, QaError> + Send + Sync + 'static,
    {
        config.validate()?;

        let batch_size = match backend.max_batch_size {
            Some(max_batch_size) if max_batch_size < config.batch_size => {
                tracing::warn!(
                    "Reader supports batches of at most {max_batch_size}, lowering batch size"
                );
                max_batch_size
            }
            _ => config.batch_size,
        };
        let batcher = Batcher::new(batch_size, config.shuffle_batches);
        let workers = Workers::new(config.workers, worker_factory)?;

        Ok(Self {
            ranker,
            workers,
            backend,
            batcher,
            config,
        })
    }

    pub fn reader_kind(&self) -> ReaderKind {
        self.backend.kind
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Effective reader batch size, after capping to what the reader supports
    pub fn batch_size(&self) -> usize {
        self.batcher.batch_size()
    }

    /// Outcome of the last reader call
    pub fn is_healthy(&self) -> bool {
        *self.backend.health_watcher().borrow()
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> bool {
        self.backend.health().await.is_ok()
    }

    /// Answer a single question
    #[instrument(skip(self, candidates))]
    pub async fn process(
        &self,
        query: &str,
        candidates: Option<Candidates>,
        options: ProcessOptions,
    ) -> Result<Vec<Prediction>, QaError> {
        let candidates = candidates
            .filter(|candidates| !candidates.is_empty())
            .map(|candidates| vec![Some(candidates)]);
        let mut predictions = self
            .process_batch(&[query.to_string()], candidates, options)
            .await?;
        Ok(predictions.pop().unwrap_or_default())
    }

    /// Answer a batch of questions. Returns one prediction list per question, in input order.
    #[instrument(skip_all, fields(queries = queries.len()))]
    pub async fn process_batch(
        &self,
        queries: &[String],
        candidates: Option<Vec<Option<Candidates>>>,
        options: ProcessOptions,
    ) -> Result<Vec<Vec<Prediction>>, QaError> {
        let start_time = Instant::now();
        let counter = metrics::counter!("qa_batch_count");
        counter.increment(1);

        let result = self.run(queries, candidates, options).await;
        match &result {
            Ok(_) => {
                let counter = metrics::counter!("qa_batch_success");
                counter.increment(1);
                let histogram = metrics::histogram!("qa_batch_duration");
                histogram.record(start_time.elapsed().as_secs_f64());
                tracing::info!(
                    "Processed {} queries in {:.4} (s)",
                    queries.len(),
                    start_time.elapsed().as_secs_f64()
                );
            }
            Err(err) => {
                let counter = metrics::counter!("qa_request_failure", "err" => err.kind());
                counter.increment(1);
                tracing::error!("{err}");
            }
        }
        result
    }

    /// Stop the annotation workers and release their resources
    pub fn shutdown(&self) {
        self.workers.shutdown();
    }

    async fn run(
        &self,
        queries: &[String],
        candidates: Option<Vec<Option<Candidates>>>,
        options: ProcessOptions,
    ) -> Result<Vec<Vec<Prediction>>, QaError> {
        options.validate()?;
        if let Some(candidates) = &candidates {
            if candidates.len() != queries.len() {
                return Err(QaError::Configuration(format!(
                    "`candidates` has {} entries for {} queries",
                    candidates.len(),
                    queries.len()
                )));
            }
        }
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!("Processing {} queries...", queries.len());
        tracing::info!("Retrieving top {} docs...", options.n_docs);

        // Rank documents
        let retrieval_start = Instant::now();
        let rankings = self.rank(queries, options.n_docs).await?;

        // Fetch every distinct document once and flatten its passages
        let mut index = IdentityIndex::new(&rankings);
        let texts = self.workers.fetch_all(index.doc_ids()).await?;
        let passages = index.flatten(&texts, self.config.group_length);
        drop(texts);
        let histogram = metrics::histogram!("qa_retrieval_duration");
        histogram.record(retrieval_start.elapsed().as_secs_f64());
        let histogram = metrics::histogram!("qa_passages_per_batch");
        histogram.record(passages.len() as f64);

        // Questions and passages are tokenized concurrently
        let annotation_start = Instant::now();
        let (questions, passages) = tokio::join!(
            self.workers
                .tokenize_all(queries.to_vec(), AnnotationUnit::Query),
            self.workers.tokenize_all(passages, |i| AnnotationUnit::Passage {
                index: i,
                doc_id: index.owner(i).unwrap_or_default().to_string(),
            }),
        );
        let questions: Vec<Arc<Annotation>> = questions?.into_iter().map(Arc::new).collect();
        let passages: Vec<Arc<Annotation>> = passages?.into_iter().map(Arc::new).collect();
        let histogram = metrics::histogram!("qa_annotation_duration");
        histogram.record(annotation_start.elapsed().as_secs_f64());

        // An empty candidate set places no restriction
        let fixed = self
            .config
            .fixed_candidates
            .clone()
            .filter(|c| !c.is_empty());
        let candidates: Vec<Option<Arc<Candidates>>> = match candidates {
            Some(candidates) => candidates
                .into_iter()
                .map(|c| {
                    c.filter(|c| !c.is_empty())
                        .map(Arc::new)
                        .or_else(|| fixed.clone())
                })
                .collect(),
            None => vec![fixed; queries.len()],
        };

        let examples = build_examples(&rankings, &index, &questions, &passages, &candidates);
        tracing::info!("Reading {} paragraphs...", examples.len());
        let histogram = metrics::histogram!("qa_examples_per_batch");
        histogram.record(examples.len() as f64);

        // Score and keep the best spans of every query
        let batches = self.batcher.batches(examples);
        let mut aggregator = Aggregator::new(queries.len(), options.top_n);
        infer::read(
            &self.backend,
            batches,
            self.config.max_reader_lookahead,
            &mut aggregator,
        )
        .await?;

        Ok(decode::predictions(
            aggregator.into_ranked(),
            decode::decoder(self.backend.kind),
            &rankings,
            &questions,
            &passages,
            options.return_context,
        ))
    }

    async fn rank(
        &self,
        queries: &[String],
        k: usize,
    ) -> Result<Vec<Vec<RankedDocument>>, QaError> {
        let ranker = self.ranker.clone();
        let inputs = queries.to_vec();
        let rankings = tokio::task::spawn_blocking(move || {
            if inputs.len() == 1 {
                ranker.rank(&inputs[0], k).map(|ranked| vec![ranked])
            } else {
                ranker.rank_batch(&inputs, k)
            }
        })
        .await
        .expect("Ranking task panicked. This is a bug.")
        .map_err(|err| QaError::Retrieval(err.to_string()))?;

        if rankings.len() != queries.len() {
            return Err(QaError::Retrieval(format!(
                "ranker returned {} rankings for {} queries",
                rankings.len(),
                queries.len()
            )));
        }
        if let Some((query, ranked)) = rankings.iter().enumerate().find(|(_, r)| r.len() > k) {
            return Err(QaError::Retrieval(format!(
                "ranker returned {} documents for query {query}, expected at most {k}",
                ranked.len()
            )));
        }
        Ok(rankings)
    }
}
