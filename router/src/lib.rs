/// Open domain question answering over a local corpus
mod annotator;
mod logging;
mod prometheus;
mod ranker;
mod store;

pub use annotator::TokenizerAnnotator;
pub use logging::init_logging;
pub use ranker::Bm25Ranker;
pub use store::JsonlDocStore;

use anyhow::{Context, Result};
use open_qa_backend::{Backend, Candidates, ReaderConfig, ReaderKind};
use open_qa_core::annotator::SimpleAnnotator;
use open_qa_core::config::{GroupLength, PipelineConfig, ProcessOptions};
use open_qa_core::decode::Prediction;
use open_qa_core::workers::WorkerState;
use open_qa_core::Pipeline;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A question read from the input file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Question {
    pub question: String,
    #[serde(default)]
    pub candidates: Option<Vec<String>>,
}

#[derive(Serialize)]
struct Answer<'a> {
    question: &'a str,
    predictions: &'a [Prediction],
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    corpus: PathBuf,
    tokenizer: Option<PathBuf>,
    reader_url: String,
    reader_kind: ReaderKind,
    reader_api_key: Option<String>,
    reader_timeout: Duration,
    batch_size: usize,
    group_length: GroupLength,
    workers: Option<usize>,
    top_n: usize,
    n_docs: usize,
    return_context: bool,
    candidates_file: Option<PathBuf>,
    query_batch_size: usize,
    input: PathBuf,
    output: Option<PathBuf>,
    prometheus_port: u16,
) -> Result<()> {
    if query_batch_size == 0 {
        anyhow::bail!("`query_batch_size` must be greater than 0");
    }

    // Load the corpus and index it
    let start_time = Instant::now();
    let store = JsonlDocStore::open(&corpus)?;
    if store.is_empty() {
        tracing::warn!("Corpus {corpus:?} is empty");
    }
    let ranker = Bm25Ranker::new(store.documents()).context("Could not build the BM25 index")?;
    tracing::info!(
        "Loaded {} documents in {:?}",
        store.len(),
        start_time.elapsed()
    );

    let annotator = tokenizer
        .map(|path| TokenizerAnnotator::from_file(&path))
        .transpose()?;
    if annotator.is_none() {
        tracing::info!("No tokenizer given, using the word annotator");
    }

    let fixed_candidates = candidates_file
        .map(|path| read_candidates(&path))
        .transpose()?
        .map(Arc::new);

    // Reader
    let backend = Backend::new(ReaderConfig::Remote {
        url: reader_url,
        kind: reader_kind,
        api_key: reader_api_key,
        timeout: reader_timeout,
    })
    .context("Could not create reader backend")?;
    backend
        .health()
        .await
        .context("Reader backend is not healthy")?;
    tracing::info!("Reader {reader_kind} is ready");

    let mut config = PipelineConfig {
        batch_size,
        group_length,
        fixed_candidates,
        ..Default::default()
    };
    if let Some(workers) = workers {
        config.workers = workers;
    }

    let pipeline = Pipeline::new(config, Arc::new(ranker), backend, move || {
        let store = store.clone();
        Ok(match &annotator {
            Some(annotator) => WorkerState::new(store, annotator.clone()),
            None => WorkerState::new(store, SimpleAnnotator::new()),
        })
    })?;
    tracing::info!(
        "Pipeline ready: {} reader, {} workers, batch size {}",
        pipeline.reader_kind(),
        pipeline.config().workers,
        pipeline.batch_size()
    );

    // Metrics
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), prometheus_port);
    prometheus::prometheus_builder(addr, prometheus_port, pipeline.batch_size())?
        .install()
        .context("failed to install metrics recorder")?;

    let options = ProcessOptions {
        top_n,
        n_docs,
        return_context,
    };

    let questions = read_questions(&input)?;
    tracing::info!("Read {} questions from {input:?}", questions.len());

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {path:?}"))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let start_time = Instant::now();
    let result = answer_all(&pipeline, &questions, query_batch_size, options, &mut writer).await;
    // Joining the worker threads blocks
    let workers = pipeline.clone();
    tokio::task::spawn_blocking(move || workers.shutdown())
        .await
        .context("Annotation worker shutdown panicked")?;
    result?;
    writer.flush()?;

    tracing::info!(
        "Answered {} questions in {:.4} (s)",
        questions.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn answer_all(
    pipeline: &Pipeline,
    questions: &[Question],
    query_batch_size: usize,
    options: ProcessOptions,
    writer: &mut impl Write,
) -> Result<()> {
    for chunk in questions.chunks(query_batch_size) {
        let queries: Vec<String> = chunk.iter().map(|q| q.question.clone()).collect();
        let candidates = chunk
            .iter()
            .any(|q| q.candidates.is_some())
            .then(|| {
                chunk
                    .iter()
                    .map(|q| q.candidates.as_ref().map(|c| c.iter().cloned().collect()))
                    .collect()
            });

        let predictions = match pipeline.process_batch(&queries, candidates, options).await {
            Ok(predictions) => predictions,
            Err(err) if !pipeline.is_healthy() => {
                return Err(anyhow::Error::new(err).context("Reader is unhealthy"));
            }
            Err(err) => return Err(err.into()),
        };

        for (question, predictions) in queries.iter().zip(&predictions) {
            let answer = Answer {
                question,
                predictions,
            };
            serde_json::to_writer(&mut *writer, &answer)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Read questions, one per line. Lines starting with `{` are parsed as
/// `{"question": ..., "candidates": [...]}` objects.
pub fn read_questions(path: &Path) -> Result<Vec<Question>> {
    let file = File::open(path).with_context(|| format!("Could not open {path:?}"))?;

    let mut questions = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let question = if line.starts_with('{') {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid question on line {}", i + 1))?
        } else {
            Question {
                question: line.to_string(),
                candidates: None,
            }
        };
        questions.push(question);
    }
    Ok(questions)
}

/// Read an answer restriction list, one candidate per line
pub fn read_candidates(path: &Path) -> Result<Candidates> {
    let file = File::open(path).with_context(|| format!("Could not open {path:?}"))?;

    let mut candidates = Candidates::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let candidate = line.trim();
        if !candidate.is_empty() {
            candidates.insert(candidate.to_string());
        }
    }
    tracing::info!("Loaded {} candidates", candidates.len());
    Ok(candidates)
}
