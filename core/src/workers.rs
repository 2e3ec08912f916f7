/// Document fetching and annotation worker pool
use crate::annotator::{Annotator, AnnotatorError};
use crate::retriever::{DocumentStore, StoreError};
use crate::{AnnotationUnit, QaError};
use open_qa_backend::Annotation;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{instrument, Span};

/// State owned by a single worker
pub struct WorkerState {
    pub store: Box<dyn DocumentStore>,
    pub annotator: Box<dyn Annotator>,
}

impl WorkerState {
    pub fn new(store: impl DocumentStore + 'static, annotator: impl Annotator + 'static) -> Self {
        Self {
            store: Box::new(store),
            annotator: Box::new(annotator),
        }
    }

    fn shutdown(&mut self) {
        self.annotator.shutdown();
        self.store.close();
    }
}

/// Builds the state of one worker. Called once on each worker thread at startup.
pub type WorkerFactory = dyn Fn() -> Result<WorkerState, QaError> + Send + Sync;

#[derive(Debug, Clone)]
pub struct Workers {
    /// Channel to communicate with the worker threads
    sender: async_channel::Sender<WorkerRequest>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Workers {
    pub fn new<F>(workers: usize, factory: F) -> Result<Self, QaError>
    where
        F: Fn() -> Result<WorkerState, QaError> + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(QaError::Configuration(
                "`workers` must be greater than 0".to_string(),
            ));
        }
        tracing::info!("Starting {workers} annotation workers");

        let factory: Arc<WorkerFactory> = Arc::new(factory);
        let (sender, receiver) = async_channel::bounded(workers * 4);
        let (ready_sender, ready_receiver) = mpsc::channel();

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let factory_clone = factory.clone();
            let receiver_clone = receiver.clone();
            let ready_clone = ready_sender.clone();
            handles.push(std::thread::spawn(move || {
                worker(index, factory_clone, receiver_clone, ready_clone)
            }));
        }
        drop(ready_sender);

        let pool = Self {
            sender,
            handles: Arc::new(Mutex::new(handles)),
        };

        // Wait for every worker to build its state
        for _ in 0..workers {
            match ready_receiver.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    pool.shutdown();
                    return Err(err);
                }
                Err(_) => {
                    pool.shutdown();
                    return Err(QaError::Configuration(
                        "Annotation worker stopped during startup".to_string(),
                    ));
                }
            }
        }

        Ok(pool)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, doc_id: String) -> Result<String, QaError> {
        let receiver = self.submit_fetch(doc_id.clone()).await?;
        receive(receiver).await.map_err(|err| store_error(&doc_id, err))
    }

    #[instrument(skip_all)]
    pub async fn tokenize(&self, text: String) -> Result<Annotation, AnnotatorError> {
        let receiver = self
            .submit_tokenize(text)
            .await
            .map_err(|err| AnnotatorError(err.to_string()))?;
        receive(receiver).await
    }

    /// Fetch every document, results in input order
    #[instrument(skip_all, fields(documents = doc_ids.len()))]
    pub async fn fetch_all(&self, doc_ids: &[String]) -> Result<Vec<String>, QaError> {
        // Submit everything first so that all workers are kept busy
        let mut receivers = Vec::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            receivers.push(self.submit_fetch(doc_id.clone()).await?);
        }

        let mut texts = Vec::with_capacity(doc_ids.len());
        for (doc_id, receiver) in doc_ids.iter().zip(receivers) {
            texts.push(receive(receiver).await.map_err(|err| store_error(doc_id, err))?);
        }
        Ok(texts)
    }

    /// Tokenize every text, results in input order. `unit` names the failing input.
    #[instrument(skip_all, fields(texts = texts.len()))]
    pub async fn tokenize_all<U>(
        &self,
        texts: Vec<String>,
        unit: U,
    ) -> Result<Vec<Annotation>, QaError>
    where
        U: Fn(usize) -> AnnotationUnit,
    {
        let mut receivers = Vec::with_capacity(texts.len());
        for text in texts {
            receivers.push(self.submit_tokenize(text).await?);
        }

        let mut annotations = Vec::with_capacity(receivers.len());
        for (i, receiver) in receivers.into_iter().enumerate() {
            let annotation = receive(receiver).await.map_err(|err| QaError::Annotation {
                unit: unit(i),
                message: err.to_string(),
            })?;
            annotations.push(annotation);
        }
        Ok(annotations)
    }

    /// Stop accepting jobs, drain the queue and run every worker's cleanup hook
    pub fn shutdown(&self) {
        self.sender.close();
        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Annotation worker panicked");
            }
        }
    }

    async fn submit_fetch(
        &self,
        doc_id: String,
    ) -> Result<oneshot::Receiver<Result<String, StoreError>>, QaError> {
        let (response_sender, response_receiver) = oneshot::channel();
        self.sender
            .send(WorkerRequest::Fetch(doc_id, response_sender, Span::current()))
            .await
            .map_err(|_| QaError::WorkersShutdown)?;
        Ok(response_receiver)
    }

    async fn submit_tokenize(
        &self,
        text: String,
    ) -> Result<oneshot::Receiver<Result<Annotation, AnnotatorError>>, QaError> {
        let (response_sender, response_receiver) = oneshot::channel();
        self.sender
            .send(WorkerRequest::Tokenize(text, response_sender, Span::current()))
            .await
            .map_err(|_| QaError::WorkersShutdown)?;
        Ok(response_receiver)
    }
}

async fn receive<T>(receiver: oneshot::Receiver<T>) -> T {
    receiver.await.expect(
        "Annotation worker dropped the sender without sending a response. This is a bug.",
    )
}

fn store_error(doc_id: &str, err: StoreError) -> QaError {
    match err {
        StoreError::NotFound(_) => QaError::NotFound(doc_id.to_string()),
        StoreError::Unavailable(message) => {
            QaError::Retrieval(format!("could not fetch `{doc_id}`: {message}"))
        }
    }
}

fn worker(
    index: usize,
    factory: Arc<WorkerFactory>,
    receiver: async_channel::Receiver<WorkerRequest>,
    ready: mpsc::Sender<Result<(), QaError>>,
) {
    let mut state = match factory() {
        Ok(state) => {
            let _ = ready.send(Ok(()));
            state
        }
        Err(err) => {
            tracing::error!("Annotation worker {index} failed to start: {err}");
            let _ = ready.send(Err(err));
            return;
        }
    };
    drop(ready);

    // Loop over requests until the pool is shut down
    while let Ok(request) = receiver.recv_blocking() {
        match request {
            WorkerRequest::Fetch(doc_id, response_tx, parent_span) => {
                parent_span.in_scope(|| {
                    if !response_tx.is_closed() {
                        // The caller may have given up on the batch, discard send errors
                        let _ = response_tx.send(state.store.get_text(&doc_id));
                    }
                })
            }
            WorkerRequest::Tokenize(text, response_tx, parent_span) => {
                parent_span.in_scope(|| {
                    if !response_tx.is_closed() {
                        let _ = response_tx.send(state.annotator.tokenize(&text));
                    }
                })
            }
        }
    }

    state.shutdown();
    tracing::debug!("Annotation worker {index} stopped");
}

enum WorkerRequest {
    Fetch(String, oneshot::Sender<Result<String, StoreError>>, Span),
    Tokenize(
        String,
        oneshot::Sender<Result<Annotation, AnnotatorError>>,
        Span,
    ),
}
