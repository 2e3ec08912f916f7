use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use open_qa_backend_remote::RemoteBackend;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{instrument, Span};

pub use open_qa_backend_core::{
    Annotation, Backend as CoreBackend, BackendError, Batch, BatchRow, Candidates, RawSpan,
    ReaderKind, Spans, Token,
};

/// Reader selection
#[derive(Debug, Clone)]
pub enum ReaderConfig {
    /// Reader served over HTTP
    Remote {
        url: String,
        kind: ReaderKind,
        api_key: Option<String>,
        timeout: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct Backend {
    /// Channel to communicate with the background thread
    backend_sender: mpsc::Sender<BackendCommand>,
    /// Health status
    health_receiver: watch::Receiver<bool>,
    _backend_thread: Arc<BackendThread>,
    pub max_batch_size: Option<usize>,
    pub kind: ReaderKind,
}

impl Backend {
    pub fn new(config: ReaderConfig) -> Result<Self, BackendError> {
        let backend = init_backend(config)?;
        Ok(Self::from_backend(backend))
    }

    /// Run an already constructed reader on its own thread
    pub fn from_backend(backend: Box<dyn CoreBackend + Send>) -> Self {
        let (backend_sender, backend_receiver) = mpsc::channel(8);

        let kind = backend.kind();
        let max_batch_size = backend.max_batch_size();

        let (health_sender, health_receiver) = watch::channel(false);
        let _backend_thread =
            Arc::new(BackendThread::new(backend, backend_receiver, health_sender));

        Self {
            backend_sender,
            health_receiver,
            _backend_thread,
            max_batch_size,
            kind,
        }
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<(), BackendError> {
        let (sender, receiver) = oneshot::channel();
        self.backend_sender
            .send(BackendCommand::Health(Span::current(), sender))
            .await
            .expect("No backend receiver. This is a bug.");
        receiver.await.expect(
            "Backend blocking task dropped the sender without sending a response. This is a bug.",
        )
    }

    #[instrument(skip(self))]
    pub fn health_watcher(&self) -> watch::Receiver<bool> {
        self.health_receiver.clone()
    }

    #[instrument(skip_all)]
    pub async fn predict(&self, batch: Batch) -> Result<(Spans, Duration), BackendError> {
        let (sender, receiver) = oneshot::channel();

        self.backend_sender
            .send(BackendCommand::Predict(batch, Span::current(), sender))
            .await
            .expect("No backend receiver. This is a bug.");
        receiver.await.expect(
            "Backend blocking task dropped the sender without send a response. This is a bug.",
        )
    }
}

fn init_backend(config: ReaderConfig) -> Result<Box<dyn CoreBackend + Send>, BackendError> {
    match config {
        ReaderConfig::Remote {
            url,
            kind,
            api_key,
            timeout,
        } => {
            // The blocking HTTP client must not be built inside an async runtime
            let backend =
                std::thread::spawn(move || RemoteBackend::new(url, kind, api_key, timeout))
                    .join()
                    .expect("Remote backend management thread failed")
                    .map_err(|err| {
                        tracing::error!("Could not start remote reader: {err}");
                        err
                    })?;
            Ok(Box::new(backend))
        }
    }
}

#[derive(Debug)]
struct BackendThread(Option<JoinHandle<()>>);

impl BackendThread {
    fn new(
        backend: Box<dyn CoreBackend + Send>,
        mut backend_receiver: mpsc::Receiver<BackendCommand>,
        health_sender: watch::Sender<bool>,
    ) -> Self {
        let handle = std::thread::spawn(move || {
            while let Some(cmd) = backend_receiver.blocking_recv() {
                let start = Instant::now();
                let mut healthy = false;
                match cmd {
                    BackendCommand::Health(span, sender) => {
                        let _span = span.entered();
                        let _ = sender.send(backend.health().map(|_| healthy = true));
                    }
                    BackendCommand::Predict(batch, span, sender) => {
                        let _span = span.entered();
                        let _ = sender.send(backend.predict(batch).map(|s| {
                            healthy = true;
                            (s, start.elapsed())
                        }));
                    }
                };
                let _ = health_sender.send(healthy);
            }
        });
        Self(Some(handle))
    }
}

impl Drop for BackendThread {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            let _ = handle.join();
        }
    }
}

enum BackendCommand {
    Health(Span, oneshot::Sender<Result<(), BackendError>>),
    Predict(
        Batch,
        Span,
        #[allow(clippy::type_complexity)]
        oneshot::Sender<Result<(Spans, Duration), BackendError>>,
    ),
}
