/// Reader invocation with bounded look-ahead
use crate::batching::ReaderBatch;
use crate::example::ExampleKey;
use crate::topk::Aggregator;
use crate::QaError;
use open_qa_backend::{Backend, BackendError, Spans};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

struct PendingBatch {
    index: usize,
    keys: Vec<ExampleKey>,
    handle: JoinHandle<Result<(Spans, Duration), BackendError>>,
}

/// Score every batch and merge the results into `aggregator`.
///
/// At most `lookahead` batches are queued on the reader behind the one being awaited; results
/// are merged in submission order.
#[instrument(skip_all, fields(batches = batches.len()))]
pub(crate) async fn read(
    backend: &Backend,
    batches: Vec<ReaderBatch>,
    lookahead: usize,
    aggregator: &mut Aggregator,
) -> Result<(), QaError> {
    let mut batches = batches.into_iter().enumerate();
    let mut in_flight: VecDeque<PendingBatch> = VecDeque::with_capacity(lookahead + 1);

    loop {
        while in_flight.len() <= lookahead {
            match batches.next() {
                Some((index, batch)) => in_flight.push_back(submit(backend, index, batch)),
                None => break,
            }
        }

        let Some(pending) = in_flight.pop_front() else {
            break;
        };

        let result = pending
            .handle
            .await
            .expect("Reader task panicked. This is a bug.");

        match result {
            Ok((spans, inference_duration)) => {
                let histogram = metrics::histogram!("qa_inference_duration");
                histogram.record(inference_duration.as_secs_f64());

                if spans.keys().any(|row| *row >= pending.keys.len()) {
                    tracing::warn!(
                        "Reader returned spans for rows outside of batch {}",
                        pending.index
                    );
                }
                aggregator.merge(&pending.keys, &spans);
            }
            Err(err) => {
                in_flight.iter().for_each(|p| p.handle.abort());
                return Err(QaError::Inference {
                    batch: pending.index,
                    source: err,
                });
            }
        }
    }

    Ok(())
}

fn submit(backend: &Backend, index: usize, reader_batch: ReaderBatch) -> PendingBatch {
    let ReaderBatch { keys, batch } = reader_batch;

    let histogram = metrics::histogram!("qa_reader_batch_size");
    histogram.record(batch.len() as f64);
    let histogram = metrics::histogram!("qa_reader_batch_tokens");
    histogram.record(batch.total_tokens() as f64);

    let backend = backend.clone();
    let handle = tokio::spawn(async move { backend.predict(batch).await });

    PendingBatch {
        index,
        keys,
        handle,
    }
}
