/// Length-bucketed batching of examples
use crate::example::{Example, ExampleKey};
use open_qa_backend::{Batch, BatchRow};
use rand::seq::SliceRandom;

/// A reader batch together with the key of each of its rows
#[derive(Debug)]
pub struct ReaderBatch {
    pub keys: Vec<ExampleKey>,
    pub batch: Batch,
}

#[derive(Debug, Clone)]
pub struct Batcher {
    batch_size: usize,
    shuffle: bool,
}

impl Batcher {
    pub fn new(batch_size: usize, shuffle: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            shuffle,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Group examples of similar passage length. Longest passages come first and ties keep
    /// their relative order. Membership and count are never altered.
    pub fn batches(&self, mut examples: Vec<Example>) -> Vec<ReaderBatch> {
        examples.sort_by_key(|example| std::cmp::Reverse(example.passage.len()));

        let mut batches = Vec::with_capacity(examples.len().div_ceil(self.batch_size));
        let mut examples = examples.into_iter().peekable();
        while examples.peek().is_some() {
            let mut keys = Vec::with_capacity(self.batch_size);
            let mut rows = Vec::with_capacity(self.batch_size);
            let mut max_length = 0;

            for example in examples.by_ref().take(self.batch_size) {
                max_length = max_length.max(example.passage.len());
                keys.push(example.key);
                rows.push(BatchRow {
                    question: example.question,
                    passage: example.passage,
                    candidates: example.candidates,
                });
            }

            batches.push(ReaderBatch {
                keys,
                batch: Batch { rows, max_length },
            });
        }

        if self.shuffle {
            batches.shuffle(&mut rand::thread_rng());
        }
        batches
    }
}
