//! Bounded top-k aggregation
//!
//! Every query keeps a min-heap holding at most `top_n` spans, so memory stays
//! `O(queries * top_n)` however many passages are scored.

use crate::example::ExampleKey;
use open_qa_backend::Spans;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Ranked<T> {
    score: f32,
    /// Insertion order. Among equal scores the oldest entry is the minimum.
    seq: u64,
    item: T,
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap keeping the `capacity` highest scored items offered to it
#[derive(Debug)]
pub struct BoundedMinHeap<T> {
    heap: BinaryHeap<Reverse<Ranked<T>>>,
    capacity: usize,
    seq: u64,
}

impl<T> BoundedMinHeap<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Lowest score currently kept
    pub fn min_score(&self) -> Option<f32> {
        self.heap.peek().map(|Reverse(ranked)| ranked.score)
    }

    /// Insert if there is room or if `score` beats the current minimum, which is then evicted.
    /// Returns whether the item was kept.
    pub fn offer(&mut self, score: f32, item: T) -> bool {
        if self.capacity == 0 || score.is_nan() {
            return false;
        }

        if self.heap.len() == self.capacity {
            match self.min_score() {
                Some(min) if score > min => {
                    self.heap.pop();
                }
                _ => return false,
            }
        }

        self.heap.push(Reverse(Ranked {
            score,
            seq: self.seq,
            item,
        }));
        self.seq += 1;
        true
    }

    /// Kept items, highest score first
    pub fn into_sorted_desc(self) -> Vec<(f32, T)> {
        // Ascending order of `Reverse` is descending order of scores
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(ranked)| (ranked.score, ranked.item))
            .collect()
    }
}

/// Raw reader output for one example
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSpan {
    pub key: ExampleKey,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// One bounded heap per query
#[derive(Debug)]
pub struct Aggregator {
    queues: Vec<BoundedMinHeap<ScoredSpan>>,
}

impl Aggregator {
    pub fn new(queries: usize, top_n: usize) -> Self {
        Self {
            queues: (0..queries).map(|_| BoundedMinHeap::new(top_n)).collect(),
        }
    }

    pub fn offer(&mut self, span: ScoredSpan) -> bool {
        match self.queues.get_mut(span.key.query) {
            Some(queue) => queue.offer(span.score, span),
            None => {
                tracing::warn!("Dropping span for unknown query {}", span.key.query);
                false
            }
        }
    }

    /// Merge reader results for a batch. Rows without a span are skipped.
    pub fn merge(&mut self, keys: &[ExampleKey], spans: &Spans) {
        for (row, key) in keys.iter().enumerate() {
            if let Some(span) = spans.get(&row) {
                self.offer(ScoredSpan {
                    key: *key,
                    start: span.start,
                    end: span.end,
                    score: span.score,
                });
            }
        }
    }

    pub fn len(&self, query: usize) -> usize {
        self.queues.get(query).map_or(0, |q| q.len())
    }

    /// Spans per query, highest score first
    pub fn into_ranked(self) -> Vec<Vec<ScoredSpan>> {
        self.queues
            .into_iter()
            .map(|queue| {
                queue
                    .into_sorted_desc()
                    .into_iter()
                    .map(|(_, span)| span)
                    .collect()
            })
            .collect()
    }
}
