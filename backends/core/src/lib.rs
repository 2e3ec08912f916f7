#[cfg(feature = "clap")]
use clap::ValueEnum;
use nohash_hasher::IntMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A single annotated token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Byte offsets of the token in the annotated text
    pub offsets: (usize, usize),
    pub lemma: Option<String>,
    pub pos: Option<String>,
    pub ner: Option<String>,
}

impl Token {
    pub fn new(text: impl Into<String>, offsets: (usize, usize)) -> Self {
        Self {
            text: text.into(),
            offsets,
            lemma: None,
            pos: None,
            ner: None,
        }
    }
}

/// Tokenized representation of a question or a passage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    text: String,
    tokens: Vec<Token>,
}

impl Annotation {
    pub fn new(text: String, tokens: Vec<Token>) -> Self {
        Self { text, tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn words(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    pub fn lemmas(&self) -> Option<Vec<&str>> {
        self.tokens.iter().map(|t| t.lemma.as_deref()).collect()
    }

    pub fn pos(&self) -> Option<Vec<&str>> {
        self.tokens.iter().map(|t| t.pos.as_deref()).collect()
    }

    pub fn entities(&self) -> Option<Vec<&str>> {
        self.tokens.iter().map(|t| t.ner.as_deref()).collect()
    }

    pub fn offsets(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tokens.iter().map(|t| t.offsets)
    }

    /// Source text covered by tokens `[start, end]` (inclusive)
    pub fn slice_text(&self, start: usize, end: usize) -> Option<&str> {
        if start > end {
            return None;
        }
        let first = self.tokens.get(start)?.offsets.0;
        let last = self.tokens.get(end)?.offsets.1;
        self.text.get(first..last)
    }

    /// Source text covered by all tokens
    pub fn untokenize(&self) -> &str {
        if self.tokens.is_empty() {
            return "";
        }
        self.slice_text(0, self.tokens.len() - 1).unwrap_or("")
    }
}

/// Candidate restriction list for a question
pub type Candidates = HashSet<String>;

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub question: Arc<Annotation>,
    pub passage: Arc<Annotation>,
    pub candidates: Option<Arc<Candidates>>,
}

#[derive(Debug, Default)]
pub struct Batch {
    pub rows: Vec<BatchRow>,
    /// Longest passage in the batch, in tokens
    pub max_length: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of question and passage tokens over all rows
    pub fn total_tokens(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.question.len() + r.passage.len())
            .sum()
    }
}

/// Best span found by the reader for one batch row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSpan {
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Row index -> span. Rows without a valid span are absent.
pub type Spans = IntMap<usize, RawSpan>;

pub trait Backend {
    fn health(&self) -> Result<(), BackendError>;
    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    fn kind(&self) -> ReaderKind;

    fn predict(&self, batch: Batch) -> Result<Spans, BackendError>;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
pub enum ReaderKind {
    /// Spans index the passage's own word tokens
    WordTagging,
    /// Spans index a joint `[CLS] question [SEP] passage` subword sequence
    JointSubword,
}

impl ReaderKind {
    /// Number of positions preceding the passage in the reader input
    pub fn passage_offset(&self, question_len: usize) -> usize {
        match self {
            ReaderKind::WordTagging => 0,
            ReaderKind::JointSubword => question_len + 2,
        }
    }
}

impl fmt::Display for ReaderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReaderKind::WordTagging => write!(f, "word_tagging"),
            ReaderKind::JointSubword => write!(f, "joint_subword"),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("No backend found")]
    NoBackend,
    #[error("Could not start backend: {0}")]
    Start(String),
    #[error("{0}")]
    Inference(String),
    #[error("Backend is unhealthy")]
    Unhealthy,
}
