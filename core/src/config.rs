/// Pipeline configuration
use crate::QaError;
use open_qa_backend::Candidates;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Target passage length used when squashing paragraphs together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupLength {
    /// Every paragraph is its own passage
    #[default]
    Paragraph,
    /// Group paragraphs until adding one more would exceed this many characters
    Chars(usize),
    /// The whole document is a single passage
    Document,
}

impl GroupLength {
    pub fn limit(&self) -> usize {
        match self {
            GroupLength::Paragraph => 0,
            GroupLength::Chars(n) => *n,
            GroupLength::Document => usize::MAX,
        }
    }
}

impl FromStr for GroupLength {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "paragraph" => Ok(Self::Paragraph),
            "inf" | "infinity" | "document" => Ok(Self::Document),
            other => other
                .parse::<usize>()
                .map(|n| match n {
                    0 => Self::Paragraph,
                    n => Self::Chars(n),
                })
                .map_err(|_| {
                    QaError::Configuration(format!(
                        "Invalid group length: {s}. Valid values: paragraph, document, inf or a number of characters"
                    ))
                }),
        }
    }
}

impl fmt::Display for GroupLength {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GroupLength::Paragraph => write!(f, "paragraph"),
            GroupLength::Chars(n) => write!(f, "{n}"),
            GroupLength::Document => write!(f, "document"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of examples sent to the reader at once
    pub batch_size: usize,
    pub group_length: GroupLength,
    /// Number of annotation workers
    pub workers: usize,
    /// Reader batches submitted ahead of the one being merged
    pub max_reader_lookahead: usize,
    pub shuffle_batches: bool,
    /// Restriction list used for every query that does not bring its own
    pub fixed_candidates: Option<Arc<Candidates>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            group_length: GroupLength::default(),
            workers: num_cpus::get(),
            max_reader_lookahead: 1,
            shuffle_batches: false,
            fixed_candidates: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), QaError> {
        if self.batch_size == 0 {
            return Err(QaError::Configuration(
                "`batch_size` must be greater than 0".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(QaError::Configuration(
                "`workers` must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per call options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Answers kept per query
    pub top_n: usize,
    /// Documents retrieved per query
    pub n_docs: usize,
    pub return_context: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            top_n: 1,
            n_docs: 5,
            return_context: false,
        }
    }
}

impl ProcessOptions {
    pub fn validate(&self) -> Result<(), QaError> {
        if self.top_n == 0 {
            return Err(QaError::Configuration(
                "`top_n` must be greater than 0".to_string(),
            ));
        }
        if self.n_docs == 0 {
            return Err(QaError::Configuration(
                "`n_docs` must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
