/// Text annotation collaborators
use open_qa_backend::{Annotation, Token};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct AnnotatorError(pub String);

pub trait Annotator: Send {
    /// Must be deterministic for identical input
    fn tokenize(&mut self, text: &str) -> Result<Annotation, AnnotatorError>;

    /// Release held resources. Called once when the owning worker stops.
    fn shutdown(&mut self) {}
}

const ALPHA_NUM: &str = r"[\p{L}\p{N}\p{M}]+";
const NON_WS: &str = r"[^\p{Z}\p{C}]";

/// Word tokenizer: runs of letters and digits, or single non-space symbols
#[derive(Debug, Clone)]
pub struct SimpleAnnotator {
    pattern: Regex,
    lemmas: bool,
}

impl SimpleAnnotator {
    pub fn new() -> Self {
        let pattern = Regex::new(&format!("({ALPHA_NUM})|({NON_WS})"))
            .expect("Token pattern is invalid. This is a bug.");
        Self {
            pattern,
            lemmas: false,
        }
    }

    /// Attach lowercased tokens as lemmas
    pub fn with_lemmas(mut self) -> Self {
        self.lemmas = true;
        self
    }
}

impl Default for SimpleAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator for SimpleAnnotator {
    fn tokenize(&mut self, text: &str) -> Result<Annotation, AnnotatorError> {
        let tokens = self
            .pattern
            .find_iter(text)
            .map(|m| {
                let mut token = Token::new(m.as_str(), (m.start(), m.end()));
                if self.lemmas {
                    token.lemma = Some(m.as_str().to_lowercase());
                }
                token
            })
            .collect();
        Ok(Annotation::new(text.to_string(), tokens))
    }
}
