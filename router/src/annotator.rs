/// Subword annotation with a `tokenizer.json` file
use anyhow::{anyhow, Result};
use open_qa_backend::{Annotation, Token};
use open_qa_core::annotator::{Annotator, AnnotatorError};
use std::path::Path;
use tokenizers::Tokenizer;

/// Tokens and byte offsets of a Hugging Face tokenizer, without special tokens
#[derive(Clone)]
pub struct TokenizerAnnotator {
    tokenizer: Tokenizer,
}

impl TokenizerAnnotator {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|err| anyhow!("Could not load tokenizer {path:?}: {err}"))?;
        Ok(Self::new(tokenizer))
    }
}

impl Annotator for TokenizerAnnotator {
    fn tokenize(&mut self, text: &str) -> Result<Annotation, AnnotatorError> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|err| AnnotatorError(err.to_string()))?;

        let tokens = encoding
            .get_tokens()
            .iter()
            .zip(encoding.get_offsets())
            .map(|(token, &offsets)| Token::new(token.as_str(), offsets))
            .collect();
        Ok(Annotation::new(text.to_string(), tokens))
    }
}
