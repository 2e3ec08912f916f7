/// JSON lines document store
use anyhow::{Context, Result};
use open_qa_core::retriever::{DocumentStore, StoreError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    text: String,
}

/// Documents loaded from `{"id": ..., "text": ...}` lines, shared between workers
#[derive(Debug, Clone, Default)]
pub struct JsonlDocStore {
    docs: Arc<HashMap<String, String>>,
}

impl JsonlDocStore {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Could not open corpus {path:?}"))?;

        let mut docs = HashMap::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)
                .with_context(|| format!("Invalid corpus record on line {}", i + 1))?;
            if docs.insert(record.id.clone(), record.text).is_some() {
                tracing::warn!("Duplicate document id `{}`, keeping the last one", record.id);
            }
        }
        Ok(Self {
            docs: Arc::new(docs),
        })
    }

    pub fn from_documents<I, K, V>(documents: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let docs = documents
            .into_iter()
            .map(|(id, text)| (id.into(), text.into()))
            .collect();
        Self {
            docs: Arc::new(docs),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = (&str, &str)> {
        self.docs.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }
}

impl DocumentStore for JsonlDocStore {
    fn get_text(&self, doc_id: &str) -> Result<String, StoreError> {
        self.docs
            .get(doc_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(doc_id.to_string()))
    }
}
