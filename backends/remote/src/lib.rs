use open_qa_backend_core::{Backend, BackendError, Batch, RawSpan, ReaderKind, Spans};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reader model served behind an HTTP endpoint
pub struct RemoteBackend {
    client: Client,
    url: String,
    kind: ReaderKind,
    api_key: Option<String>,
}

impl RemoteBackend {
    pub fn new(
        url: String,
        kind: ReaderKind,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::Start(format!("Could not build HTTP client: {err}")))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            kind,
            api_key,
        })
    }

    fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        let mut request = self.client.post(format!("{}{path}", self.url)).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        request.send()?.error_for_status()
    }
}

impl Backend for RemoteBackend {
    fn health(&self) -> Result<(), BackendError> {
        let mut request = self.client.get(format!("{}/health", self.url));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        match request.send().and_then(|r| r.error_for_status()) {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!("Reader health check failed: {err}");
                Err(BackendError::Unhealthy)
            }
        }
    }

    fn kind(&self) -> ReaderKind {
        self.kind
    }

    fn predict(&self, batch: Batch) -> Result<Spans, BackendError> {
        let request = PredictRequest::new(self.kind, &batch);
        let response: PredictResponse = self
            .post("/predict", &request)
            .and_then(|r| r.json())
            .map_err(|err| BackendError::Inference(err.to_string()))?;

        response.into_spans(batch.len())
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    kind: String,
    examples: Vec<RemoteExample<'a>>,
}

#[derive(Debug, Serialize)]
struct RemoteExample<'a> {
    question: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    question_lemmas: Option<Vec<&'a str>>,
    passage: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lemmas: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pos: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ner: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<&'a str>>,
}

impl<'a> PredictRequest<'a> {
    fn new(kind: ReaderKind, batch: &'a Batch) -> Self {
        let examples = batch
            .rows
            .iter()
            .map(|row| {
                let mut candidates: Option<Vec<&str>> = row
                    .candidates
                    .as_ref()
                    .map(|c| c.iter().map(|s| s.as_str()).collect());
                // Deterministic payloads
                if let Some(candidates) = candidates.as_mut() {
                    candidates.sort_unstable();
                }
                RemoteExample {
                    question: row.question.words(),
                    question_lemmas: row.question.lemmas(),
                    passage: row.passage.words(),
                    lemmas: row.passage.lemmas(),
                    pos: row.passage.pos(),
                    ner: row.passage.entities(),
                    candidates,
                }
            })
            .collect();

        Self {
            kind: kind.to_string(),
            examples,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteSpan {
    start: usize,
    end: usize,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    spans: Vec<Option<RemoteSpan>>,
}

impl PredictResponse {
    fn into_spans(self, rows: usize) -> Result<Spans, BackendError> {
        if self.spans.len() != rows {
            return Err(BackendError::Inference(format!(
                "Reader returned {} results for a batch of {rows}",
                self.spans.len()
            )));
        }

        let mut spans = Spans::default();
        for (i, span) in self.spans.into_iter().enumerate() {
            if let Some(span) = span {
                spans.insert(
                    i,
                    RawSpan {
                        start: span.start,
                        end: span.end,
                        score: span.score,
                    },
                );
            }
        }
        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use open_qa_backend_core::{Annotation, BatchRow, Candidates, Token};
    use std::sync::Arc;

    fn batch() -> Batch {
        let question = Arc::new(Annotation::new(
            "who".to_string(),
            vec![Token::new("who", (0, 3))],
        ));
        let passage = Arc::new(Annotation::new(
            "a b".to_string(),
            vec![Token::new("a", (0, 1)), Token::new("b", (2, 3))],
        ));
        Batch {
            rows: vec![BatchRow {
                question,
                passage,
                candidates: Some(Arc::new(Candidates::from(["b".to_string(), "a".to_string()]))),
            }],
            max_length: 2,
        }
    }

    #[test]
    fn test_request_payload() {
        let batch = batch();
        let request = PredictRequest::new(ReaderKind::WordTagging, &batch);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["kind"], "word_tagging");
        assert_eq!(value["examples"][0]["passage"], serde_json::json!(["a", "b"]));
        assert_eq!(value["examples"][0]["candidates"], serde_json::json!(["a", "b"]));
        assert!(value["examples"][0].get("lemmas").is_none());
    }

    #[test]
    fn test_response_rows() {
        let response: PredictResponse = serde_json::from_str(
            r#"{"spans": [{"start": 0, "end": 1, "score": 0.5}, null]}"#,
        )
        .unwrap();
        let spans = response.into_spans(2).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[&0].end, 1);

        let response: PredictResponse = serde_json::from_str(r#"{"spans": []}"#).unwrap();
        assert!(response.into_spans(1).is_err());
    }
}
