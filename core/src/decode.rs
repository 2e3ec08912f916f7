/// Span decoding and final prediction assembly
use crate::retriever::RankedDocument;
use crate::topk::ScoredSpan;
use open_qa_backend::{Annotation, ReaderKind};
use serde::Serialize;
use std::sync::Arc;

/// Passage text around an answer. Offsets count characters of `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub doc_id: String,
    pub span: String,
    pub doc_score: f32,
    pub span_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

/// Reader specific span conventions
pub trait SpanDecoder: Send + Sync {
    /// Map raw reader indices to passage token indices
    fn decode(&self, question: &Annotation, start: usize, end: usize) -> (usize, usize);

    /// Answer text for passage tokens `[start, end]`
    fn span_text(&self, passage: &Annotation, start: usize, end: usize) -> String;

    fn context(&self, passage: &Annotation, start: usize, end: usize) -> Context;
}

pub fn decoder(kind: ReaderKind) -> &'static dyn SpanDecoder {
    match kind {
        ReaderKind::WordTagging => &WordTaggingDecoder,
        ReaderKind::JointSubword => &JointSubwordDecoder,
    }
}

/// Clamp an inclusive token range to the passage. `None` when nothing is left.
fn clamp(len: usize, start: usize, end: usize) -> Option<(usize, usize)> {
    if len == 0 || start >= len || start > end {
        return None;
    }
    Some((start, end.min(len - 1)))
}

/// Number of characters before byte `byte` of `text`
fn char_offset(text: &str, byte: usize) -> usize {
    text.get(..byte)
        .map(|prefix| prefix.chars().count())
        .unwrap_or_else(|| text.chars().count())
}

/// Spans index the passage's own tokens and are cut from the source text
#[derive(Debug, Clone, Copy)]
pub struct WordTaggingDecoder;

impl SpanDecoder for WordTaggingDecoder {
    fn decode(&self, _question: &Annotation, start: usize, end: usize) -> (usize, usize) {
        (start, end)
    }

    fn span_text(&self, passage: &Annotation, start: usize, end: usize) -> String {
        clamp(passage.len(), start, end)
            .and_then(|(start, end)| passage.slice_text(start, end))
            .unwrap_or_default()
            .to_string()
    }

    fn context(&self, passage: &Annotation, start: usize, end: usize) -> Context {
        let text = passage.untokenize().to_string();
        let tokens = passage.tokens();
        let (start, end) = match clamp(tokens.len(), start, end) {
            Some((start, end)) => {
                let base = tokens[0].offsets.0;
                (
                    char_offset(&text, tokens[start].offsets.0 - base),
                    char_offset(&text, tokens[end].offsets.1 - base),
                )
            }
            None => (0, 0),
        };
        Context { text, start, end }
    }
}

/// Spans index a `[CLS] question [SEP] passage` sequence and are rebuilt by joining subwords
#[derive(Debug, Clone, Copy)]
pub struct JointSubwordDecoder;

impl SpanDecoder for JointSubwordDecoder {
    fn decode(&self, question: &Annotation, start: usize, end: usize) -> (usize, usize) {
        let offset = ReaderKind::JointSubword.passage_offset(question.len());
        (start.saturating_sub(offset), end.saturating_sub(offset))
    }

    fn span_text(&self, passage: &Annotation, start: usize, end: usize) -> String {
        let words = passage.words();
        match clamp(words.len(), start, end) {
            Some((start, end)) => words[start..=end].join(" "),
            None => String::new(),
        }
    }

    /// Offsets are measured on the space-joined subwords, not on the source text
    fn context(&self, passage: &Annotation, start: usize, end: usize) -> Context {
        let words = passage.words();
        let joined_len = |n: usize| words[..n.min(words.len())].join(" ").chars().count();
        Context {
            text: words.join(" "),
            start: joined_len(start),
            end: joined_len(end.saturating_add(1)),
        }
    }
}

/// Turn ranked spans into predictions, one list per query
pub fn predictions(
    ranked: Vec<Vec<ScoredSpan>>,
    decoder: &dyn SpanDecoder,
    rankings: &[Vec<RankedDocument>],
    questions: &[Arc<Annotation>],
    passages: &[Arc<Annotation>],
    return_context: bool,
) -> Vec<Vec<Prediction>> {
    ranked
        .into_iter()
        .map(|spans| {
            spans
                .into_iter()
                .map(|span| {
                    let key = span.key;
                    let document = &rankings[key.query][key.doc_rank];
                    let passage = &passages[key.passage];
                    let (start, end) = decoder.decode(&questions[key.query], span.start, span.end);

                    Prediction {
                        doc_id: document.doc_id.clone(),
                        span: decoder.span_text(passage, start, end),
                        doc_score: document.score,
                        span_score: span.score,
                        context: return_context.then(|| decoder.context(passage, start, end)),
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::{Annotator, SimpleAnnotator};
    use crate::example::ExampleKey;
    use open_qa_backend::Token;

    fn annotate(text: &str) -> Annotation {
        SimpleAnnotator::new().tokenize(text).unwrap()
    }

    fn subwords(words: &[&str]) -> Annotation {
        let text = words.join(" ");
        let mut offset = 0;
        let tokens = words
            .iter()
            .map(|w| {
                let token = Token::new(*w, (offset, offset + w.len()));
                offset += w.len() + 1;
                token
            })
            .collect();
        Annotation::new(text, tokens)
    }

    #[test]
    fn test_word_tagging_round_trip() {
        let passage = annotate("William Shakespeare wrote Hamlet.");
        let decoder = WordTaggingDecoder;
        for start in 0..passage.len() {
            for end in start..passage.len() {
                let span = decoder.span_text(&passage, start, end);
                let context = decoder.context(&passage, start, end);
                assert_eq!(context.start, passage.tokens()[start].offsets.0);
                assert_eq!(context.end, passage.tokens()[end].offsets.1);
                assert_eq!(&context.text[context.start..context.end], span);
            }
        }
        assert_eq!(decoder.span_text(&passage, 0, 1), "William Shakespeare");
    }

    #[test]
    fn test_word_tagging_character_offsets() {
        let passage = annotate("Écrit par William Shakespeare.");
        let decoder = WordTaggingDecoder;
        let answer = passage
            .tokens()
            .iter()
            .position(|t| t.text == "Shakespeare")
            .unwrap();
        assert_eq!(decoder.span_text(&passage, answer, answer), "Shakespeare");

        let context = decoder.context(&passage, answer, answer);
        assert_eq!((context.start, context.end), (18, 29));
        let chars: String = context
            .text
            .chars()
            .skip(context.start)
            .take(context.end - context.start)
            .collect();
        assert_eq!(chars, "Shakespeare");

        for start in 0..passage.len() {
            for end in start..passage.len() {
                let span = decoder.span_text(&passage, start, end);
                let context = decoder.context(&passage, start, end);
                assert_eq!(context.end - context.start, span.chars().count());
            }
        }
    }

    #[test]
    fn test_word_tagging_out_of_range() {
        let passage = annotate("a b");
        let decoder = WordTaggingDecoder;
        assert_eq!(decoder.span_text(&passage, 1, 9), "b");
        assert_eq!(decoder.span_text(&passage, 5, 9), "");
        assert_eq!(decoder.context(&passage, 5, 9).start, 0);
    }

    #[test]
    fn test_joint_offset_is_clamped() {
        let question = subwords(&["who", "wrote", "ham", "##let"]);
        let decoder = JointSubwordDecoder;
        // 4 question tokens + 2 special positions
        assert_eq!(decoder.decode(&question, 0, 3), (0, 0));
        assert_eq!(decoder.decode(&question, 5, 5), (0, 0));
        assert_eq!(decoder.decode(&question, 6, 7), (0, 1));
        assert_eq!(decoder.decode(&question, 9, 11), (3, 5));
    }

    #[test]
    fn test_joint_span_and_context() {
        let passage = subwords(&["william", "shakespeare", "wrote", "ham", "##let"]);
        let decoder = JointSubwordDecoder;
        assert_eq!(decoder.span_text(&passage, 0, 1), "william shakespeare");
        assert_eq!(decoder.span_text(&passage, 3, 10), "ham ##let");

        let context = decoder.context(&passage, 1, 2);
        assert_eq!(context.text, "william shakespeare wrote ham ##let");
        assert_eq!(context.start, "william".len());
        assert_eq!(context.end, "william shakespeare wrote".len());

        let context = decoder.context(&passage, 0, 0);
        assert_eq!((context.start, context.end), (0, "william".len()));

        let passage = subwords(&["écrit", "par", "shakespeare"]);
        let context = decoder.context(&passage, 2, 2);
        assert_eq!(context.text, "écrit par shakespeare");
        assert_eq!((context.start, context.end), (9, 21));
    }

    #[test]
    fn test_predictions() {
        let rankings = vec![vec![
            RankedDocument::new("d0", 0.1),
            RankedDocument::new("d1", 0.9),
        ]];
        let questions = vec![Arc::new(annotate("Who wrote Hamlet?"))];
        let passages = vec![
            Arc::new(annotate("Nothing here.")),
            Arc::new(annotate("William Shakespeare wrote Hamlet.")),
        ];
        let ranked = vec![vec![ScoredSpan {
            key: ExampleKey {
                query: 0,
                doc_rank: 1,
                passage: 1,
            },
            start: 0,
            end: 1,
            score: 0.75,
        }]];

        let predictions = predictions(
            ranked,
            decoder(ReaderKind::WordTagging),
            &rankings,
            &questions,
            &passages,
            true,
        );
        let prediction = &predictions[0][0];
        assert_eq!(prediction.doc_id, "d1");
        assert_eq!(prediction.span, "William Shakespeare");
        assert_eq!(prediction.doc_score, 0.9);
        assert_eq!(prediction.span_score, 0.75);
        assert_eq!(
            prediction.context,
            Some(Context {
                text: "William Shakespeare wrote Hamlet.".to_string(),
                start: 0,
                end: 19,
            })
        );
    }
}
