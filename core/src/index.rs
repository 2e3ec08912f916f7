/// Document identity bookkeeping
///
/// Maps document identifiers to deduplicated fetch positions, and fetched documents to the
/// range of passages they own in the flattened passage list.
use crate::config::GroupLength;
use crate::retriever::RankedDocument;
use crate::splitter::split_document;
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Default)]
pub struct IdentityIndex {
    /// Distinct identifiers in first-seen order
    doc_ids: Vec<String>,
    positions: HashMap<String, usize>,
    /// Passage range owned by each document, indexed by fetch position
    ranges: Vec<Range<usize>>,
    /// Fetch position of the document owning each passage
    owners: Vec<usize>,
}

impl IdentityIndex {
    pub fn new(rankings: &[Vec<RankedDocument>]) -> Self {
        let mut index = Self::default();
        for document in rankings.iter().flatten() {
            if !index.positions.contains_key(&document.doc_id) {
                index
                    .positions
                    .insert(document.doc_id.clone(), index.doc_ids.len());
                index.doc_ids.push(document.doc_id.clone());
            }
        }
        index
    }

    /// Identifiers to fetch, each exactly once
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    pub fn position(&self, doc_id: &str) -> Option<usize> {
        self.positions.get(doc_id).copied()
    }

    /// Split fetched documents, aligned with [`IdentityIndex::doc_ids`], into one flat passage
    /// list and record the passage range of every document
    pub fn flatten(&mut self, texts: &[String], group_length: GroupLength) -> Vec<String> {
        debug_assert_eq!(texts.len(), self.doc_ids.len());

        self.ranges.clear();
        self.owners.clear();

        let mut passages = Vec::new();
        for (position, text) in texts.iter().enumerate() {
            let start = passages.len();
            passages.extend(split_document(text, group_length));
            self.owners
                .extend(std::iter::repeat(position).take(passages.len() - start));
            self.ranges.push(start..passages.len());
        }
        passages
    }

    pub fn passage_range(&self, doc_id: &str) -> Option<Range<usize>> {
        self.position(doc_id)
            .and_then(|position| self.ranges.get(position))
            .cloned()
    }

    /// Identifier of the document owning a flattened passage
    pub fn owner(&self, passage: usize) -> Option<&str> {
        self.owners
            .get(passage)
            .map(|position| self.doc_ids[*position].as_str())
    }

    pub fn num_passages(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rankings() -> Vec<Vec<RankedDocument>> {
        vec![
            vec![RankedDocument::new("d2", 0.9), RankedDocument::new("d1", 0.5)],
            vec![RankedDocument::new("d1", 0.8), RankedDocument::new("d3", 0.1)],
            vec![RankedDocument::new("d2", 0.7)],
        ]
    }

    #[test]
    fn test_dedup_first_seen() {
        let index = IdentityIndex::new(&rankings());
        assert_eq!(index.doc_ids(), &["d2", "d1", "d3"]);
        assert_eq!(index.position("d1"), Some(1));
        assert_eq!(index.position("d4"), None);
    }

    #[test]
    fn test_passage_ranges() {
        let mut index = IdentityIndex::new(&rankings());
        let texts = vec![
            "a\n\nb".to_string(),
            "".to_string(),
            "c\nd\ne".to_string(),
        ];
        let passages = index.flatten(&texts, GroupLength::Paragraph);

        assert_eq!(passages, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(index.passage_range("d2"), Some(0..2));
        assert_eq!(index.passage_range("d1"), Some(2..2));
        assert_eq!(index.passage_range("d3"), Some(2..5));
        assert_eq!(index.owner(1), Some("d2"));
        assert_eq!(index.owner(4), Some("d3"));
        assert_eq!(index.owner(5), None);
        assert_eq!(index.num_passages(), 5);
    }
}
