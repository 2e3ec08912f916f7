//! Document to passage splitting
//!
//! Paragraphs are separated by line breaks. Consecutive paragraphs are grouped until adding
//! the next one would push the passage over the group length, and paragraphs are never cut.

use crate::config::GroupLength;

/// Split `text` into passages
pub fn split_document(text: &str, group_length: GroupLength) -> Passages<'_> {
    Passages {
        paragraphs: text.split('\n'),
        limit: group_length.limit(),
        pending: Vec::new(),
        pending_len: 0,
    }
}

/// Lazy passage sequence produced by [`split_document`]
#[derive(Debug, Clone)]
pub struct Passages<'a> {
    paragraphs: std::str::Split<'a, char>,
    limit: usize,
    pending: Vec<&'a str>,
    /// Characters buffered in `pending`, separators excluded
    pending_len: usize,
}

impl<'a> Passages<'a> {
    fn flush(&mut self) -> String {
        let passage = self.pending.join(" ");
        self.pending.clear();
        self.pending_len = 0;
        passage
    }
}

impl<'a> Iterator for Passages<'a> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        for paragraph in self.paragraphs.by_ref() {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            let len = paragraph.chars().count();

            if !self.pending.is_empty() && self.pending_len.saturating_add(len) > self.limit {
                let passage = self.flush();
                self.pending.push(paragraph);
                self.pending_len = len;
                return Some(passage);
            }

            self.pending.push(paragraph);
            self.pending_len = self.pending_len.saturating_add(len);
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(self.flush())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "First paragraph.\n\n  Second one  \n\n\nThird.\nFourth paragraph here.";

    #[test]
    fn test_paragraph_per_passage() {
        let passages: Vec<String> = split_document(DOC, GroupLength::Paragraph).collect();
        assert_eq!(
            passages,
            vec![
                "First paragraph.",
                "Second one",
                "Third.",
                "Fourth paragraph here."
            ]
        );
    }

    #[test]
    fn test_whole_document() {
        let passages: Vec<String> = split_document(DOC, GroupLength::Document).collect();
        assert_eq!(
            passages,
            vec!["First paragraph. Second one Third. Fourth paragraph here."]
        );
    }

    #[test]
    fn test_grouping_threshold() {
        // 16 + 10 = 26 fits, adding "Third." (6) would make 32
        let passages: Vec<String> = split_document(DOC, GroupLength::Chars(30)).collect();
        assert_eq!(
            passages,
            vec![
                "First paragraph. Second one",
                "Third. Fourth paragraph here."
            ]
        );
    }

    #[test]
    fn test_long_paragraph_is_not_cut() {
        let text = "short\n\nthis paragraph is much longer than the limit\n\nend";
        let passages: Vec<String> = split_document(text, GroupLength::Chars(10)).collect();
        assert_eq!(
            passages,
            vec![
                "short",
                "this paragraph is much longer than the limit",
                "end"
            ]
        );
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(split_document("", GroupLength::Document).count(), 0);
        assert_eq!(split_document(" \n\n \t\n", GroupLength::Paragraph).count(), 0);
    }

    #[test]
    fn test_restartable() {
        let passages = split_document(DOC, GroupLength::Chars(30));
        let first: Vec<String> = passages.clone().collect();
        let second: Vec<String> = passages.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_length_counts_characters() {
        // 5 characters each, 10 bytes each
        let text = "ééééé\nààààà";
        let passages: Vec<String> = split_document(text, GroupLength::Chars(10)).collect();
        assert_eq!(passages, vec!["ééééé ààààà"]);
    }
}
