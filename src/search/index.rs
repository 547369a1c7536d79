use std::collections::HashMap;

use crate::transcript::{Transcript, WordTimestamp, normalize_word};

/// Position of a word inside a transcript: `(segment_index, word_index)`.
pub type WordPosition = (usize, usize);

#[derive(Debug, Clone)]
pub struct Occurrence {
    pub segment_index: usize,
    pub word_index: usize,
    pub word: WordTimestamp,
}

/// Lookup table from normalized word text to every place the word was spoken.
///
/// Occurrence lists are filled in transcript order, so they come out sorted
/// by start time without a separate sort.
#[derive(Debug)]
pub struct WordIndex {
    transcript: Transcript,
    occurrences: HashMap<String, Vec<Occurrence>>,
    normalized: Vec<Vec<String>>,
}

impl WordIndex {
    pub fn new(transcript: Transcript) -> Self {
        let mut occurrences: HashMap<String, Vec<Occurrence>> = HashMap::new();
        let mut normalized = Vec::with_capacity(transcript.segments.len());

        for (segment_index, segment) in transcript.segments.iter().enumerate() {
            let mut seg_norm = Vec::with_capacity(segment.words.len());
            for (word_index, word) in segment.words.iter().enumerate() {
                let key = normalize_word(&word.text);
                occurrences.entry(key.clone()).or_default().push(Occurrence {
                    segment_index,
                    word_index,
                    word: word.clone(),
                });
                seg_norm.push(key);
            }
            normalized.push(seg_norm);
        }

        Self {
            transcript,
            occurrences,
            normalized,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// `word` must already be normalized.
    pub fn occurrences_of(&self, word: &str) -> &[Occurrence] {
        self.occurrences.get(word).map_or(&[], Vec::as_slice)
    }

    pub fn word_at(&self, segment_index: usize, word_index: usize) -> Option<&WordTimestamp> {
        self.transcript
            .segments
            .get(segment_index)?
            .words
            .get(word_index)
    }

    pub(crate) fn normalized_at(&self, segment_index: usize, word_index: usize) -> Option<&str> {
        self.normalized
            .get(segment_index)?
            .get(word_index)
            .map(String::as_str)
    }

    /// The word spoken right after `pos`: the next word in the same segment, or
    /// the first word of the next segment that has any words.
    pub fn next_position(&self, (segment_index, word_index): WordPosition) -> Option<WordPosition> {
        let segments = &self.transcript.segments;
        if word_index + 1 < segments.get(segment_index)?.words.len() {
            return Some((segment_index, word_index + 1));
        }
        segments
            .iter()
            .enumerate()
            .skip(segment_index + 1)
            .find(|(_, seg)| !seg.words.is_empty())
            .map(|(idx, _)| (idx, 0))
    }

    pub fn segment_text(&self, segment_index: usize) -> &str {
        self.transcript
            .segments
            .get(segment_index)
            .map_or("", |s| s.text.as_str())
    }

    pub fn distinct_words(&self) -> usize {
        self.occurrences.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::tests::transcript;

    #[test]
    fn occurrences_are_time_ordered_across_segments() {
        let index = WordIndex::new(transcript(&[
            &[("犬", 0.5, 0.8), ("と", 0.8, 0.9), ("犬", 1.0, 1.4)],
            &[("猫", 2.0, 2.3)],
            &[("犬", 3.0, 3.2)],
        ]));

        let occ = index.occurrences_of("犬");
        let positions: Vec<_> = occ.iter().map(|o| (o.segment_index, o.word_index)).collect();
        assert_eq!(positions, [(0, 0), (0, 2), (2, 0)]);
        assert!(occ.windows(2).all(|w| w[0].word.start < w[1].word.start));
        assert_eq!(index.distinct_words(), 3);
    }

    #[test]
    fn keys_are_normalized() {
        let index = WordIndex::new(transcript(&[&[("Hello", 0.0, 0.5), ("HELLO", 1.0, 1.5)]]));
        assert_eq!(index.occurrences_of("hello").len(), 2);
        assert!(index.occurrences_of("Hello").is_empty());
        assert_eq!(index.normalized_at(0, 1), Some("hello"));
    }

    #[test]
    fn word_at_and_next_position() {
        let index = WordIndex::new(transcript(&[
            &[("a", 0.0, 0.5), ("b", 0.5, 1.0)],
            &[],
            &[("c", 2.0, 2.5)],
        ]));

        assert_eq!(index.word_at(0, 1).map(|w| w.text.as_str()), Some("b"));
        assert!(index.word_at(1, 0).is_none());
        assert!(index.word_at(9, 0).is_none());

        assert_eq!(index.next_position((0, 0)), Some((0, 1)));
        assert_eq!(index.next_position((0, 1)), Some((2, 0)));
        assert_eq!(index.next_position((2, 0)), None);
    }

    #[test]
    fn unknown_word_has_no_occurrences() {
        let index = WordIndex::new(transcript(&[&[("a", 0.0, 0.5)]]));
        assert!(index.occurrences_of("z").is_empty());
        assert_eq!(index.segment_text(0), "a");
        assert_eq!(index.segment_text(5), "");
    }
}
