use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::index::{WordIndex, WordPosition};
use crate::transcript::normalize_word;

/// A hit in the transcript. For multi-word hits `start` is the first word's
/// start and `end` the last word's end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordMatch {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub segment_index: usize,
    pub context_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// The query equals one word.
    #[default]
    Word,
    /// Whitespace-separated query words spoken back to back.
    Phrase,
    /// The query, spaces removed, equals consecutive words glued together
    /// inside one segment. Meant for text written without spaces.
    Joined,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Word => "word",
            SearchMode::Phrase => "phrase",
            SearchMode::Joined => "joined",
        })
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "word" => Ok(SearchMode::Word),
            "phrase" => Ok(SearchMode::Phrase),
            "joined" => Ok(SearchMode::Joined),
            other => Err(format!(
                "Unknown search mode '{other}' (expected word, phrase or joined)"
            )),
        }
    }
}

pub fn search(index: &WordIndex, query: &str, mode: SearchMode) -> Vec<WordMatch> {
    match mode {
        SearchMode::Word => search_word(index, query),
        SearchMode::Phrase => {
            let words: Vec<&str> = query.split_whitespace().collect();
            search_phrase(index, &words)
        }
        SearchMode::Joined => search_joined(index, query),
    }
}

pub fn search_word(index: &WordIndex, query: &str) -> Vec<WordMatch> {
    let key = normalize_word(query);
    if key.is_empty() {
        return Vec::new();
    }

    index
        .occurrences_of(&key)
        .iter()
        .map(|occ| WordMatch {
            text: occ.word.text.clone(),
            start: occ.word.start,
            end: occ.word.end,
            segment_index: occ.segment_index,
            context_text: index.segment_text(occ.segment_index).to_string(),
        })
        .collect()
}

/// Every position where all `query_words` are spoken consecutively, possibly
/// running over a segment boundary. Overlapping hits are all kept.
pub fn search_phrase<S: AsRef<str>>(index: &WordIndex, query_words: &[S]) -> Vec<WordMatch> {
    let tokens: Vec<String> = query_words
        .iter()
        .map(|w| normalize_word(w.as_ref()))
        .filter(|w| !w.is_empty())
        .collect();

    let Some((first, rest)) = tokens.split_first() else {
        return Vec::new();
    };

    let mut matches = Vec::new();
    for occ in index.occurrences_of(first) {
        let mut pos: WordPosition = (occ.segment_index, occ.word_index);
        let mut texts = vec![occ.word.text.as_str()];
        let mut complete = true;

        for token in rest {
            let next = index
                .next_position(pos)
                .filter(|&(s, w)| index.normalized_at(s, w) == Some(token.as_str()));
            match next {
                Some(p) => {
                    pos = p;
                    if let Some(word) = index.word_at(p.0, p.1) {
                        texts.push(word.text.as_str());
                    }
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }

        if !complete {
            continue;
        }
        if let Some(last) = index.word_at(pos.0, pos.1) {
            matches.push(WordMatch {
                text: texts.join(" "),
                start: occ.word.start,
                end: last.end,
                segment_index: occ.segment_index,
                context_text: index.segment_text(occ.segment_index).to_string(),
            });
        }
    }
    matches
}

/// Shortest run of words starting at each position whose glued text equals
/// the query. Runs stay inside one segment and always begin and end on word
/// boundaries.
pub fn search_joined(index: &WordIndex, query: &str) -> Vec<WordMatch> {
    let target: String = normalize_word(query)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if target.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for (segment_index, segment) in index.transcript().segments.iter().enumerate() {
        for first in 0..segment.words.len() {
            let mut glued = String::new();
            for last in first..segment.words.len() {
                let Some(piece) = index.normalized_at(segment_index, last) else {
                    break;
                };
                glued.push_str(piece);
                if !target.starts_with(glued.as_str()) {
                    break;
                }
                if glued.len() == target.len() {
                    let words = &segment.words[first..=last];
                    matches.push(WordMatch {
                        text: words.iter().map(|w| w.text.as_str()).collect(),
                        start: words[0].start,
                        end: words[words.len() - 1].end,
                        segment_index,
                        context_text: segment.text.clone(),
                    });
                    break;
                }
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::tests::transcript;

    fn spans(matches: &[WordMatch]) -> Vec<(f64, f64)> {
        matches.iter().map(|m| (m.start, m.end)).collect()
    }

    #[test]
    fn word_search_is_case_insensitive() {
        let index = WordIndex::new(transcript(&[&[
            ("ABC", 1.0, 1.5),
            ("def", 2.0, 2.5),
            ("abc", 3.0, 3.5),
        ]]));

        let upper = search_word(&index, "ABC");
        let lower = search_word(&index, "abc");
        assert_eq!(upper, lower);
        assert_eq!(spans(&upper), [(1.0, 1.5), (3.0, 3.5)]);
        assert_eq!(upper[0].text, "ABC");
        assert_eq!(upper[0].context_text, "ABCdefabc");
    }

    #[test]
    fn word_search_does_not_match_inside_words() {
        let index = WordIndex::new(transcript(&[&[("こんにちは", 15.2, 16.5)]]));
        assert!(search_word(&index, "こんにち").is_empty());
        assert_eq!(spans(&search_word(&index, " こんにちは ")), [(15.2, 16.5)]);
    }

    #[test]
    fn empty_and_blank_queries_yield_nothing() {
        let index = WordIndex::new(transcript(&[&[("a", 0.0, 1.0)]]));
        assert!(search_word(&index, "").is_empty());
        assert!(search_word(&index, "   ").is_empty());
        assert!(search_phrase::<&str>(&index, &[]).is_empty());
        assert!(search_phrase(&index, &["  "]).is_empty());
        assert!(search_joined(&index, " \t").is_empty());
        assert!(search(&index, "  ", SearchMode::Phrase).is_empty());
    }

    #[test]
    fn adjacent_phrase_matches() {
        let index = WordIndex::new(transcript(&[&[("今日", 1.0, 1.3), ("は", 1.3, 1.6)]]));
        let hits = search_phrase(&index, &["今日", "は"]);
        assert_eq!(spans(&hits), [(1.0, 1.6)]);
        assert_eq!(hits[0].text, "今日 は");
        assert_eq!(hits[0].segment_index, 0);
    }

    #[test]
    fn non_adjacent_phrase_does_not_match() {
        let index = WordIndex::new(transcript(&[&[
            ("今日", 1.0, 1.3),
            ("も", 1.3, 1.5),
            ("は", 5.0, 5.3),
        ]]));
        assert!(search(&index, "今日 は", SearchMode::Phrase).is_empty());
    }

    #[test]
    fn missing_inner_token_breaks_the_phrase() {
        let index = WordIndex::new(transcript(&[&[
            ("the", 0.0, 0.2),
            ("quick", 0.2, 0.5),
            ("fox", 0.5, 0.8),
        ]]));
        assert!(search_phrase(&index, &["the", "brown", "fox"]).is_empty());
        assert!(search_phrase(&index, &["the", "quick", "dog"]).is_empty());
        assert_eq!(
            spans(&search_phrase(&index, &["THE", "Quick", "fox"])),
            [(0.0, 0.8)]
        );
    }

    #[test]
    fn phrase_may_cross_a_segment_boundary() {
        let index = WordIndex::new(transcript(&[
            &[("それ", 0.0, 0.4), ("では", 0.4, 0.8)],
            &[],
            &[("また", 1.5, 1.9), ("明日", 1.9, 2.4)],
        ]));
        let hits = search_phrase(&index, &["では", "また"]);
        assert_eq!(spans(&hits), [(0.4, 1.9)]);
        assert_eq!(hits[0].segment_index, 0);
    }

    #[test]
    fn overlapping_phrase_matches_are_all_reported() {
        let index = WordIndex::new(transcript(&[&[
            ("no", 0.0, 0.2),
            ("no", 0.2, 0.4),
            ("no", 0.4, 0.6),
        ]]));
        let hits = search_phrase(&index, &["no", "no"]);
        assert_eq!(spans(&hits), [(0.0, 0.4), (0.2, 0.6)]);
    }

    #[test]
    fn single_token_phrase_matches_like_word_search() {
        let index = WordIndex::new(transcript(&[&[("a", 0.0, 1.0), ("b", 1.0, 2.0)]]));
        assert_eq!(
            spans(&search(&index, "b", SearchMode::Phrase)),
            spans(&search(&index, "b", SearchMode::Word))
        );
    }

    #[test]
    fn joined_search_glues_consecutive_words() {
        let index = WordIndex::new(transcript(&[
            &[("こん", 1.0, 1.2), ("にち", 1.2, 1.4), ("は", 1.4, 1.6), ("世界", 1.7, 2.0)],
            &[("こん", 5.0, 5.2), ("ばん", 5.2, 5.4), ("は", 5.4, 5.6)],
        ]));

        let hits = search_joined(&index, "こんにちは");
        assert_eq!(spans(&hits), [(1.0, 1.6)]);
        assert_eq!(hits[0].text, "こんにちは");
        assert_eq!(hits[0].context_text, "こんにちは世界");

        // word boundaries are respected
        assert!(search_joined(&index, "んにちは").is_empty());
        assert!(search_joined(&index, "こんに").is_empty());
        assert_eq!(spans(&search_joined(&index, "こんにち")), [(1.0, 1.4)]);
        assert_eq!(spans(&search_joined(&index, "は")), [(1.4, 1.6), (5.4, 5.6)]);
    }

    #[test]
    fn joined_search_ignores_query_spaces() {
        let index = WordIndex::new(transcript(&[&[("Good", 0.0, 0.3), ("Bye", 0.3, 0.6)]]));
        assert_eq!(spans(&search(&index, "good bye", SearchMode::Joined)), [(0.0, 0.6)]);
        assert_eq!(spans(&search(&index, "GOODBYE", SearchMode::Joined)), [(0.0, 0.6)]);
    }

    #[test]
    fn search_mode_parses() {
        assert_eq!("Phrase".parse::<SearchMode>(), Ok(SearchMode::Phrase));
        assert_eq!(" joined".parse::<SearchMode>(), Ok(SearchMode::Joined));
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::Word.to_string(), "word");
    }
}
