use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClipError;

/// A single recognized word bound to its position in the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub words: Vec<WordTimestamp>,
}

/// Canonical search source for one video. Built once per successful
/// transcription and replaced wholesale on re-transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub video_id: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub segments: Vec<TranscriptSegment>,
}

/// Unvalidated recognizer output.
#[derive(Debug, Clone, Default)]
pub struct RawTranscription {
    pub language: String,
    pub segments: Vec<RawSegment>,
}

#[derive(Debug, Clone)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// `None` means the recognizer produced no word-level data at all.
    pub words: Option<Vec<RawWord>>,
}

#[derive(Debug, Clone)]
pub struct RawWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
}

/// Normalizes a word for comparison: trimmed and fully case-folded
/// (Unicode default case folding), so `STRASSE` matches `straße`.
/// Full-width Latin letters fold too; kana and kanji pass through unchanged.
pub fn normalize_word(text: &str) -> String {
    caseless::default_case_fold_str(text.trim())
}

impl Transcript {
    /// Checks recognizer output and turns it into a transcript.
    ///
    /// Segments without word data are a configuration problem: search is
    /// word-level only, there is no segment-level fallback. Blank words
    /// are dropped; words out of order or overlapping are rejected, while
    /// overlapping segment bounds are clamped so segments never overlap.
    pub fn from_recognition(video_id: &str, raw: RawTranscription) -> Result<Self, ClipError> {
        let mut segments: Vec<TranscriptSegment> = Vec::with_capacity(raw.segments.len());
        let mut last_end = 0.0_f64;

        for (seg_idx, seg) in raw.segments.into_iter().enumerate() {
            if !seg.start.is_finite() || !seg.end.is_finite() || seg.start > seg.end {
                return Err(ClipError::Recognition(format!(
                    "segment {seg_idx} has invalid bounds {}..{}",
                    seg.start, seg.end
                )));
            }
            let raw_words = seg.words.ok_or_else(|| {
                ClipError::Configuration(format!(
                    "recognizer returned segment {seg_idx} without word-level timestamps"
                ))
            })?;

            let mut words: Vec<WordTimestamp> = Vec::with_capacity(raw_words.len());
            for word in raw_words {
                let text = word.text.trim();
                if text.is_empty() {
                    continue;
                }
                if !word.start.is_finite() || !word.end.is_finite() || word.start >= word.end {
                    return Err(ClipError::Recognition(format!(
                        "word {text:?} in segment {seg_idx} has invalid bounds {}..{}",
                        word.start, word.end
                    )));
                }
                if word.start < 0.0 || word.start < last_end {
                    return Err(ClipError::Recognition(format!(
                        "word {text:?} in segment {seg_idx} starts at {} before the previous word ends at {last_end}",
                        word.start
                    )));
                }
                if !(0.0..=1.0).contains(&word.confidence) {
                    return Err(ClipError::Recognition(format!(
                        "word {text:?} in segment {seg_idx} has confidence {} outside 0..1",
                        word.confidence
                    )));
                }
                last_end = word.end;
                words.push(WordTimestamp {
                    text: text.to_string(),
                    start: word.start,
                    end: word.end,
                    confidence: word.confidence,
                });
            }

            // The segment must span its words.
            let first_word = words.first().map(|w| w.start);
            let mut start = first_word.map_or(seg.start, |w| seg.start.min(w)).max(0.0);
            let mut end = words.last().map_or(seg.end, |w| seg.end.max(w.end));

            // Segments must not overlap: the boundary moves to wherever the
            // words allow, shrinking the previous segment if needed.
            if let Some(prev) = segments.last_mut() {
                let floor = prev.words.last().map_or(prev.start, |w| w.end);
                start = start.max(first_word.map_or(floor, |w| floor.min(w)));
                prev.end = prev.end.min(start);
                prev.start = prev.start.min(prev.end);
            }
            end = end.max(start);

            segments.push(TranscriptSegment {
                start,
                end,
                text: seg.text.trim().to_string(),
                words,
            });
        }

        Ok(Self {
            video_id: video_id.to_string(),
            language: raw.language,
            created_at: Utc::now(),
            segments,
        })
    }

    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.words.len()).sum()
    }

    /// End of the last word, used when no probed duration is available.
    pub fn last_word_end(&self) -> Option<f64> {
        self.segments
            .iter()
            .rev()
            .find_map(|s| s.words.last().map(|w| w.end))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn raw_word(text: &str, start: f64, end: f64) -> RawWord {
        RawWord {
            text: text.to_string(),
            start,
            end,
            confidence: 0.9,
        }
    }

    pub(crate) fn raw_segment(words: Vec<RawWord>) -> RawSegment {
        let start = words.first().map_or(0.0, |w| w.start);
        let end = words.last().map_or(0.0, |w| w.end);
        let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join("");
        RawSegment {
            start,
            end,
            text,
            words: Some(words),
        }
    }

    /// Builds a transcript from `(text, start, end)` words, one inner slice per segment.
    pub(crate) fn transcript(segments: &[&[(&str, f64, f64)]]) -> Transcript {
        let raw = RawTranscription {
            language: "ja".to_string(),
            segments: segments
                .iter()
                .map(|words| {
                    raw_segment(
                        words
                            .iter()
                            .map(|(t, s, e)| raw_word(t, *s, *e))
                            .collect(),
                    )
                })
                .collect(),
        };
        Transcript::from_recognition("video-1", raw).unwrap()
    }

    #[test]
    fn normalize_folds_case_and_trims() {
        assert_eq!(normalize_word("  Hello "), "hello");
        assert_eq!(normalize_word("ＡＢＣ"), "ａｂｃ");
        assert_eq!(normalize_word(" こんにちは"), "こんにちは");
        assert_eq!(normalize_word("ÉCOLE"), "école");
        assert_eq!(normalize_word("STRASSE"), "strasse");
        assert_eq!(normalize_word("straße"), normalize_word("STRASSE"));
    }

    #[test]
    fn segment_without_words_is_a_configuration_error() {
        let raw = RawTranscription {
            language: "ja".into(),
            segments: vec![RawSegment {
                start: 0.0,
                end: 1.0,
                text: "hello".into(),
                words: None,
            }],
        };
        let err = Transcript::from_recognition("v", raw).unwrap_err();
        assert!(matches!(err, ClipError::Configuration(_)));
    }

    #[test]
    fn overlapping_words_are_rejected() {
        let raw = RawTranscription {
            language: "ja".into(),
            segments: vec![raw_segment(vec![
                raw_word("a", 1.0, 2.0),
                raw_word("b", 1.5, 2.5),
            ])],
        };
        let err = Transcript::from_recognition("v", raw).unwrap_err();
        assert!(matches!(err, ClipError::Recognition(_)));
    }

    #[test]
    fn overlapping_segments_are_clamped_around_their_words() {
        let raw = RawTranscription {
            language: "ja".into(),
            segments: vec![
                RawSegment {
                    start: 0.0,
                    end: 5.0,
                    text: "今日は".into(),
                    words: Some(vec![raw_word("今日", 0.5, 1.0), raw_word("は", 1.0, 2.6)]),
                },
                RawSegment {
                    start: 2.4,
                    end: 4.0,
                    text: "晴れ".into(),
                    words: Some(vec![raw_word("晴れ", 2.7, 3.0)]),
                },
                RawSegment {
                    start: 3.5,
                    end: 3.8,
                    text: String::new(),
                    words: Some(Vec::new()),
                },
            ],
        };
        let t = Transcript::from_recognition("v", raw).unwrap();
        let bounds: Vec<(f64, f64)> = t.segments.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(bounds, [(0.0, 2.6), (2.6, 3.5), (3.5, 3.8)]);

        for pair in t.segments.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for seg in &t.segments {
            assert!(seg.start <= seg.end);
            for w in &seg.words {
                assert!(seg.start <= w.start && w.end <= seg.end);
            }
        }
    }

    #[test]
    fn segment_with_inverted_bounds_is_rejected() {
        let raw = RawTranscription {
            language: "ja".into(),
            segments: vec![RawSegment {
                start: 3.0,
                end: 1.0,
                text: "x".into(),
                words: Some(Vec::new()),
            }],
        };
        assert!(matches!(
            Transcript::from_recognition("v", raw),
            Err(ClipError::Recognition(_))
        ));
    }

    #[test]
    fn zero_length_word_is_rejected() {
        let raw = RawTranscription {
            language: "ja".into(),
            segments: vec![raw_segment(vec![raw_word("a", 1.0, 1.0)])],
        };
        assert!(Transcript::from_recognition("v", raw).is_err());
    }

    #[test]
    fn blank_words_are_dropped_and_text_trimmed() {
        let raw = RawTranscription {
            language: "ja".into(),
            segments: vec![raw_segment(vec![
                raw_word(" 今日", 1.0, 1.3),
                raw_word("   ", 1.3, 1.4),
                raw_word("は ", 1.4, 1.6),
            ])],
        };
        let t = Transcript::from_recognition("v", raw).unwrap();
        let texts: Vec<_> = t.segments[0].words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["今日", "は"]);
        assert_eq!(t.word_count(), 2);
        assert_eq!(t.last_word_end(), Some(1.6));
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let t = transcript(&[&[("今日", 1.0, 1.3), ("は", 1.3, 1.6)], &[("晴れ", 2.0, 2.4)]]);
        let json = serde_json::to_string(&t).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["video_id"], "video-1");
        assert_eq!(value["segments"][0]["words"][1]["text"], "は");
    }
}
