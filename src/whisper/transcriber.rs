use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{downmix_to_mono, load_wav};
use crate::pipeline::traits::{RecognitionRequest, Recognizer};
use crate::transcript::{RawSegment, RawTranscription, RawWord};
use crate::whisper::config::WhisperConfig;
use crate::whisper::resampler::resample_to_16khz;

/// Shortest span a word may have once its timestamps have been tidied.
const MIN_WORD_SECS: f64 = 0.01;

/// One decoded token with its timing, before word assembly.
#[derive(Debug, Clone)]
pub(crate) struct TokenPiece {
    pub bytes: Vec<u8>,
    pub start: f64,
    pub end: f64,
    pub probability: f32,
}

/// Languages written without spaces between words. Every complete
/// character sequence whisper emits as a token counts as a word there.
fn is_unspaced(language: &str) -> bool {
    matches!(language, "ja" | "zh" | "th" | "lo" | "my" | "km" | "yue")
}

fn is_special(bytes: &[u8]) -> bool {
    matches!(bytes.first(), Some(b'[') | Some(b'<'))
}

struct PendingWord {
    bytes: Vec<u8>,
    start: f64,
    end: f64,
    probability_sum: f32,
    pieces: u32,
}

impl PendingWord {
    fn from_piece(piece: &TokenPiece) -> Self {
        Self {
            bytes: piece.bytes.clone(),
            start: piece.start,
            end: piece.end,
            probability_sum: piece.probability,
            pieces: 1,
        }
    }

    fn push(&mut self, piece: &TokenPiece) {
        self.bytes.extend_from_slice(&piece.bytes);
        self.end = self.end.max(piece.end);
        self.probability_sum += piece.probability;
        self.pieces += 1;
    }

    fn is_complete_text(&self) -> bool {
        std::str::from_utf8(&self.bytes).is_ok()
    }

    /// Emits the word with its start pushed past `floor` so words never
    /// overlap, or `None` if it holds no text.
    fn finish(self, floor: &mut f64) -> Option<RawWord> {
        let text = String::from_utf8_lossy(&self.bytes).trim().to_string();
        if text.is_empty() {
            return None;
        }
        let start = self.start.max(*floor).max(0.0);
        let end = self.end.max(start + MIN_WORD_SECS);
        *floor = end;
        Some(RawWord {
            text,
            start,
            end,
            confidence: (self.probability_sum / self.pieces as f32).clamp(0.0, 1.0),
        })
    }
}

/// Groups token pieces into words.
///
/// For spaced scripts a leading space opens a new word. For unspaced
/// scripts each piece is its own word, except that byte fragments of a
/// multi-byte character are glued to their neighbours until they decode.
pub(crate) fn assemble_words(pieces: &[TokenPiece], language: &str, floor: &mut f64) -> Vec<RawWord> {
    let unspaced = is_unspaced(language);
    let mut words = Vec::new();
    let mut pending: Option<PendingWord> = None;

    for piece in pieces.iter().filter(|p| !is_special(&p.bytes)) {
        let opens_word = match &pending {
            None => true,
            Some(current) if unspaced => current.is_complete_text(),
            Some(_) => piece.bytes.first() == Some(&b' '),
        };

        if opens_word {
            if let Some(done) = pending.take() {
                words.extend(done.finish(floor));
            }
            pending = Some(PendingWord::from_piece(piece));
        } else if let Some(current) = pending.as_mut() {
            current.push(piece);
        }
    }
    if let Some(done) = pending {
        words.extend(done.finish(floor));
    }
    words
}

/// The language whisper actually decoded, falling back to the requested
/// one when no id is reported. Matters when the request was `auto`.
fn resolved_language(requested: &str, detected: Option<&str>) -> String {
    match detected {
        Some(lang) if !lang.is_empty() => lang.to_string(),
        _ => requested.to_string(),
    }
}

/// Local whisper.cpp model with token-level timestamps.
#[derive(Clone)]
pub struct WhisperRecognizer {
    ctx: Arc<Mutex<WhisperContext>>,
    config: WhisperConfig,
}

impl WhisperRecognizer {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(config.use_gpu);

        let model_path = config
            .model_path
            .to_str()
            .ok_or_else(|| anyhow!("Model path is not valid UTF-8: {:?}", config.model_path))?;
        let ctx = WhisperContext::new_with_params(model_path, ctx_params)
            .map_err(|e| anyhow!("Failed to load model {model_path}: {e}"))?;

        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
            config,
        })
    }

    fn load_samples(audio: &Path) -> Result<Vec<f32>> {
        let decoded = load_wav(audio)?;
        info!(
            "Running whisper on {} ({:.1}s of audio)",
            audio.display(),
            decoded.duration_secs()
        );
        let resampled = resample_to_16khz(&decoded.samples, decoded.sample_rate, decoded.channels)?;
        Ok(downmix_to_mono(&resampled, decoded.channels))
    }

    fn run(&self, audio: &Path, language: &str) -> Result<RawTranscription> {
        let samples = Self::load_samples(audio)?;
        if samples.is_empty() {
            return Err(anyhow!("Extracted audio is empty"));
        }

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_translate(false);
        params.set_token_timestamps(true);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        if self.config.audio_context > 0 {
            params.set_audio_ctx(self.config.audio_context);
        }
        params.set_no_speech_thold(self.config.no_speech_threshold);
        params.set_n_threads(self.config.num_threads);

        let ctx = self
            .ctx
            .lock()
            .map_err(|_| anyhow!("Failed to acquire whisper context lock"))?;
        let mut state = ctx
            .create_state()
            .map_err(|e| anyhow!("Failed to create whisper state: {e}"))?;
        state
            .full(params, &samples)
            .map_err(|e| anyhow!("Failed to run transcription: {e}"))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| anyhow!("Failed to get segment count: {e}"))?;

        let detected = state
            .full_lang_id_from_state()
            .ok()
            .and_then(whisper_rs::get_lang_str);
        let language = resolved_language(language, detected);
        debug!("Decoded language: {language}");

        let mut floor = 0.0_f64;
        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let text = state
                .full_get_segment_text_lossy(i)
                .map_err(|e| anyhow!("Failed to get segment text: {e}"))?;
            let t0 = state
                .full_get_segment_t0(i)
                .map_err(|e| anyhow!("Failed to get segment start: {e}"))?;
            let t1 = state
                .full_get_segment_t1(i)
                .map_err(|e| anyhow!("Failed to get segment end: {e}"))?;

            let n_tokens = state
                .full_n_tokens(i)
                .map_err(|e| anyhow!("Failed to get token count: {e}"))?;
            let mut pieces = Vec::with_capacity(n_tokens.max(0) as usize);
            for t in 0..n_tokens {
                let data = state
                    .full_get_token_data(i, t)
                    .map_err(|e| anyhow!("Failed to get token data: {e}"))?;
                let bytes = state
                    .full_get_token_bytes(i, t)
                    .map_err(|e| anyhow!("Failed to get token text: {e}"))?;
                // Token timestamps are in centiseconds.
                pieces.push(TokenPiece {
                    bytes,
                    start: data.t0 as f64 / 100.0,
                    end: data.t1 as f64 / 100.0,
                    probability: data.p,
                });
            }

            let words = assemble_words(&pieces, &language, &mut floor);
            debug!("Segment {i}: {} tokens -> {} words", pieces.len(), words.len());
            segments.push(RawSegment {
                start: t0 as f64 / 100.0,
                end: t1 as f64 / 100.0,
                text,
                words: Some(words),
            });
        }

        Ok(RawTranscription { language, segments })
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    fn supports_word_timestamps(&self) -> bool {
        true
    }

    async fn transcribe(&self, audio: &Path, request: &RecognitionRequest) -> Result<RawTranscription> {
        let this = self.clone();
        let audio: PathBuf = audio.to_path_buf();
        let language = request.language.clone();
        tokio::task::spawn_blocking(move || this.run(&audio, &language))
            .await
            .context("Whisper worker panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(text: &[u8], start: f64, end: f64) -> TokenPiece {
        TokenPiece {
            bytes: text.to_vec(),
            start,
            end,
            probability: 0.9,
        }
    }

    #[test]
    fn spaced_language_merges_subword_pieces() {
        let pieces = [
            piece(b"[_BEG_]", 0.0, 0.0),
            piece(b" Hel", 0.5, 0.7),
            piece(b"lo", 0.7, 0.9),
            piece(b" world", 1.0, 1.4),
            piece(b"<|endoftext|>", 1.4, 1.4),
        ];
        let mut floor = 0.0;
        let words = assemble_words(&pieces, "en", &mut floor);

        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["Hello", "world"]);
        assert_eq!((words[0].start, words[0].end), (0.5, 0.9));
        assert_eq!(floor, 1.4);
    }

    #[test]
    fn unspaced_language_keeps_tokens_as_words() {
        let pieces = [piece("今日".as_bytes(), 1.0, 1.3), piece("は".as_bytes(), 1.3, 1.6)];
        let mut floor = 0.0;
        let words = assemble_words(&pieces, "ja", &mut floor);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["今日", "は"]);
    }

    #[test]
    fn split_multibyte_characters_are_rejoined() {
        let kanji = "語".as_bytes();
        let pieces = [
            piece(&kanji[..1], 2.0, 2.1),
            piece(&kanji[1..], 2.1, 2.2),
            piece("を".as_bytes(), 2.2, 2.4),
        ];
        let mut floor = 0.0;
        let words = assemble_words(&pieces, "ja", &mut floor);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "語");
        assert_eq!((words[0].start, words[0].end), (2.0, 2.2));
    }

    #[test]
    fn overlapping_and_empty_spans_are_tidied() {
        let pieces = [
            piece("あ".as_bytes(), 1.0, 1.5),
            piece("い".as_bytes(), 1.2, 1.2),
        ];
        let mut floor = 0.0;
        let words = assemble_words(&pieces, "ja", &mut floor);
        assert_eq!(words[1].start, 1.5);
        assert!(words[1].end > words[1].start);
    }

    #[test]
    fn detected_language_replaces_auto() {
        assert_eq!(resolved_language("auto", Some("ja")), "ja");
        assert_eq!(resolved_language("ja", Some("ja")), "ja");
        assert_eq!(resolved_language("auto", None), "auto");
        assert_eq!(resolved_language("ja", Some("")), "ja");
    }

    #[test]
    fn floor_carries_across_segments() {
        let mut floor = 3.0;
        let words = assemble_words(&[piece(b" late", 2.5, 3.5)], "en", &mut floor);
        assert_eq!(words[0].start, 3.0);
        assert_eq!(words[0].end, 3.5);
    }
}
