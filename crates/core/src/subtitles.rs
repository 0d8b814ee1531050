//! Word-level subtitle timing derived from character-level TTS alignment.
//!
//! The TTS provider returns one timestamp pair per character. Words are
//! rebuilt from those characters, then post-processed into display units
//! that are comfortable to read without changing when anything is spoken.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Characters that end a word and are emitted as their own token.
pub const BOUNDARY_PUNCTUATION: &[char] = &['.', ',', ';', '!', '?'];

/// Short function words merged with the word that follows them.
pub const SHORT_WORDS: &[&str] = &[
    "a", "i", "an", "to", "in", "is", "it", "of", "on", "or", "be", "as", "at", "by", "my", "we",
    "he", "she",
];

static UNSAFE_SUBTITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N} .!?\-’]").expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A spoken word (or merged display unit) and the interval it is heard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    /// Seconds from the start of the narration audio.
    pub start: f64,
    pub end: f64,
}

impl WordTimestamp {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }
}

/// Character-level alignment as returned by the TTS provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterAlignment {
    pub characters: Vec<String>,
    pub start_times: Vec<f64>,
    pub end_times: Vec<f64>,
}

impl CharacterAlignment {
    /// The three arrays must be parallel.
    pub fn validate(&self) -> Result<(), CoreError> {
        let n = self.characters.len();
        if self.start_times.len() != n || self.end_times.len() != n {
            return Err(CoreError::Validation(format!(
                "Alignment arrays differ in length: {} characters, {} starts, {} ends",
                n,
                self.start_times.len(),
                self.end_times.len()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Word extraction
// ---------------------------------------------------------------------------

struct PendingWord {
    text: String,
    start: f64,
    end: f64,
}

fn flush(pending: &mut Option<PendingWord>, out: &mut Vec<WordTimestamp>) {
    if let Some(w) = pending.take() {
        if !w.text.is_empty() {
            out.push(WordTimestamp::new(w.text, w.start, w.end));
        }
    }
}

/// Rebuild words from character-level alignment.
///
/// A word ends at whitespace, at boundary punctuation, or at the end of the
/// text. Its start is its first character's start and its end is its last
/// character's end. Boundary punctuation becomes a token of its own.
pub fn extract_words(alignment: &CharacterAlignment) -> Result<Vec<WordTimestamp>, CoreError> {
    alignment.validate()?;

    let mut words = Vec::new();
    let mut pending: Option<PendingWord> = None;

    for (i, ch) in alignment.characters.iter().enumerate() {
        let start = alignment.start_times[i];
        let end = alignment.end_times[i];

        if ch.chars().all(char::is_whitespace) {
            flush(&mut pending, &mut words);
            continue;
        }

        if ch.chars().count() == 1 && ch.chars().all(|c| BOUNDARY_PUNCTUATION.contains(&c)) {
            flush(&mut pending, &mut words);
            words.push(WordTimestamp::new(ch.clone(), start, end));
            continue;
        }

        match pending.as_mut() {
            Some(w) => {
                w.text.push_str(ch);
                w.end = end;
            }
            None => {
                pending = Some(PendingWord {
                    text: ch.clone(),
                    start,
                    end,
                });
            }
        }
    }
    flush(&mut pending, &mut words);

    Ok(words)
}

// ---------------------------------------------------------------------------
// Display optimisation
// ---------------------------------------------------------------------------

fn is_punctuation_only(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_punctuation())
}

fn is_short_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    SHORT_WORDS.contains(&lower.as_str())
}

/// Turn extracted words into subtitle display units.
///
/// Standalone punctuation is dropped. A short function word is merged with
/// the word that immediately follows it; the unit starts when the short
/// word starts and ends when the following word ends. Word count never
/// increases and no timing is moved.
pub fn optimize_words_for_subtitles(words: &[WordTimestamp]) -> Vec<WordTimestamp> {
    let kept: Vec<&WordTimestamp> = words
        .iter()
        .filter(|w| !is_punctuation_only(&w.word))
        .collect();

    let mut out = Vec::with_capacity(kept.len());
    let mut i = 0;
    while i < kept.len() {
        let current = kept[i];
        if is_short_word(&current.word) {
            if let Some(next) = kept.get(i + 1) {
                out.push(WordTimestamp::new(
                    format!("{} {}", current.word, next.word),
                    current.start,
                    next.end,
                ));
                i += 2;
                continue;
            }
        }
        out.push(current.clone());
        i += 1;
    }
    out
}

/// Shift every timestamp by `offset` seconds (leading silence padding).
pub fn shift_words(words: &[WordTimestamp], offset: f64) -> Vec<WordTimestamp> {
    words
        .iter()
        .map(|w| WordTimestamp::new(w.word.clone(), w.start + offset, w.end + offset))
        .collect()
}

/// Reduce subtitle text to a safe character subset.
///
/// Straight apostrophes become typographic ones, everything outside
/// letters, digits, space and `. ! ? -` is removed, and whitespace runs
/// collapse to one space.
pub fn sanitize_subtitle_text(text: &str) -> String {
    let curly = text.replace('\'', "’");
    let stripped = UNSAFE_SUBTITLE_CHARS.replace_all(&curly, "");
    WHITESPACE_RUN.replace_all(stripped.trim(), " ").into_owned()
}
