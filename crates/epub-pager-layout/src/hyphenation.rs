//! Liang pattern hyphenation.
//!
//! Words that already contain a literal `-` only break there; pattern
//! hyphenation applies to everything else. Offsets are byte offsets into
//! the word, always on a char boundary. Fragment minimums count chars.

use heapless::Vec as BoundedVec;
use serde::{Deserialize, Serialize};

use crate::patterns;

/// Upper bound on positions returned for one word.
pub const MAX_BREAK_POINTS: usize = 32;

/// Words longer than this many bytes are not pattern-hyphenated.
pub const MAX_WORD_BYTES: usize = 128;

/// Break offsets of one word.
pub type BreakOffsets = BoundedVec<usize, MAX_BREAK_POINTS>;

/// Hyphenation language.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// US English patterns.
    #[default]
    English,
    /// German patterns.
    German,
    /// Break at literal hyphens only.
    Basic,
    /// Never break words.
    None,
}

impl Language {
    /// Map a BCP 47 style code (`"en"`, `"de-AT"`, ...). Unknown codes
    /// select [`Language::None`].
    pub fn from_code(code: &str) -> Self {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Self::English,
            "de" => Self::German,
            "basic" => Self::Basic,
            _ => Self::None,
        }
    }

    /// Recommended fragment limits for this language.
    pub fn defaults(self) -> HyphenationParams {
        match self {
            Self::German => HyphenationParams {
                min_word_length: 5,
                min_left: 2,
                min_right: 3,
            },
            _ => HyphenationParams::default(),
        }
    }

    fn patterns(self) -> Option<&'static [&'static str]> {
        match self {
            Self::English => Some(patterns::ENGLISH),
            Self::German => Some(patterns::GERMAN),
            Self::Basic | Self::None => None,
        }
    }
}

/// Fragment limits, counted in chars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyphenationParams {
    /// Shorter words are never broken.
    pub min_word_length: usize,
    /// Minimum chars before a break.
    pub min_left: usize,
    /// Minimum chars after a break.
    pub min_right: usize,
}

impl Default for HyphenationParams {
    fn default() -> Self {
        Self {
            min_word_length: 6,
            min_left: 3,
            min_right: 3,
        }
    }
}

/// A permitted break inside a word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakPoint {
    /// Byte offset where the second fragment starts.
    pub offset: usize,
    /// Whether a `-` must be drawn at the end of the first fragment.
    pub insert_hyphen: bool,
}

/// Language-bound hyphenator. Pattern tables are static and shared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hyphenator {
    language: Language,
    params: HyphenationParams,
}

impl Hyphenator {
    /// Hyphenator with the language's recommended limits.
    pub fn new(language: Language) -> Self {
        Self {
            language,
            params: language.defaults(),
        }
    }

    /// Override the fragment limits.
    pub fn with_params(mut self, params: HyphenationParams) -> Self {
        self.params = params;
        self
    }

    /// Selected language.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Active fragment limits.
    pub fn params(&self) -> HyphenationParams {
        self.params
    }

    /// Break offsets for `word`.
    ///
    /// With literal hyphens present the result is exactly their byte
    /// offsets. Otherwise each offset `k` splits the word into fragments of
    /// at least `min_left` and `min_right` chars.
    pub fn hyphenate(
        &self,
        word: &str,
        min_word_length: usize,
        min_left: usize,
        min_right: usize,
    ) -> BreakOffsets {
        let mut out = BreakOffsets::new();
        if self.language == Language::None || word.chars().count() < min_word_length {
            return out;
        }
        if word.contains('-') {
            for (idx, _) in word.match_indices('-') {
                if out.push(idx).is_err() {
                    break;
                }
            }
            return out;
        }
        let Some(table) = self.language.patterns() else {
            return out;
        };
        liang(word, table, min_left, min_right, &mut out);
        out
    }

    /// [`Hyphenator::hyphenate`] with this hyphenator's own limits.
    pub fn positions(&self, word: &str) -> BreakOffsets {
        self.hyphenate(
            word,
            self.params.min_word_length,
            self.params.min_left,
            self.params.min_right,
        )
    }

    /// Typed break points for `word`.
    ///
    /// Literal hyphens stay with the first fragment and need no inserted
    /// glyph; pattern breaks need one.
    pub fn break_points(&self, word: &str) -> BoundedVec<BreakPoint, MAX_BREAK_POINTS> {
        let literal = word.contains('-');
        let mut out = BoundedVec::new();
        for offset in self.positions(word) {
            let point = if literal {
                BreakPoint {
                    offset: offset + 1,
                    insert_hyphen: false,
                }
            } else {
                BreakPoint {
                    offset,
                    insert_hyphen: true,
                }
            };
            // A trailing hyphen leaves nothing to carry over.
            if point.offset == 0 || point.offset >= word.len() {
                continue;
            }
            if out.push(point).is_err() {
                break;
            }
        }
        out
    }
}

fn liang(
    word: &str,
    table: &'static [&'static str],
    min_left: usize,
    min_right: usize,
    out: &mut BreakOffsets,
) {
    let bytes = word.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_WORD_BYTES {
        return;
    }

    let mut ext = [0u8; MAX_WORD_BYTES + 2];
    let ext_len = bytes.len() + 2;
    ext[0] = b'.';
    let mut cursor = 1;
    for ch in word.chars() {
        // Only folds that keep the byte length, so offsets stay aligned.
        let mut lower = ch.to_lowercase();
        let folded = match (lower.next(), lower.next()) {
            (Some(l), None) if l.len_utf8() == ch.len_utf8() => l,
            _ => ch,
        };
        cursor += folded.encode_utf8(&mut ext[cursor..]).len();
    }
    ext[ext_len - 1] = b'.';
    let ext = &ext[..ext_len];

    let mut scores = [0u8; MAX_WORD_BYTES + 3];
    for start in 0..ext_len {
        let longest = (ext_len - start).min(patterns::MAX_PATTERN_LETTERS);
        for len in 1..=longest {
            if let Some(pattern) = patterns::lookup(table, &ext[start..start + len]) {
                patterns::apply(pattern, start, &mut scores);
            }
        }
    }

    let total_chars = word.chars().count();
    for k in 1..bytes.len() {
        if scores[k + 1] % 2 == 0 || !word.is_char_boundary(k) {
            continue;
        }
        let left = word[..k].chars().count();
        if left < min_left || total_chars - left < min_right {
            continue;
        }
        if out.push(k).is_err() {
            break;
        }
    }
}
