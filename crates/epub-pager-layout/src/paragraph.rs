//! Paragraph collection: word tokens to measured, breakable fragments.

use epub_pager::{BoundaryKind, FontStyle, TextAlign, WordSource};

use crate::hyphenation::{Hyphenator, Language};
use crate::layout_ir::TextMeasurer;

/// Knuth-Plass cost grows with the square of the candidate count; longer
/// paragraphs are laid out in slices of this many words.
pub const PARAGRAPH_WORD_CAP: usize = 512;

/// U+00AD. Never drawn; marks where a word may break with a hyphen.
pub const SOFT_HYPHEN: char = '\u{00AD}';

/// Where a line may end right before a fragment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BreakKind {
    /// No break: the fragment continues the previous one.
    #[default]
    None,
    /// Inter-word space; dropped when a line breaks here.
    Glue,
    /// Inside a word.
    Hyphen {
        /// Whether the line before the break needs a drawn `-`.
        insert_hyphen: bool,
    },
}

impl BreakKind {
    /// Whether a line may end here.
    pub fn allows_break(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One measured, unbreakable piece of a paragraph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Text to draw.
    pub text: String,
    /// Font style.
    pub style: FontStyle,
    /// Measured width.
    pub width: i32,
    /// Gap before the fragment unless it starts a line.
    pub glue_before: i32,
    /// Break opportunity before the fragment.
    pub break_before: BreakKind,
    /// Source index the word this fragment belongs to starts at.
    pub source_start: usize,
    /// Byte offset of the fragment inside that word.
    pub word_offset: usize,
}

impl Fragment {
    /// Whole-word fragment without a break opportunity; handy for tests
    /// and benches that feed breakers directly.
    pub fn word(text: &str, width: i32) -> Self {
        Self {
            text: text.to_string(),
            width,
            ..Self::default()
        }
    }

    /// Same fragment preceded by a breakable space of `glue` pixels.
    pub fn after_space(mut self, glue: i32) -> Self {
        self.glue_before = glue;
        self.break_before = BreakKind::Glue;
        self
    }
}

/// Width of the line `fragments[from..to]`, glue before `from` dropped.
pub fn natural_width(fragments: &[Fragment], from: usize, to: usize) -> i32 {
    fragments[from..to]
        .iter()
        .enumerate()
        .map(|(i, f)| if i == 0 { f.width } else { f.width + f.glue_before })
        .sum()
}

/// Extra width needed when a line ends right before `fragments[at]`.
pub fn break_extra(fragments: &[Fragment], at: usize, hyphen_width: i32) -> i32 {
    match fragments.get(at).map(|f| f.break_before) {
        Some(BreakKind::Hyphen {
            insert_hyphen: true,
        }) => hyphen_width,
        _ => 0,
    }
}

/// Split `starts` (line start indices) into `(from, to)` ranges.
pub fn line_ranges(starts: &[usize], len: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    starts
        .iter()
        .enumerate()
        .map(move |(i, &from)| (from, starts.get(i + 1).copied().unwrap_or(len)))
}

/// A paragraph (or a capped slice of one) read from a word source.
#[derive(Clone, Debug, Default)]
pub(crate) struct Paragraph {
    pub fragments: Vec<Fragment>,
    pub alignment: Option<TextAlign>,
    /// Stopped at [`PARAGRAPH_WORD_CAP`] before the paragraph ended.
    pub truncated: bool,
    /// Consumed the closing newline.
    pub ended_by_newline: bool,
}

/// Read the next paragraph from the cursor.
///
/// Returns `None` when the source (or the region before `limit`) is
/// exhausted. A word straddling `limit` is cut there.
pub(crate) fn collect_paragraph<S, M>(
    source: &mut S,
    measurer: &M,
    hyphenator: &Hyphenator,
    limit: Option<usize>,
) -> Option<Paragraph>
where
    S: WordSource + ?Sized,
    M: TextMeasurer + ?Sized,
{
    let mut paragraph = Paragraph {
        alignment: source.paragraph_alignment(),
        ..Paragraph::default()
    };
    let mut pending_glue: Option<i32> = None;
    let mut words = 0usize;
    let mut consumed_any = false;

    loop {
        let before = source.current_index();
        if limit.is_some_and(|limit| before >= limit) {
            break;
        }
        let Some(token) = source.next_word() else {
            break;
        };
        consumed_any = true;
        match token.kind {
            BoundaryKind::Newline => {
                paragraph.ended_by_newline = true;
                break;
            }
            BoundaryKind::SpaceRun | BoundaryKind::Tab => {
                if !paragraph.fragments.is_empty() {
                    pending_glue = Some(measurer.space_width(token.style));
                }
            }
            BoundaryKind::Word => {
                if words >= PARAGRAPH_WORD_CAP {
                    source.unget_word();
                    paragraph.truncated = true;
                    break;
                }
                words += 1;
                let end = source.current_index();
                let mut text = token.text;
                if let Some(limit) = limit {
                    if end > limit {
                        cut_at_limit(&mut text, end - limit);
                    }
                }
                let glue = pending_glue.take();
                push_word(
                    &mut paragraph.fragments,
                    WordInput {
                        text,
                        style: token.style,
                        glue,
                        source_start: before,
                    },
                    measurer,
                    hyphenator,
                );
            }
        }
    }

    consumed_any.then_some(paragraph)
}

fn cut_at_limit(text: &mut String, overshoot: usize) {
    let mut keep = text.len().saturating_sub(overshoot);
    while keep > 0 && !text.is_char_boundary(keep) {
        keep -= 1;
    }
    text.truncate(keep);
    if !text.is_empty() && !text.ends_with('-') {
        text.push('-');
    }
}

struct WordInput {
    text: String,
    style: FontStyle,
    glue: Option<i32>,
    source_start: usize,
}

fn push_word<M>(
    fragments: &mut Vec<Fragment>,
    word: WordInput,
    measurer: &M,
    hyphenator: &Hyphenator,
) where
    M: TextMeasurer + ?Sized,
{
    let (glue_before, break_before) = match word.glue {
        Some(glue) if !fragments.is_empty() => (glue, BreakKind::Glue),
        _ => (0, BreakKind::None),
    };

    // (end of piece, start of the next piece, hyphen drawn at the break)
    let mut cuts: smallvec::SmallVec<[(usize, usize, bool); 8]> = smallvec::SmallVec::new();
    if word.text.contains(SOFT_HYPHEN) {
        for (at, _) in word.text.match_indices(SOFT_HYPHEN) {
            cuts.push((at, at + SOFT_HYPHEN.len_utf8(), true));
        }
    } else if hyphenator.language() != Language::None {
        if let Some((core_start, core)) = word_core(&word.text) {
            for point in hyphenator.break_points(core) {
                let at = core_start + point.offset;
                cuts.push((at, at, point.insert_hyphen));
            }
        }
    }

    let mut from = 0usize;
    let mut kind = break_before;
    let mut glue = glue_before;
    for (to, next, insert_hyphen) in cuts
        .iter()
        .copied()
        .chain(core::iter::once((word.text.len(), word.text.len(), false)))
    {
        if to <= from {
            from = from.max(next);
            continue;
        }
        let piece = &word.text[from..to];
        fragments.push(Fragment {
            text: piece.to_string(),
            style: word.style,
            width: measurer.measure_text(piece, word.style).width,
            glue_before: glue,
            break_before: kind,
            source_start: word.source_start,
            word_offset: from,
        });
        from = next;
        glue = 0;
        kind = BreakKind::Hyphen { insert_hyphen };
    }
}

/// Alphabetic core of a word with its byte offset; surrounding
/// punctuation is never hyphenated.
fn word_core(text: &str) -> Option<(usize, &str)> {
    let start = text.find(char::is_alphabetic)?;
    let (last, ch) = text.char_indices().rev().find(|(_, c)| c.is_alphabetic())?;
    Some((start, &text[start..last + ch.len_utf8()]))
}

/// Index to resume reading at so the next word read is `fragment`.
pub(crate) fn resume_index<S>(source: &mut S, fragment: &Fragment) -> usize
where
    S: WordSource + ?Sized,
{
    if fragment.word_offset == 0 {
        return fragment.source_start;
    }
    source.set_position(fragment.source_start);
    source.consume_chars(fragment.word_offset);
    source.current_index()
}
