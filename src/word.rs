//! Word tokens, control tokens and the word-source contract.
//!
//! Normalized text is plain UTF-8 with two-byte control tokens: [`ESC`]
//! followed by one command byte. Alignment commands mark a paragraph,
//! style commands open and close inline emphasis.

/// Control token lead byte.
pub const ESC: u8 = 0x1B;

/// Inline font style of a word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FontStyle {
    /// Upright, normal weight.
    #[default]
    Regular,
    /// Bold.
    Bold,
    /// Italic.
    Italic,
    /// Bold and italic.
    BoldItalic,
}

impl FontStyle {
    /// Build from independent bold/italic flags.
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => Self::Regular,
            (true, false) => Self::Bold,
            (false, true) => Self::Italic,
            (true, true) => Self::BoldItalic,
        }
    }

    /// Whether the style is bold.
    pub fn is_bold(self) -> bool {
        matches!(self, Self::Bold | Self::BoldItalic)
    }

    /// Whether the style is italic.
    pub fn is_italic(self) -> bool {
        matches!(self, Self::Italic | Self::BoldItalic)
    }
}

/// Paragraph alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextAlign {
    /// Flush left.
    #[default]
    Left,
    /// Flush right.
    Right,
    /// Centered.
    Center,
    /// Justified; the last line of a paragraph stays flush left.
    Justify,
}

/// What kind of run a [`WordToken`] covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// Maximal run of non-whitespace bytes.
    Word,
    /// Maximal run of spaces.
    SpaceRun,
    /// A single `\n`; ends a paragraph.
    Newline,
    /// A single `\t`.
    Tab,
}

/// One token of normalized text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordToken {
    /// UTF-8 text of the run.
    pub text: String,
    /// Inline style in effect at the start of the run.
    pub style: FontStyle,
    /// Token class.
    pub kind: BoundaryKind,
}

impl WordToken {
    /// Shorthand constructor.
    pub fn new(text: impl Into<String>, style: FontStyle, kind: BoundaryKind) -> Self {
        Self {
            text: text.into(),
            style,
            kind,
        }
    }

    /// True for a visible word.
    pub fn is_word(&self) -> bool {
        self.kind == BoundaryKind::Word
    }

    /// True for a space run or tab.
    pub fn is_space(&self) -> bool {
        matches!(self.kind, BoundaryKind::SpaceRun | BoundaryKind::Tab)
    }

    /// True for a paragraph break.
    pub fn is_newline(&self) -> bool {
        self.kind == BoundaryKind::Newline
    }
}

/// Which emphasis a style command toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Emphasis {
    /// Bold only.
    Bold,
    /// Italic only.
    Italic,
    /// Bold and italic together.
    Both,
}

/// Decoded command byte of a control token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlToken {
    /// Paragraph alignment marker.
    Align(TextAlign),
    /// Start of emphasis.
    Enter(Emphasis),
    /// End of emphasis.
    Exit(Emphasis),
}

impl ControlToken {
    /// Decode a command byte.
    pub fn from_command(byte: u8) -> Option<Self> {
        let token = match byte {
            b'L' => Self::Align(TextAlign::Left),
            b'R' => Self::Align(TextAlign::Right),
            b'C' => Self::Align(TextAlign::Center),
            b'J' => Self::Align(TextAlign::Justify),
            b'B' => Self::Enter(Emphasis::Bold),
            b'b' => Self::Exit(Emphasis::Bold),
            b'I' => Self::Enter(Emphasis::Italic),
            b'i' => Self::Exit(Emphasis::Italic),
            b'X' => Self::Enter(Emphasis::Both),
            b'x' => Self::Exit(Emphasis::Both),
            _ => return None,
        };
        Some(token)
    }

    /// Command byte for this token.
    pub fn command(self) -> u8 {
        match self {
            Self::Align(TextAlign::Left) => b'L',
            Self::Align(TextAlign::Right) => b'R',
            Self::Align(TextAlign::Center) => b'C',
            Self::Align(TextAlign::Justify) => b'J',
            Self::Enter(Emphasis::Bold) => b'B',
            Self::Exit(Emphasis::Bold) => b'b',
            Self::Enter(Emphasis::Italic) => b'I',
            Self::Exit(Emphasis::Italic) => b'i',
            Self::Enter(Emphasis::Both) => b'X',
            Self::Exit(Emphasis::Both) => b'x',
        }
    }

    /// The two encoded bytes.
    pub fn encode(self) -> [u8; 2] {
        [ESC, self.command()]
    }
}

/// Scan direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Increasing offsets.
    Forward,
    /// Decreasing offsets.
    Backward,
}

/// Inline style flags driven by control tokens.
///
/// Crossing a token backward undoes it: an enter seen while moving left
/// closes the emphasis, an exit reopens it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StyleState {
    bold: bool,
    italic: bool,
}

impl StyleState {
    /// Apply `token` crossed in `direction`. Alignment tokens are ignored.
    pub fn apply(&mut self, token: ControlToken, direction: Direction) {
        let (emphasis, on) = match (token, direction) {
            (ControlToken::Align(_), _) => return,
            (ControlToken::Enter(e), Direction::Forward) => (e, true),
            (ControlToken::Exit(e), Direction::Forward) => (e, false),
            (ControlToken::Enter(e), Direction::Backward) => (e, false),
            (ControlToken::Exit(e), Direction::Backward) => (e, true),
        };
        match emphasis {
            Emphasis::Bold => self.bold = on,
            Emphasis::Italic => self.italic = on,
            Emphasis::Both => {
                self.bold = on;
                self.italic = on;
            }
        }
    }

    /// Current style.
    pub fn style(self) -> FontStyle {
        FontStyle::from_flags(self.bold, self.italic)
    }

    /// Back to regular.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A bidirectional word cursor, the input of every layout strategy.
///
/// Indices are byte offsets into the source's own text coordinate space;
/// only values previously returned by [`WordSource::current_index`] (or
/// `0`) are meaningful to [`WordSource::set_position`].
pub trait WordSource {
    /// Whether [`WordSource::next_word`] would return a token.
    fn has_next_word(&mut self) -> bool;
    /// Whether [`WordSource::prev_word`] would return a token.
    fn has_prev_word(&mut self) -> bool;
    /// Read the token at the cursor and advance past it.
    fn next_word(&mut self) -> Option<WordToken>;
    /// Read the token before the cursor and move to its start.
    fn prev_word(&mut self) -> Option<WordToken>;
    /// Undo the last `next_word`/`prev_word`. Single level.
    fn unget_word(&mut self);
    /// Byte at `offset` from the cursor, control tokens included.
    fn peek_char(&mut self, offset: isize) -> Option<u8>;
    /// Advance over `n` text bytes, applying control tokens on the way.
    /// Returns the number of bytes consumed.
    fn consume_chars(&mut self, n: usize) -> usize;
    /// Whether the cursor sits between two bytes of the same word.
    fn is_inside_word(&mut self) -> bool;
    /// Cursor offset.
    fn current_index(&self) -> usize;
    /// Move the cursor, re-deriving the inline style at the target.
    fn set_position(&mut self, index: usize);
    /// Progress of the cursor in `[0, 1]`.
    fn percentage(&mut self) -> f32;
    /// Progress of `index` in `[0, 1]`.
    fn percentage_at(&mut self, index: usize) -> f32;
    /// Back to the first token.
    fn reset(&mut self);

    /// Alignment marker of the paragraph under the cursor.
    fn paragraph_alignment(&mut self) -> Option<TextAlign> {
        None
    }

    /// Number of chapters; plain sources have one.
    fn chapter_count(&self) -> usize {
        1
    }

    /// Index of the open chapter.
    fn current_chapter(&self) -> usize {
        0
    }

    /// Switch to chapter `index`, cursor at its start.
    fn set_chapter(&mut self, index: usize) -> bool {
        index == 0
    }

    /// Inline style in effect at the cursor.
    fn current_style(&self) -> FontStyle {
        FontStyle::Regular
    }

    /// Whether tokens carry styles other than regular.
    fn has_style_support(&self) -> bool {
        false
    }
}
