//! Bidirectional word scanner over normalized text.
//!
//! Reads through a [`SlidingWindow`], so memory stays at the window size
//! however long the text is. Control tokens are consumed as the cursor
//! crosses them; their effect on the inline style depends on the direction
//! of the crossing (see [`StyleState::apply`]).

use std::io;
use std::path::Path;

use crate::store::{ByteStore, FileStore, MemoryStore, SlidingWindow};
use crate::word::{
    BoundaryKind, ControlToken, Direction, FontStyle, StyleState, TextAlign, WordSource,
    WordToken, ESC,
};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

fn is_break(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\t' | ESC)
}

/// Word cursor over normalized text in a [`ByteStore`].
pub struct WordScanner<S> {
    window: SlidingWindow<S>,
    start: usize,
    len: usize,
    index: usize,
    style: StyleState,
    prev_index: usize,
    prev_style: StyleState,
    alignment: Option<Option<TextAlign>>,
}

impl WordScanner<MemoryStore> {
    /// Scanner over an in-memory string.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(MemoryStore::new(text.into()))
    }
}

impl WordScanner<FileStore> {
    /// Scanner over a normalized text file.
    pub fn open_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(FileStore::open(path)?))
    }
}

impl<S: ByteStore> WordScanner<S> {
    /// Scanner with the default window size.
    pub fn new(store: S) -> Self {
        Self::with_window_at(SlidingWindow::new(store))
    }

    /// Scanner with a window of `window` bytes.
    pub fn with_window(store: S, window: usize) -> Self {
        Self::with_window_at(SlidingWindow::with_capacity(store, window))
    }

    fn with_window_at(mut window: SlidingWindow<S>) -> Self {
        let len = window.len();
        let bom = UTF8_BOM
            .iter()
            .enumerate()
            .all(|(i, b)| window.get(i) == Some(*b));
        let start = if bom { UTF8_BOM.len() } else { 0 };
        log::debug!(
            "[SCAN] {} bytes, window {}{}",
            len,
            window.capacity(),
            if bom { ", bom" } else { "" }
        );
        Self {
            window,
            start,
            len,
            index: start,
            style: StyleState::default(),
            prev_index: start,
            prev_style: StyleState::default(),
            alignment: None,
        }
    }

    /// Length of the underlying text in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the text has no content past the BOM.
    pub fn is_empty(&self) -> bool {
        self.len <= self.start
    }

    /// How often the window has been reloaded.
    pub fn window_refills(&self) -> usize {
        self.window.refill_count()
    }

    /// Release the byte store.
    pub fn into_inner(self) -> S {
        self.window.into_inner()
    }

    fn byte(&mut self, pos: usize) -> Option<u8> {
        if pos < self.start || pos >= self.len {
            return None;
        }
        self.window.get(pos)
    }

    /// Control token ending at `pos`, as `(token start, decoded command)`.
    fn token_before(&mut self, pos: usize) -> Option<(usize, Option<ControlToken>)> {
        if pos >= self.start + 2 && self.byte(pos - 2) == Some(ESC) {
            let command = self.byte(pos - 1).and_then(ControlToken::from_command);
            return Some((pos - 2, command));
        }
        if pos > self.start && self.byte(pos - 1) == Some(ESC) {
            return Some((pos - 1, None));
        }
        None
    }

    /// Skip control tokens at `pos` going forward, applying them to `style`.
    fn cross_forward(&mut self, mut pos: usize, style: &mut StyleState) -> usize {
        while self.byte(pos) == Some(ESC) {
            match self.byte(pos + 1) {
                Some(command) => {
                    if let Some(token) = ControlToken::from_command(command) {
                        style.apply(token, Direction::Forward);
                    }
                    pos += 2;
                }
                None => pos += 1,
            }
        }
        pos
    }

    /// Skip control tokens ending at `pos` going backward.
    fn cross_backward(&mut self, mut pos: usize, style: &mut StyleState) -> usize {
        while let Some((token_start, token)) = self.token_before(pos) {
            if let Some(token) = token {
                style.apply(token, Direction::Backward);
            }
            pos = token_start;
        }
        pos
    }

    fn paragraph_start(&mut self, pos: usize) -> usize {
        let mut p = pos.min(self.len);
        while p > self.start && self.byte(p - 1) != Some(b'\n') {
            p -= 1;
        }
        p
    }

    /// Style in effect at `pos`, replayed from the start of its paragraph.
    fn style_at(&mut self, pos: usize) -> StyleState {
        let mut style = StyleState::default();
        let mut p = self.paragraph_start(pos);
        while p < pos {
            if self.byte(p) == Some(ESC) {
                let next = self.cross_forward(p, &mut style);
                if next > pos {
                    break;
                }
                p = next;
            } else {
                p += 1;
            }
        }
        style
    }

    fn remember(&mut self) {
        self.prev_index = self.index;
        self.prev_style = self.style;
    }

    fn scan_forward(&mut self) -> Option<(WordToken, usize, StyleState)> {
        let mut style = self.style;
        let begin = self.cross_forward(self.index, &mut style);
        let first = self.byte(begin)?;
        let token_style = style.style();
        let (kind, end) = match first {
            b'\n' => {
                style.clear();
                (BoundaryKind::Newline, begin + 1)
            }
            b'\t' => (BoundaryKind::Tab, begin + 1),
            b' ' => {
                let mut end = begin + 1;
                while self.byte(end) == Some(b' ') {
                    end += 1;
                }
                (BoundaryKind::SpaceRun, end)
            }
            _ => {
                let mut end = begin + 1;
                while self.byte(end).is_some_and(|b| !is_break(b)) {
                    end += 1;
                }
                (BoundaryKind::Word, end)
            }
        };
        let text = self.text_between(begin, end);
        Some((WordToken::new(text, token_style, kind), end, style))
    }

    fn scan_backward(&mut self) -> Option<(WordToken, usize, StyleState)> {
        let mut style = self.style;
        let end = self.cross_backward(self.index, &mut style);
        if end <= self.start {
            return None;
        }
        let last = self.byte(end - 1)?;
        let (kind, begin) = match last {
            b'\n' => (BoundaryKind::Newline, end - 1),
            b'\t' => (BoundaryKind::Tab, end - 1),
            b' ' => {
                let mut begin = end - 1;
                while begin > self.start && self.byte(begin - 1) == Some(b' ') {
                    begin -= 1;
                }
                (BoundaryKind::SpaceRun, begin)
            }
            _ => {
                let mut begin = end - 1;
                while begin > self.start
                    && self.byte(begin - 1).is_some_and(|b| !is_break(b))
                    && self.token_before(begin).is_none()
                {
                    begin -= 1;
                }
                (BoundaryKind::Word, begin)
            }
        };
        if kind == BoundaryKind::Newline {
            style = self.style_at(begin);
        }
        let text = self.text_between(begin, end);
        Some((WordToken::new(text, style.style(), kind), begin, style))
    }

    fn text_between(&mut self, begin: usize, end: usize) -> String {
        let mut bytes = vec![0u8; end - begin];
        let copied = self.window.copy_range(begin, &mut bytes);
        bytes.truncate(copied);
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}

impl<S: ByteStore> WordSource for WordScanner<S> {
    fn has_next_word(&mut self) -> bool {
        let mut style = self.style;
        let pos = self.cross_forward(self.index, &mut style);
        pos < self.len
    }

    fn has_prev_word(&mut self) -> bool {
        let mut style = self.style;
        let pos = self.cross_backward(self.index, &mut style);
        pos > self.start
    }

    fn next_word(&mut self) -> Option<WordToken> {
        let (token, end, style) = self.scan_forward()?;
        self.remember();
        if token.is_newline() {
            self.alignment = None;
        }
        self.index = end;
        self.style = style;
        Some(token)
    }

    fn prev_word(&mut self) -> Option<WordToken> {
        let (token, begin, style) = self.scan_backward()?;
        self.remember();
        if token.is_newline() {
            self.alignment = None;
        }
        self.index = begin;
        self.style = style;
        Some(token)
    }

    fn unget_word(&mut self) {
        self.index = self.prev_index;
        self.style = self.prev_style;
        self.alignment = None;
    }

    fn peek_char(&mut self, offset: isize) -> Option<u8> {
        let pos = self.index.checked_add_signed(offset)?;
        self.byte(pos)
    }

    fn consume_chars(&mut self, n: usize) -> usize {
        let mut consumed = 0;
        while consumed < n {
            let mut style = self.style;
            self.index = self.cross_forward(self.index, &mut style);
            self.style = style;
            match self.byte(self.index) {
                Some(b) => {
                    if b == b'\n' {
                        self.style.clear();
                        self.alignment = None;
                    }
                    self.index += 1;
                    consumed += 1;
                }
                None => break,
            }
        }
        consumed
    }

    fn is_inside_word(&mut self) -> bool {
        if self.index <= self.start || self.index >= self.len {
            return false;
        }
        let before = self.byte(self.index - 1);
        let after = self.byte(self.index);
        before.is_some_and(|b| !is_break(b))
            && after.is_some_and(|b| !is_break(b))
            && self.token_before(self.index).is_none()
    }

    fn current_index(&self) -> usize {
        self.index
    }

    fn set_position(&mut self, index: usize) {
        let mut target = index.clamp(self.start, self.len);
        if target > self.start && self.byte(target - 1) == Some(ESC) {
            target -= 1;
        }
        self.index = target;
        self.style = self.style_at(target);
        self.prev_index = target;
        self.prev_style = self.style;
        self.alignment = None;
    }

    fn percentage(&mut self) -> f32 {
        self.percentage_at(self.index)
    }

    fn percentage_at(&mut self, index: usize) -> f32 {
        let span = self.len.saturating_sub(self.start);
        if span == 0 {
            return 1.0;
        }
        let at = index.clamp(self.start, self.len) - self.start;
        at as f32 / span as f32
    }

    fn reset(&mut self) {
        self.index = self.start;
        self.style.clear();
        self.prev_index = self.start;
        self.prev_style = self.style;
        self.alignment = None;
    }

    fn paragraph_alignment(&mut self) -> Option<TextAlign> {
        if let Some(cached) = self.alignment {
            return cached;
        }
        let mut pos = self.paragraph_start(self.index);
        let mut found = None;
        while self.byte(pos) == Some(ESC) {
            if let Some(ControlToken::Align(align)) =
                self.byte(pos + 1).and_then(ControlToken::from_command)
            {
                found = Some(align);
                break;
            }
            pos += 2;
        }
        self.alignment = Some(found);
        found
    }

    fn current_style(&self) -> FontStyle {
        self.style.style()
    }

    fn has_style_support(&self) -> bool {
        true
    }
}
