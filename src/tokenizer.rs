//! Bidirectional, resumable markup tokenizer.
//!
//! Yields start tags, end tags and character-data runs from a byte source
//! without building a tree. Over a random-access store it can move in both
//! directions and restore any captured [`Position`]; over a forward-only
//! [`ChunkSource`] it supports a single forward pass.
//!
//! Backward lexing re-derives node boundaries by scanning left for the
//! matching opening delimiter and then lexing that node forward, so both
//! directions agree on attributes and bounds.
//!
//! Comments, processing instructions, DOCTYPE and CDATA sections are
//! skipped in both directions. The tokenizer is permissive: a `<` that does
//! not open a well-formed tag is character data.

use std::path::Path;

use smallvec::SmallVec;

use crate::error::EpubError;
use crate::store::{
    ByteAccess, ByteStore, ChunkSource, ChunkWindow, FileStore, SlidingWindow,
    DEFAULT_WINDOW_SIZE,
};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Kind of node under the cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Before the first read, or a bare offset.
    #[default]
    None,
    /// Start tag (possibly self-closing).
    Element,
    /// End tag.
    EndElement,
    /// Character data run.
    Text,
    /// Past the last node.
    EndOfFile,
}

/// One `name="value"` pair of a start tag; values are kept undecoded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Attribute {
    /// Attribute name, case preserved.
    pub name: String,
    /// Raw attribute value.
    pub value: String,
}

/// Snapshot of the tokenizer cursor.
///
/// Restoring a snapshot with [`MarkupTokenizer::set_position`] on the same
/// document resumes traversal exactly as if the cursor had arrived there
/// by reading.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Position {
    /// Node kind.
    pub node_type: NodeType,
    /// Tag name for elements; empty otherwise.
    pub name: String,
    /// Self-closing start tag.
    pub is_empty: bool,
    /// First content byte of a text node.
    pub text_start: usize,
    /// One past the last content byte of a text node.
    pub text_end: usize,
    /// Character cursor inside a text node.
    pub text_current: usize,
    /// Byte offset of the node start.
    pub file_pos: usize,
    /// Attributes in document order.
    pub attributes: SmallVec<[Attribute; 4]>,
}

impl Position {
    /// A bare offset; restoring it selects the node containing `offset`.
    pub fn at_offset(offset: usize) -> Self {
        Self {
            file_pos: offset,
            text_start: offset,
            text_end: offset,
            text_current: offset,
            ..Self::default()
        }
    }
}

enum Lexed {
    Element {
        name: String,
        attributes: SmallVec<[Attribute; 4]>,
        is_empty: bool,
        end: usize,
    },
    EndElement {
        name: String,
        end: usize,
    },
    Text {
        end: usize,
    },
    Skip {
        end: usize,
    },
}

impl Lexed {
    fn end(&self) -> usize {
        match self {
            Self::Element { end, .. }
            | Self::EndElement { end, .. }
            | Self::Text { end }
            | Self::Skip { end } => *end,
        }
    }
}

enum TagScan {
    Done(Lexed),
    NotMarkup,
}

/// Markup tokenizer over a byte source.
pub struct MarkupTokenizer<A> {
    bytes: A,
    node: Position,
    node_end: usize,
    data_start: usize,
}

impl<S: ByteStore> MarkupTokenizer<SlidingWindow<S>> {
    /// Tokenize a random-access store through a default-size window.
    pub fn open(store: S) -> Result<Self, EpubError> {
        Self::open_with_window(store, DEFAULT_WINDOW_SIZE)
    }

    /// Tokenize a random-access store through a window of `window` bytes.
    pub fn open_with_window(store: S, window: usize) -> Result<Self, EpubError> {
        let mut bytes = SlidingWindow::with_capacity(store, window);
        if !bytes.is_empty() && bytes.get(0).is_none() {
            return Err(EpubError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "markup source unreadable",
            )));
        }
        Ok(Self::with_access(bytes))
    }
}

impl MarkupTokenizer<SlidingWindow<FileStore>> {
    /// Tokenize a file on disk.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, EpubError> {
        Self::open(FileStore::open(path)?)
    }
}

impl<C: ChunkSource> MarkupTokenizer<ChunkWindow<C>> {
    /// Forward-only tokenizer pulling `chunk_size` bytes at a time.
    pub fn from_stream(source: C, chunk_size: usize) -> Self {
        Self::with_access(ChunkWindow::new(source, chunk_size))
    }
}

impl<A: ByteAccess> MarkupTokenizer<A> {
    /// Tokenizer over any [`ByteAccess`].
    pub fn with_access(mut bytes: A) -> Self {
        let bom = UTF8_BOM
            .iter()
            .enumerate()
            .all(|(i, b)| bytes.byte_at(i) == Some(*b));
        let data_start = if bom { UTF8_BOM.len() } else { 0 };
        Self {
            bytes,
            node: Position::at_offset(data_start),
            node_end: data_start,
            data_start,
        }
    }

    /// Release the byte source.
    pub fn into_inner(self) -> A {
        self.bytes
    }

    /// Whether backward reads and [`Self::set_position`] are available.
    pub fn is_seekable(&self) -> bool {
        self.bytes.is_seekable()
    }

    /// Current node kind.
    pub fn node_type(&self) -> NodeType {
        self.node.node_type
    }

    /// Current tag name (empty for text and end of file).
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Whether the current start tag is self-closing.
    pub fn is_empty_element(&self) -> bool {
        self.node.is_empty
    }

    /// Attributes of the current start tag.
    pub fn attributes(&self) -> &[Attribute] {
        &self.node.attributes
    }

    /// Raw value of attribute `name` (ASCII case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.node
            .attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Byte offset of the current node start.
    pub fn file_pos(&self) -> usize {
        self.node.file_pos
    }

    /// Snapshot of the cursor.
    pub fn position(&self) -> Position {
        self.node.clone()
    }

    /// Advance to the next node. Returns `false` at end of input.
    pub fn read(&mut self) -> bool {
        let start = match self.node.node_type {
            NodeType::EndOfFile => return false,
            NodeType::None => self.node.file_pos.max(self.data_start),
            _ => self.node_end,
        };
        let mut start = start;
        loop {
            self.bytes.retain_from(start);
            if self.bytes.byte_at(start).is_none() {
                self.set_end_of_file(start);
                return false;
            }
            match self.lex_at(start) {
                Lexed::Skip { end } => start = end,
                lexed => {
                    self.install(start, lexed);
                    return true;
                }
            }
        }
    }

    /// Move to the node before the current one. Returns `false` at the
    /// start of input or on a forward-only source; the cursor is then left
    /// unchanged.
    pub fn read_backward(&mut self) -> bool {
        if !self.bytes.is_seekable() {
            return false;
        }
        let mut end = match self.node.node_type {
            NodeType::EndOfFile => self.len(),
            _ => self.node.file_pos.min(self.len()),
        };
        loop {
            if end <= self.data_start {
                return false;
            }
            let (start, lexed) = self.lex_ending_at(end);
            match lexed {
                Lexed::Skip { .. } => end = start,
                lexed => {
                    self.install(start, lexed);
                    return true;
                }
            }
        }
    }

    /// Restore a snapshot.
    ///
    /// Concrete node snapshots are re-lexed at their recorded start; a bare
    /// offset ([`NodeType::None`]) selects the node containing it, with the
    /// text cursor placed at the offset. Returns `false` for offsets past
    /// the end or on a forward-only source.
    pub fn set_position(&mut self, position: &Position) -> bool {
        if !self.bytes.is_seekable() {
            return false;
        }
        let len = self.len();
        match position.node_type {
            NodeType::EndOfFile => {
                if position.file_pos > len {
                    return false;
                }
                self.set_end_of_file(len);
                true
            }
            NodeType::None => self.resolve_offset(position.file_pos),
            node_type => {
                let anchor = if node_type == NodeType::Text {
                    position.text_start
                } else {
                    position.file_pos
                };
                if anchor > len {
                    return false;
                }
                if anchor >= self.data_start && anchor < len {
                    let lexed = self.lex_at(anchor);
                    if Self::matches(&lexed, anchor, position) {
                        self.install(anchor, lexed);
                        if node_type == NodeType::Text {
                            self.node.text_current = position
                                .text_current
                                .clamp(self.node.text_start, self.node.text_end);
                        }
                        return true;
                    }
                }
                log::debug!(
                    "[XML] snapshot at {} does not match the document; resolving by offset",
                    anchor
                );
                let offset = if node_type == NodeType::Text {
                    position.text_current
                } else {
                    position.file_pos
                };
                self.resolve_offset(offset)
            }
        }
    }

    /// Whether the text cursor has bytes ahead of it.
    pub fn has_more_text_chars(&self) -> bool {
        self.node.node_type == NodeType::Text && self.node.text_current < self.node.text_end
    }

    /// Byte under the text cursor without advancing.
    pub fn peek_text_node_char(&mut self) -> Option<u8> {
        if !self.has_more_text_chars() {
            return None;
        }
        self.bytes.byte_at(self.node.text_current)
    }

    /// Byte under the text cursor, advancing past it.
    pub fn read_text_node_char_forward(&mut self) -> Option<u8> {
        let byte = self.peek_text_node_char()?;
        self.node.text_current += 1;
        Some(byte)
    }

    /// Whether the text cursor has bytes behind it.
    pub fn has_more_text_chars_backward(&self) -> bool {
        self.node.node_type == NodeType::Text && self.node.text_current > self.node.text_start
    }

    /// Byte just before the text cursor without moving.
    pub fn peek_prev_text_node_char(&mut self) -> Option<u8> {
        if !self.has_more_text_chars_backward() {
            return None;
        }
        self.bytes.byte_at(self.node.text_current - 1)
    }

    /// Byte just before the text cursor, moving the cursor onto it.
    pub fn read_prev_text_node_char(&mut self) -> Option<u8> {
        let byte = self.peek_prev_text_node_char()?;
        self.node.text_current -= 1;
        Some(byte)
    }

    fn len(&self) -> usize {
        self.bytes.total_len().unwrap_or(usize::MAX)
    }

    fn set_end_of_file(&mut self, at: usize) {
        let end = self.bytes.total_len().unwrap_or(at);
        self.node = Position {
            node_type: NodeType::EndOfFile,
            ..Position::at_offset(end)
        };
        self.node_end = end;
    }

    fn install(&mut self, start: usize, lexed: Lexed) {
        let end = lexed.end();
        let mut node = Position::at_offset(start);
        match lexed {
            Lexed::Element {
                name,
                attributes,
                is_empty,
                ..
            } => {
                node.node_type = NodeType::Element;
                node.name = name;
                node.attributes = attributes;
                node.is_empty = is_empty;
            }
            Lexed::EndElement { name, .. } => {
                node.node_type = NodeType::EndElement;
                node.name = name;
            }
            Lexed::Text { .. } => {
                node.node_type = NodeType::Text;
                node.text_end = end;
            }
            Lexed::Skip { .. } => {
                node.file_pos = end;
                node.text_start = end;
                node.text_end = end;
                node.text_current = end;
            }
        }
        self.node = node;
        self.node_end = end;
    }

    fn matches(lexed: &Lexed, anchor: usize, position: &Position) -> bool {
        match (lexed, position.node_type) {
            (Lexed::Element { name, is_empty, .. }, NodeType::Element) => {
                *name == position.name && *is_empty == position.is_empty
            }
            (Lexed::EndElement { name, .. }, NodeType::EndElement) => *name == position.name,
            (Lexed::Text { end }, NodeType::Text) => {
                anchor == position.text_start && *end == position.text_end
            }
            _ => false,
        }
    }

    /// Select the node containing `offset` as the current node.
    fn resolve_offset(&mut self, offset: usize) -> bool {
        let len = self.len();
        if offset > len {
            return false;
        }
        if offset == len {
            self.set_end_of_file(len);
            return true;
        }
        let offset = offset.max(self.data_start);
        let mut start = self.containing_start(offset);
        loop {
            let lexed = self.lex_at(start);
            let end = lexed.end();
            if end > offset || end >= len {
                let is_text = matches!(lexed, Lexed::Text { .. });
                self.install(start, lexed);
                if is_text {
                    self.node.text_current = offset.clamp(self.node.text_start, self.node.text_end);
                }
                return true;
            }
            start = end;
        }
    }

    fn containing_start(&mut self, offset: usize) -> usize {
        if self.bytes.byte_at(offset) == Some(b'<') {
            return offset;
        }
        let mut pos = offset;
        while pos > self.data_start {
            pos -= 1;
            match self.bytes.byte_at(pos) {
                Some(b'<') => return pos,
                Some(b'>') => return pos + 1,
                Some(_) => {}
                None => break,
            }
        }
        self.data_start
    }

    /// Lex the unit that ends exactly at `end`, returning its start.
    fn lex_ending_at(&mut self, end: usize) -> (usize, Lexed) {
        if self.bytes.byte_at(end - 1) == Some(b'>') {
            let opener: &[u8] = if self.ends_with(end, b"-->") {
                b"<!--"
            } else if self.ends_with(end, b"]]>") {
                b"<![CDATA["
            } else if self.ends_with(end, b"?>") {
                b"<?"
            } else {
                b"<"
            };
            if opener != b"<" {
                if let Some(q) = self.scan_left_for(end, opener) {
                    let lexed = self.lex_at(q);
                    if lexed.end() == end {
                        return (q, lexed);
                    }
                }
            }
        }

        let Some(q) = self.scan_left_for(end, b"<") else {
            return (self.data_start, Lexed::Text { end });
        };
        let lexed = self.lex_at(q);
        let unit_end = lexed.end();
        match lexed {
            Lexed::Text { .. } => (q, Lexed::Text { end }),
            _ if unit_end == end => (q, lexed),
            _ if unit_end < end => (unit_end, Lexed::Text { end }),
            _ => (q, Lexed::Text { end }),
        }
    }

    fn ends_with(&mut self, end: usize, suffix: &[u8]) -> bool {
        if end < self.data_start + suffix.len() {
            return false;
        }
        let start = end - suffix.len();
        suffix
            .iter()
            .enumerate()
            .all(|(i, b)| self.bytes.byte_at(start + i) == Some(*b))
    }

    /// Scan left from `end` for the last occurrence of `delimiter` lying
    /// entirely before `end`; returns its start offset.
    fn scan_left_for(&mut self, end: usize, delimiter: &[u8]) -> Option<usize> {
        let first = *delimiter.first()?;
        let mut pos = end.checked_sub(delimiter.len())?;
        loop {
            if pos < self.data_start {
                return None;
            }
            if self.bytes.byte_at(pos) == Some(first)
                && delimiter[1..]
                    .iter()
                    .enumerate()
                    .all(|(i, b)| self.bytes.byte_at(pos + 1 + i) == Some(*b))
            {
                return Some(pos);
            }
            pos = pos.checked_sub(1)?;
        }
    }

    fn find_forward(&mut self, from: usize, delimiter: &[u8]) -> Option<usize> {
        let first = *delimiter.first()?;
        let mut pos = from;
        loop {
            let byte = self.bytes.byte_at(pos)?;
            if byte == first
                && delimiter[1..]
                    .iter()
                    .enumerate()
                    .all(|(i, b)| self.bytes.byte_at(pos + 1 + i) == Some(*b))
            {
                return Some(pos);
            }
            pos += 1;
        }
    }

    /// End of the character-data run starting at `from`.
    fn text_end_from(&mut self, from: usize) -> usize {
        let mut pos = from;
        while let Some(byte) = self.bytes.byte_at(pos) {
            if byte == b'<' {
                break;
            }
            pos += 1;
        }
        pos
    }

    /// Lex the unit starting at `start` going forward.
    fn lex_at(&mut self, start: usize) -> Lexed {
        if self.bytes.byte_at(start) != Some(b'<') {
            return Lexed::Text {
                end: self.text_end_from(start),
            };
        }
        match self.lex_markup(start) {
            TagScan::Done(lexed) => lexed,
            TagScan::NotMarkup => Lexed::Text {
                end: self.text_end_from(start + 1),
            },
        }
    }

    fn lex_markup(&mut self, start: usize) -> TagScan {
        let skip_to = |found: Option<usize>, closer: usize| match found {
            Some(at) => TagScan::Done(Lexed::Skip { end: at + closer }),
            None => TagScan::NotMarkup,
        };
        match self.bytes.byte_at(start + 1) {
            Some(b'!') => {
                if self.starts_with(start, b"<!--") {
                    let found = self.find_forward(start + 4, b"-->");
                    skip_to(found, 3)
                } else if self.starts_with(start, b"<![CDATA[") {
                    let found = self.find_forward(start + 9, b"]]>");
                    skip_to(found, 3)
                } else {
                    let found = self.find_forward(start + 2, b">");
                    skip_to(found, 1)
                }
            }
            Some(b'?') => {
                let found = self.find_forward(start + 2, b"?>");
                skip_to(found, 2)
            }
            Some(b'/') => {
                let (name, after) = self.lex_name(start + 2);
                if name.is_empty() {
                    return TagScan::NotMarkup;
                }
                match self.find_forward(after, b">") {
                    Some(close) => TagScan::Done(Lexed::EndElement {
                        name,
                        end: close + 1,
                    }),
                    None => TagScan::NotMarkup,
                }
            }
            Some(_) => self.lex_start_tag(start),
            None => TagScan::NotMarkup,
        }
    }

    fn lex_start_tag(&mut self, start: usize) -> TagScan {
        let (name, mut pos) = self.lex_name(start + 1);
        if name.is_empty() {
            return TagScan::NotMarkup;
        }
        let mut attributes = SmallVec::new();
        loop {
            pos = self.skip_whitespace(pos);
            match self.bytes.byte_at(pos) {
                None => return TagScan::NotMarkup,
                Some(b'>') => {
                    return TagScan::Done(Lexed::Element {
                        name,
                        attributes,
                        is_empty: false,
                        end: pos + 1,
                    })
                }
                Some(b'/') if self.bytes.byte_at(pos + 1) == Some(b'>') => {
                    return TagScan::Done(Lexed::Element {
                        name,
                        attributes,
                        is_empty: true,
                        end: pos + 2,
                    })
                }
                Some(b'/') => pos += 1,
                Some(_) => {
                    let (attr_name, after_name) = self.lex_name(pos);
                    if attr_name.is_empty() {
                        // Stray byte such as a lone quote or '='.
                        pos += 1;
                        continue;
                    }
                    pos = self.skip_whitespace(after_name);
                    let mut value = String::new();
                    if self.bytes.byte_at(pos) == Some(b'=') {
                        pos = self.skip_whitespace(pos + 1);
                        match self.lex_value(pos) {
                            Some((raw, after)) => {
                                value = raw;
                                pos = after;
                            }
                            None => return TagScan::NotMarkup,
                        }
                    }
                    attributes.push(Attribute {
                        name: attr_name,
                        value,
                    });
                }
            }
        }
    }

    fn lex_value(&mut self, pos: usize) -> Option<(String, usize)> {
        let mut raw = Vec::new();
        match self.bytes.byte_at(pos)? {
            quote @ (b'"' | b'\'') => {
                let mut cur = pos + 1;
                loop {
                    let byte = self.bytes.byte_at(cur)?;
                    if byte == quote {
                        return Some((String::from_utf8_lossy(&raw).into_owned(), cur + 1));
                    }
                    raw.push(byte);
                    cur += 1;
                }
            }
            _ => {
                let mut cur = pos;
                while let Some(byte) = self.bytes.byte_at(cur) {
                    if byte.is_ascii_whitespace() || byte == b'>' {
                        break;
                    }
                    if byte == b'/' && self.bytes.byte_at(cur + 1) == Some(b'>') {
                        break;
                    }
                    raw.push(byte);
                    cur += 1;
                }
                Some((String::from_utf8_lossy(&raw).into_owned(), cur))
            }
        }
    }

    fn lex_name(&mut self, from: usize) -> (String, usize) {
        let mut raw = Vec::new();
        let mut pos = from;
        while let Some(byte) = self.bytes.byte_at(pos) {
            let stop = byte.is_ascii_whitespace()
                || matches!(byte, b'>' | b'/' | b'=' | b'<' | b'"' | b'\'');
            if stop {
                break;
            }
            raw.push(byte);
            pos += 1;
        }
        (String::from_utf8_lossy(&raw).into_owned(), pos)
    }

    fn skip_whitespace(&mut self, mut pos: usize) -> usize {
        while self
            .bytes
            .byte_at(pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            pos += 1;
        }
        pos
    }

    fn starts_with(&mut self, start: usize, prefix: &[u8]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(i, b)| self.bytes.byte_at(start + i) == Some(*b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkFn, MemoryStore};

    const DOC: &str = concat!(
        "<?xml version=\"1.0\"?>\n",
        "<!DOCTYPE html>\n",
        "<html><head><title>T</title></head>",
        "<body class=\"main\"><!-- note <b> -->",
        "<p id='p1' data-x=\"a>b\">Hello <em>world</em>.</p>",
        "<br/><p>x > y</p>tail</body></html>"
    );

    type Sig = (NodeType, String, bool, Vec<Attribute>, String);

    fn tokenizer(doc: &str) -> MarkupTokenizer<SlidingWindow<MemoryStore>> {
        MarkupTokenizer::open_with_window(MemoryStore::from(doc), 64).expect("open")
    }

    fn signature<A: ByteAccess>(tok: &mut MarkupTokenizer<A>) -> Sig {
        let pos = tok.position();
        let mut text = Vec::new();
        if pos.node_type == NodeType::Text {
            for offset in pos.text_start..pos.text_end {
                text.push(tok.bytes.byte_at(offset).expect("text byte"));
            }
        }
        (
            pos.node_type,
            pos.name,
            pos.is_empty,
            pos.attributes.to_vec(),
            String::from_utf8(text).expect("utf8"),
        )
    }

    fn forward_all(doc: &str) -> Vec<(Position, Sig)> {
        let mut tok = tokenizer(doc);
        let mut out = Vec::new();
        while tok.read() {
            out.push((tok.position(), signature(&mut tok)));
        }
        out
    }

    #[test]
    fn forward_lexes_tags_text_and_skips_declarations() {
        let nodes = forward_all(DOC);
        let names: Vec<_> = nodes
            .iter()
            .map(|(_, (kind, name, empty, _, text))| match kind {
                NodeType::Element if *empty => format!("<{}/>", name),
                NodeType::Element => format!("<{}>", name),
                NodeType::EndElement => format!("</{}>", name),
                _ => format!("'{}'", text),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "'\n'", "'\n'", "<html>", "<head>", "<title>", "'T'", "</title>", "</head>",
                "<body>", "<p>", "'Hello '", "<em>", "'world'", "</em>", "'.'", "</p>",
                "<br/>", "<p>", "'x > y'", "</p>", "'tail'", "</body>", "</html>"
            ]
        );

        let (_, (_, _, _, attrs, _)) = &nodes[9];
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name, "id");
        assert_eq!(attrs[0].value, "p1");
        assert_eq!(attrs[1].value, "a>b");
    }

    #[test]
    fn backward_visits_the_same_boundaries_in_reverse() {
        let forward: Vec<Sig> = forward_all(DOC).into_iter().map(|(_, s)| s).collect();

        let mut tok = tokenizer(DOC);
        while tok.read() {}
        assert_eq!(tok.node_type(), NodeType::EndOfFile);
        let mut backward = Vec::new();
        while tok.read_backward() {
            backward.push(signature(&mut tok));
        }
        backward.reverse();
        assert_eq!(backward, forward);
    }

    #[test]
    fn every_captured_position_resumes_identically() {
        let nodes = forward_all(DOC);
        for (i, (position, sig)) in nodes.iter().enumerate() {
            let mut tok = tokenizer(DOC);
            assert!(tok.set_position(position), "restore node {}", i);
            assert_eq!(&signature(&mut tok), sig);
            assert_eq!(tok.position(), *position);

            let mut rest = Vec::new();
            while tok.read() {
                rest.push(signature(&mut tok));
            }
            let expected: Vec<Sig> = nodes[i + 1..].iter().map(|(_, s)| s.clone()).collect();
            assert_eq!(rest, expected, "forward resume from node {}", i);

            assert!(tok.set_position(position));
            let mut before = Vec::new();
            while tok.read_backward() {
                before.push(signature(&mut tok));
            }
            before.reverse();
            let expected: Vec<Sig> = nodes[..i].iter().map(|(_, s)| s.clone()).collect();
            assert_eq!(before, expected, "backward resume from node {}", i);
        }
    }

    #[test]
    fn mid_text_resume_yields_suffix_and_prefix() {
        let doc = "<p>The quick brown fox</p>";
        let mut tok = tokenizer(doc);
        assert!(tok.read());
        assert!(tok.read());
        let base = tok.position();
        let content = "The quick brown fox";
        for k in 0..=content.len() {
            let mut snapshot = base.clone();
            snapshot.text_current = base.text_start + k;

            let mut tok = tokenizer(doc);
            assert!(tok.set_position(&snapshot));
            let mut suffix = Vec::new();
            while let Some(b) = tok.read_text_node_char_forward() {
                suffix.push(b);
            }
            assert_eq!(suffix, content.as_bytes()[k..].to_vec());

            assert!(tok.set_position(&snapshot));
            let mut prefix = Vec::new();
            while let Some(b) = tok.read_prev_text_node_char() {
                prefix.push(b);
            }
            prefix.reverse();
            assert_eq!(prefix, content.as_bytes()[..k].to_vec());
        }
    }

    #[test]
    fn bare_offset_selects_containing_node() {
        let doc = "<p>abc</p><p>def</p>";
        let mut tok = tokenizer(doc);
        assert!(tok.set_position(&Position::at_offset(5)));
        assert_eq!(tok.node_type(), NodeType::Text);
        assert_eq!(tok.read_text_node_char_forward(), Some(b'c'));

        assert!(tok.set_position(&Position::at_offset(8)));
        assert_eq!(tok.node_type(), NodeType::EndElement);
        assert!(tok.read());
        assert_eq!(tok.name(), "p");

        assert!(tok.set_position(&Position::at_offset(doc.len())));
        assert_eq!(tok.node_type(), NodeType::EndOfFile);
        assert!(tok.read_backward());
        assert_eq!(tok.node_type(), NodeType::EndElement);

        assert!(!tok.set_position(&Position::at_offset(doc.len() + 1)));
    }

    #[test]
    fn stray_angle_brackets_are_character_data() {
        let doc = "<p>a < b</p><p>unterminated <i";
        let nodes = forward_all(doc);
        let texts: Vec<_> = nodes
            .iter()
            .filter(|(_, s)| s.0 == NodeType::Text)
            .map(|(_, s)| s.4.clone())
            .collect();
        assert_eq!(texts, vec!["a ", "< b", "unterminated ", "<i"]);

        let mut tok = tokenizer(doc);
        while tok.read() {}
        let mut backward = Vec::new();
        while tok.read_backward() {
            backward.push(signature(&mut tok));
        }
        backward.reverse();
        let forward: Vec<Sig> = nodes.into_iter().map(|(_, s)| s).collect();
        assert_eq!(backward, forward);
    }

    #[test]
    fn stream_source_matches_random_access_forward() {
        let data = DOC.as_bytes().to_vec();
        let mut offset = 0usize;
        let source = ChunkFn(|buf: &mut [u8]| -> std::io::Result<usize> {
            let n = buf.len().min(5).min(data.len() - offset);
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            offset += n;
            Ok(n)
        });
        let mut tok = MarkupTokenizer::from_stream(source, 64);
        let mut streamed = Vec::new();
        while tok.read() {
            streamed.push(signature(&mut tok));
        }
        let expected: Vec<Sig> = forward_all(DOC).into_iter().map(|(_, s)| s).collect();
        assert_eq!(streamed, expected);
        assert!(!tok.read_backward());
        assert!(!tok.set_position(&Position::default()));
    }

    #[test]
    fn byte_order_mark_is_not_text() {
        let doc = "\u{feff}<p>x</p>";
        let nodes = forward_all(doc);
        assert_eq!(nodes[0].1 .0, NodeType::Element);
        let mut tok = tokenizer(doc);
        while tok.read() {}
        let mut count = 0;
        while tok.read_backward() {
            count += 1;
        }
        assert_eq!(count, nodes.len());
    }
}
