//! Markup to normalized text.
//!
//! One forward pass over tokenizer events. Block elements end a line,
//! `head`/`script`/`style`/`title` content is dropped, whitespace runs
//! collapse to one space, and entities are decoded. With
//! [`NormalizeOptions::control_tokens`] the output also carries paragraph
//! alignment and inline emphasis as two-byte [`ESC`] tokens.
//!
//! ```rust
//! use epub_pager::normalizer::{normalize_markup, NormalizeOptions};
//!
//! let text = normalize_markup(b"<p>Hello <em>world</em>.</p>", NormalizeOptions::default());
//! assert_eq!(text, b"Hello world.\n");
//! ```

use std::io::{self, Write};

use crate::store::{ByteAccess, MemoryStore, SlidingWindow};
use crate::tokenizer::{MarkupTokenizer, NodeType};
use crate::word::{ControlToken, Emphasis, TextAlign, ESC};

/// Default output buffer size before a flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1024;

const MAX_OPEN_ELEMENTS: usize = 256;
const MAX_ENTITY_LEN: usize = 10;

/// Normalizer settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Emit alignment and emphasis control tokens.
    pub control_tokens: bool,
    /// Buffered output bytes that trigger a write to the destination.
    pub flush_threshold: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            control_tokens: false,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl NormalizeOptions {
    /// Plain text plus control tokens.
    pub fn styled() -> Self {
        Self {
            control_tokens: true,
            ..Self::default()
        }
    }

    /// Toggle control-token output.
    pub fn with_control_tokens(mut self, enabled: bool) -> Self {
        self.control_tokens = enabled;
        self
    }

    /// Set the flush threshold (at least one byte).
    pub fn with_flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes.max(1);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ElementClass {
    Skip,
    Block,
    LineBreak,
    Bold,
    Italic,
    Inline,
}

fn classify(name: &str) -> ElementClass {
    match name {
        "head" | "title" | "style" | "script" => ElementClass::Skip,
        "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "blockquote"
        | "section" | "article" | "header" | "footer" | "nav" => ElementClass::Block,
        "br" | "hr" => ElementClass::LineBreak,
        "b" | "strong" => ElementClass::Bold,
        "i" | "em" | "cite" => ElementClass::Italic,
        _ => ElementClass::Inline,
    }
}

fn local_lowercase(name: &str) -> String {
    let local = name.rsplit(':').next().unwrap_or(name);
    local.to_ascii_lowercase()
}

struct OpenElement {
    name: String,
    class: ElementClass,
    align: Option<TextAlign>,
}

/// Streaming markup-to-text converter.
pub struct TextNormalizer {
    options: NormalizeOptions,
    stack: Vec<OpenElement>,
    skip_depth: usize,
    bold_depth: usize,
    italic_depth: usize,
    written_bold: bool,
    written_italic: bool,
    line_has_text: bool,
    pending_space: bool,
    out: Vec<u8>,
    written: u64,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(NormalizeOptions::default())
    }
}

impl TextNormalizer {
    /// Normalizer with `options`.
    pub fn new(options: NormalizeOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
            skip_depth: 0,
            bold_depth: 0,
            italic_depth: 0,
            written_bold: false,
            written_italic: false,
            line_has_text: false,
            pending_space: false,
            out: Vec::with_capacity(options.flush_threshold),
            written: 0,
        }
    }

    /// Options in effect.
    pub fn options(&self) -> NormalizeOptions {
        self.options
    }

    /// Read `tokenizer` forward to its end and write normalized text to
    /// `dest`. Returns the number of bytes written.
    pub fn convert<A: ByteAccess, W: Write>(
        &mut self,
        tokenizer: &mut MarkupTokenizer<A>,
        dest: &mut W,
    ) -> io::Result<u64> {
        *self = Self::new(self.options);
        let mut nodes = 0usize;
        while tokenizer.read() {
            nodes += 1;
            match tokenizer.node_type() {
                NodeType::Element => self.open_element(tokenizer),
                NodeType::EndElement => {
                    let name = local_lowercase(tokenizer.name());
                    self.close_element(&name);
                }
                NodeType::Text if self.skip_depth == 0 => self.text(tokenizer),
                _ => {}
            }
            if self.out.len() >= self.options.flush_threshold {
                self.flush(dest)?;
            }
        }
        self.close_styles(false, false);
        self.flush(dest)?;
        dest.flush()?;
        log::debug!(
            "[NORM] {} nodes -> {} bytes (control tokens: {})",
            nodes,
            self.written,
            self.options.control_tokens
        );
        Ok(self.written)
    }

    fn open_element<A: ByteAccess>(&mut self, tokenizer: &MarkupTokenizer<A>) {
        let name = local_lowercase(tokenizer.name());
        let class = classify(&name);
        if tokenizer.is_empty_element() {
            match class {
                ElementClass::LineBreak if self.skip_depth == 0 => self.paragraph_break(),
                ElementClass::Block if self.skip_depth == 0 => self.paragraph_break(),
                _ => {}
            }
            return;
        }
        if class == ElementClass::LineBreak {
            // `<br>` written as a start tag
            if self.skip_depth == 0 {
                self.paragraph_break();
            }
            return;
        }
        if self.stack.len() >= MAX_OPEN_ELEMENTS {
            log::warn!("[NORM] element depth limit hit at <{}>", name);
            return;
        }
        let align = if class == ElementClass::Block {
            if self.skip_depth == 0 {
                self.paragraph_break();
            }
            block_alignment(tokenizer)
        } else {
            None
        };
        match class {
            ElementClass::Skip => self.skip_depth += 1,
            ElementClass::Bold => self.bold_depth += 1,
            ElementClass::Italic => self.italic_depth += 1,
            _ => {}
        }
        self.stack.push(OpenElement { name, class, align });
    }

    fn close_element(&mut self, name: &str) {
        let Some(index) = self.stack.iter().rposition(|e| e.name == name) else {
            return;
        };
        while self.stack.len() > index {
            let Some(element) = self.stack.pop() else {
                break;
            };
            match element.class {
                ElementClass::Skip => self.skip_depth = self.skip_depth.saturating_sub(1),
                ElementClass::Bold => self.bold_depth = self.bold_depth.saturating_sub(1),
                ElementClass::Italic => self.italic_depth = self.italic_depth.saturating_sub(1),
                ElementClass::Block if self.skip_depth == 0 => self.paragraph_break(),
                _ => {}
            }
        }
    }

    fn text<A: ByteAccess>(&mut self, tokenizer: &mut MarkupTokenizer<A>) {
        let mut entity: heapless::Vec<u8, MAX_ENTITY_LEN> = heapless::Vec::new();
        let mut in_entity = false;
        while let Some(byte) = tokenizer.read_text_node_char_forward() {
            if in_entity {
                if byte == b';' {
                    in_entity = false;
                    match decode_entity(&entity) {
                        Some(ch) => {
                            let mut utf8 = [0u8; 4];
                            for b in ch.encode_utf8(&mut utf8).bytes() {
                                self.text_byte(b);
                            }
                        }
                        None => {
                            self.raw_entity(&entity);
                            self.text_byte(b';');
                        }
                    }
                    entity.clear();
                    continue;
                }
                if (byte.is_ascii_alphanumeric() || byte == b'#') && entity.push(byte).is_ok() {
                    continue;
                }
                in_entity = false;
                self.raw_entity(&entity);
                entity.clear();
            }
            if byte == b'&' {
                in_entity = true;
                continue;
            }
            self.text_byte(byte);
        }
        if in_entity {
            self.raw_entity(&entity);
        }
    }

    fn raw_entity(&mut self, name: &[u8]) {
        self.text_byte(b'&');
        for &b in name {
            self.text_byte(b);
        }
    }

    fn text_byte(&mut self, byte: u8) {
        match byte {
            b'\r' => {}
            b' ' | b'\t' | b'\n' | ESC => {
                if self.line_has_text {
                    self.pending_space = true;
                }
            }
            _ => {
                if !self.line_has_text {
                    self.start_line();
                }
                // The separating space sits outside any emphasis span.
                let (bold, italic) = (self.bold_depth > 0, self.italic_depth > 0);
                self.close_styles(bold, italic);
                if self.pending_space {
                    self.pending_space = false;
                    self.push(b' ');
                }
                self.open_styles(bold, italic);
                self.push(byte);
            }
        }
    }

    fn start_line(&mut self) {
        self.line_has_text = true;
        if !self.options.control_tokens {
            return;
        }
        if let Some(align) = self.stack.iter().rev().find_map(|e| e.align) {
            self.out.extend_from_slice(&ControlToken::Align(align).encode());
        }
    }

    fn close_styles(&mut self, bold: bool, italic: bool) {
        if !self.options.control_tokens {
            return;
        }
        if self.written_bold && !bold {
            self.out
                .extend_from_slice(&ControlToken::Exit(Emphasis::Bold).encode());
            self.written_bold = false;
        }
        if self.written_italic && !italic {
            self.out
                .extend_from_slice(&ControlToken::Exit(Emphasis::Italic).encode());
            self.written_italic = false;
        }
    }

    fn open_styles(&mut self, bold: bool, italic: bool) {
        if !self.options.control_tokens {
            return;
        }
        if bold && !self.written_bold {
            self.out
                .extend_from_slice(&ControlToken::Enter(Emphasis::Bold).encode());
            self.written_bold = true;
        }
        if italic && !self.written_italic {
            self.out
                .extend_from_slice(&ControlToken::Enter(Emphasis::Italic).encode());
            self.written_italic = true;
        }
    }

    /// Block edges and `<br>`/`<hr>` end the current line. A break with no
    /// text since the last one adds nothing, so no empty lines are written.
    fn paragraph_break(&mut self) {
        self.pending_space = false;
        if self.line_has_text {
            self.end_line();
        }
    }

    fn end_line(&mut self) {
        self.close_styles(false, false);
        self.push(b'\n');
        self.line_has_text = false;
    }

    fn push(&mut self, byte: u8) {
        self.out.push(byte);
    }

    fn flush<W: Write>(&mut self, dest: &mut W) -> io::Result<()> {
        if self.out.is_empty() {
            return Ok(());
        }
        dest.write_all(&self.out)?;
        self.written += self.out.len() as u64;
        self.out.clear();
        Ok(())
    }
}

fn block_alignment<A: ByteAccess>(tokenizer: &MarkupTokenizer<A>) -> Option<TextAlign> {
    if let Some(value) = tokenizer.attribute("align") {
        if let Some(align) = parse_alignment(value) {
            return Some(align);
        }
    }
    let style = tokenizer.attribute("style")?;
    style.split(';').find_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        if prop.trim().eq_ignore_ascii_case("text-align") {
            parse_alignment(value)
        } else {
            None
        }
    })
}

fn parse_alignment(value: &str) -> Option<TextAlign> {
    match value.trim().to_ascii_lowercase().as_str() {
        "left" | "start" => Some(TextAlign::Left),
        "right" | "end" => Some(TextAlign::Right),
        "center" => Some(TextAlign::Center),
        "justify" => Some(TextAlign::Justify),
        _ => None,
    }
}

fn decode_entity(name: &[u8]) -> Option<char> {
    if let Some(num) = name.strip_prefix(b"#") {
        let text = std::str::from_utf8(num).ok()?;
        let code = match text.strip_prefix('x').or_else(|| text.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => text.parse::<u32>().ok()?,
        };
        return char::from_u32(code).filter(|c| *c != '\u{1B}' && *c != '\0');
    }
    let ch = match name {
        b"amp" => '&',
        b"lt" => '<',
        b"gt" => '>',
        b"quot" => '"',
        b"apos" => '\'',
        b"nbsp" => '\u{A0}',
        b"shy" => '\u{AD}',
        b"ndash" => '\u{2013}',
        b"mdash" => '\u{2014}',
        b"lsquo" => '\u{2018}',
        b"rsquo" => '\u{2019}',
        b"ldquo" => '\u{201C}',
        b"rdquo" => '\u{201D}',
        b"hellip" => '\u{2026}',
        b"copy" => '\u{A9}',
        _ => return None,
    };
    Some(ch)
}

/// Normalize an in-memory markup document.
pub fn normalize_markup(markup: &[u8], options: NormalizeOptions) -> Vec<u8> {
    let mut tokenizer = MarkupTokenizer::with_access(SlidingWindow::new(MemoryStore::new(markup)));
    let mut out = Vec::new();
    let mut normalizer = TextNormalizer::new(options);
    if let Err(err) = normalizer.convert(&mut tokenizer, &mut out) {
        log::warn!("[NORM] in-memory conversion failed: {}", err);
    }
    out
}
