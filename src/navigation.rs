//! Table-of-contents parsing for chapter names.
//!
//! Supports EPUB 3 XHTML navigation documents (`<nav epub:type="toc">`)
//! and the EPUB 2 NCX fallback (`<navMap>`).
//!
//! ```rust
//! use epub_pager::navigation::parse_ncx;
//!
//! let ncx = br#"<ncx><navMap><navPoint id="n1">
//!     <navLabel><text>Chapter One</text></navLabel>
//!     <content src="ch1.xhtml"/>
//! </navPoint></navMap></ncx>"#;
//! let nav = parse_ncx(ncx).unwrap();
//! assert_eq!(nav.toc[0].label, "Chapter One");
//! ```

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::EpubError;

/// Limits for navigation parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationLimits {
    /// Maximum number of TOC entries.
    pub max_points: usize,
    /// Maximum nesting depth.
    pub max_depth: usize,
    /// Maximum UTF-8 byte length of a label; longer labels are truncated.
    pub max_label_bytes: usize,
}

impl Default for NavigationLimits {
    fn default() -> Self {
        Self {
            max_points: 4096,
            max_depth: 64,
            max_label_bytes: 1024,
        }
    }
}

impl NavigationLimits {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            max_points: 512,
            max_depth: 16,
            max_label_bytes: 256,
        }
    }
}

/// One TOC entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavPoint {
    /// Display label.
    pub label: String,
    /// Target href as written in the TOC document (may carry a fragment).
    pub href: String,
    /// Nested entries.
    pub children: Vec<NavPoint>,
}

/// Parsed table of contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Top-level TOC entries.
    pub toc: Vec<NavPoint>,
}

impl Navigation {
    /// Whether any entries were found.
    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    /// Depth-first flattening as `(depth, point)`.
    pub fn toc_flat(&self) -> Vec<(usize, &NavPoint)> {
        let mut out = Vec::new();
        flatten(&self.toc, 0, &mut out);
        out
    }
}

fn flatten<'a>(points: &'a [NavPoint], depth: usize, out: &mut Vec<(usize, &'a NavPoint)>) {
    for point in points {
        out.push((depth, point));
        flatten(&point.children, depth + 1, out);
    }
}

#[derive(Default)]
struct PartialPoint {
    label: String,
    href: Option<String>,
    children: Vec<NavPoint>,
}

impl PartialPoint {
    fn finish(self) -> Option<NavPoint> {
        let href = self.href?;
        Some(NavPoint {
            label: self.label.trim().to_string(),
            href,
            children: self.children,
        })
    }
}

struct TreeBuilder {
    limits: NavigationLimits,
    stack: Vec<PartialPoint>,
    roots: Vec<NavPoint>,
    count: usize,
}

impl TreeBuilder {
    fn new(limits: NavigationLimits) -> Self {
        Self {
            limits,
            stack: Vec::new(),
            roots: Vec::new(),
            count: 0,
        }
    }

    fn open(&mut self) -> Result<(), EpubError> {
        if self.stack.len() >= self.limits.max_depth {
            return Err(EpubError::Navigation(format!(
                "depth exceeds max_depth {}",
                self.limits.max_depth
            )));
        }
        self.stack.push(PartialPoint::default());
        Ok(())
    }

    fn close(&mut self) -> Result<(), EpubError> {
        let Some(point) = self.stack.pop().and_then(PartialPoint::finish) else {
            return Ok(());
        };
        self.count += 1;
        if self.count > self.limits.max_points {
            return Err(EpubError::Navigation(format!(
                "entries exceed max_points {}",
                self.limits.max_points
            )));
        }
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(point),
            None => self.roots.push(point),
        }
        Ok(())
    }

    fn set_href(&mut self, href: String) {
        if let Some(point) = self.stack.last_mut() {
            point.href = Some(href);
        }
    }

    fn push_label(&mut self, text: &str) {
        let max = self.limits.max_label_bytes;
        if let Some(point) = self.stack.last_mut() {
            if !point.label.is_empty() && !point.label.ends_with(' ') && !text.starts_with(' ') {
                point.label.push(' ');
            }
            for ch in text.chars() {
                if point.label.len() + ch.len_utf8() > max {
                    break;
                }
                point.label.push(ch);
            }
        }
    }
}

fn attr_value(reader: &Reader<&[u8]>, e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        let name = attr.key.as_ref();
        let local = name.rsplit(|b| *b == b':').next().unwrap_or(name);
        if name == key || local == key {
            reader
                .decoder()
                .decode(attr.value.as_ref())
                .ok()
                .map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn resolve_entity(name: &str) -> String {
    quick_xml::escape::unescape(&format!("&{};", name))
        .map(|s| s.into_owned())
        .unwrap_or_default()
}

/// Parse an EPUB 3 navigation document with default limits.
pub fn parse_nav_xhtml(content: &[u8]) -> Result<Navigation, EpubError> {
    parse_nav_xhtml_with_limits(content, NavigationLimits::default())
}

/// Parse an EPUB 3 navigation document.
pub fn parse_nav_xhtml_with_limits(
    content: &[u8],
    limits: NavigationLimits,
) -> Result<Navigation, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut tree = TreeBuilder::new(limits);
    let mut nav_depth = 0usize;
    let mut in_toc = false;
    let mut found_toc = false;
    let mut in_anchor = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"nav" => {
                    nav_depth += 1;
                    let is_toc = attr_value(&reader, &e, b"type")
                        .is_some_and(|v| v.split_whitespace().any(|t| t == "toc"));
                    if is_toc && !found_toc {
                        in_toc = true;
                    }
                }
                b"li" if in_toc => tree.open()?,
                b"a" | b"span" if in_toc => {
                    in_anchor = true;
                    if let Some(href) = attr_value(&reader, &e, b"href") {
                        tree.set_href(href);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if in_toc && e.local_name().as_ref() == b"a" => {
                if let Some(href) = attr_value(&reader, &e, b"href") {
                    tree.set_href(href);
                }
            }
            Ok(Event::Text(e)) if in_anchor => {
                let text = reader.decoder().decode(&e).unwrap_or_default();
                let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    tree.push_label(&collapsed);
                }
            }
            Ok(Event::GeneralRef(e)) if in_anchor => {
                if let Ok(name) = e.decode() {
                    tree.push_label(&resolve_entity(&name));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"a" | b"span" => in_anchor = false,
                b"li" if in_toc => tree.close()?,
                b"nav" => {
                    nav_depth = nav_depth.saturating_sub(1);
                    if in_toc && nav_depth == 0 {
                        in_toc = false;
                        found_toc = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EpubError::Navigation(format!("nav xml error: {:?}", err)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(Navigation { toc: tree.roots })
}

/// Parse an EPUB 2 NCX document with default limits.
pub fn parse_ncx(content: &[u8]) -> Result<Navigation, EpubError> {
    parse_ncx_with_limits(content, NavigationLimits::default())
}

/// Parse an EPUB 2 NCX document.
pub fn parse_ncx_with_limits(
    content: &[u8],
    limits: NavigationLimits,
) -> Result<Navigation, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut tree = TreeBuilder::new(limits);
    let mut in_nav_map = false;
    let mut in_label_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => tree.open()?,
                b"text" if in_nav_map => in_label_text = true,
                b"content" if in_nav_map => {
                    if let Some(src) = attr_value(&reader, &e, b"src") {
                        tree.set_href(src);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if in_nav_map && e.local_name().as_ref() == b"content" => {
                if let Some(src) = attr_value(&reader, &e, b"src") {
                    tree.set_href(src);
                }
            }
            Ok(Event::Text(e)) if in_label_text => {
                let text = reader.decoder().decode(&e).unwrap_or_default();
                tree.push_label(&text);
            }
            Ok(Event::GeneralRef(e)) if in_label_text => {
                if let Ok(name) = e.decode() {
                    tree.push_label(&resolve_entity(&name));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = false,
                b"navPoint" if in_nav_map => tree.close()?,
                b"text" => in_label_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EpubError::Navigation(format!("ncx xml error: {:?}", err)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(Navigation { toc: tree.roots })
}
