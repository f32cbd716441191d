//! EPUB package reader.
//!
//! Opens the ZIP archive, locates the package document through
//! `META-INF/container.xml`, and resolves the manifest and spine once.
//! Entries are served three ways: extracted to a cache file
//! ([`EpubContainer::get_file`]), read whole ([`EpubContainer::read_file`]),
//! or pulled chunk by chunk ([`EpubContainer::start_streaming`]).
//!
//! Book-wide progress treats the spine as one logical byte stream formed
//! by concatenating each item's uncompressed size in reading order.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{EpubError, ZipErrorKind};
use crate::navigation::{self, Navigation, NavigationLimits};
use crate::store::ChunkSource;
use crate::zip::{StreamingZip, ZipEntryReader, ZipLimits};

const CONTAINER_XML: &str = "META-INF/container.xml";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Options for opening a package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Cache root. [`EpubContainer::open`] extracts into a per-book
    /// subdirectory of it; [`EpubContainer::from_reader`] uses it as is.
    pub cache_dir: PathBuf,
    /// Archive parsing limits.
    pub zip_limits: ZipLimits,
    /// TOC parsing limits.
    pub navigation_limits: NavigationLimits,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("epub-pager"),
            zip_limits: ZipLimits::default(),
            navigation_limits: NavigationLimits::default(),
        }
    }
}

impl ContainerOptions {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            zip_limits: ZipLimits::embedded(),
            navigation_limits: NavigationLimits::embedded(),
            ..Self::default()
        }
    }

    /// Set the extraction directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set archive limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.zip_limits = limits;
        self
    }

    /// Set TOC limits.
    pub fn with_navigation_limits(mut self, limits: NavigationLimits) -> Self {
        self.navigation_limits = limits;
        self
    }
}

/// One reading-order item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest id.
    pub id: String,
    /// Href as written in the manifest, relative to the package document.
    pub href: String,
    /// Archive path the href resolves to.
    pub path: String,
    /// Manifest media type.
    pub media_type: String,
    /// Uncompressed size of the entry; `0` when the entry is missing.
    pub size: u64,
}

#[derive(Clone, Debug)]
struct ManifestItem {
    href: String,
    media_type: String,
    properties: String,
}

#[derive(Default)]
struct PackageDocument {
    manifest: HashMap<String, ManifestItem>,
    spine_ids: Vec<String>,
    toc_id: Option<String>,
}

/// An opened EPUB package.
pub struct EpubContainer<R = BufReader<File>> {
    zip: StreamingZip<R>,
    options: ContainerOptions,
    opf_path: String,
    spine: Vec<SpineItem>,
    offsets: Vec<u64>,
    chapter_names: Vec<Option<String>>,
    extracted: HashMap<String, PathBuf>,
    corrupt: bool,
}

impl EpubContainer<BufReader<File>> {
    /// Open the package at `path`. Entries are extracted under
    /// `entries/` of the book's [`book_cache_dir`].
    pub fn open(path: impl AsRef<Path>, options: ContainerOptions) -> Result<Self, EpubError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            log::warn!("[EPUB] cannot open {}: {}", path.display(), err);
            err
        })?;
        let entries = book_cache_dir(&options.cache_dir, path)?.join("entries");
        Self::from_reader(BufReader::new(file), options.with_cache_dir(entries))
    }
}

impl<R: Read + Seek> EpubContainer<R> {
    /// Open a package from any seekable reader.
    pub fn from_reader(reader: R, options: ContainerOptions) -> Result<Self, EpubError> {
        let mut zip = StreamingZip::with_limits(reader, options.zip_limits)?;

        let container_entry = zip
            .entry(CONTAINER_XML)
            .cloned()
            .ok_or_else(|| EpubError::MissingRootfile(format!("{} not found", CONTAINER_XML)))?;
        let container_xml = zip.read_entry(&container_entry)?;
        let opf_path = parse_container_xml(&container_xml)?;

        let opf_entry = zip
            .entry(&opf_path)
            .cloned()
            .ok_or_else(|| EpubError::MissingRootfile(format!("rootfile {} not found", opf_path)))?;
        let opf_bytes = zip.read_entry(&opf_entry)?;
        let package = parse_opf(&opf_bytes)?;
        let base = parent_dir(&opf_path).to_string();

        let mut spine = Vec::with_capacity(package.spine_ids.len());
        for idref in &package.spine_ids {
            let Some(item) = package.manifest.get(idref) else {
                log::warn!("[EPUB] spine idref {} has no manifest item", idref);
                continue;
            };
            let path = resolve_href(&base, &item.href);
            let size = match zip.entry(&path) {
                Some(entry) => entry.uncompressed_size,
                None => {
                    log::warn!("[EPUB] spine item {} missing from archive", path);
                    0
                }
            };
            spine.push(SpineItem {
                id: idref.clone(),
                href: item.href.clone(),
                path,
                media_type: item.media_type.clone(),
                size,
            });
        }
        if spine.is_empty() {
            return Err(EpubError::Opf("spine is empty".to_string()));
        }

        let mut offsets = Vec::with_capacity(spine.len() + 1);
        let mut total = 0u64;
        offsets.push(0);
        for item in &spine {
            total += item.size;
            offsets.push(total);
        }

        let mut container = Self {
            zip,
            options,
            opf_path,
            spine,
            offsets,
            chapter_names: Vec::new(),
            extracted: HashMap::new(),
            corrupt: false,
        };
        container.chapter_names = container.load_chapter_names(&package, &base);
        log::debug!(
            "[EPUB] opened {}: {} spine items, {} bytes",
            container.opf_path,
            container.spine.len(),
            total
        );
        Ok(container)
    }

    fn load_chapter_names(&mut self, package: &PackageDocument, base: &str) -> Vec<Option<String>> {
        let limits = self.options.navigation_limits;
        let nav_item = package
            .manifest
            .values()
            .find(|item| item.properties.split_whitespace().any(|p| p == "nav"))
            .map(|item| (item, true));
        let ncx_item = package
            .toc_id
            .as_ref()
            .and_then(|id| package.manifest.get(id))
            .or_else(|| {
                package
                    .manifest
                    .values()
                    .find(|item| item.media_type == NCX_MEDIA_TYPE)
            })
            .map(|item| (item, false));

        let mut names = vec![None; self.spine.len()];
        let Some((item, is_nav)) = nav_item.or(ncx_item) else {
            log::debug!("[EPUB] no table of contents in manifest");
            return names;
        };
        let toc_path = resolve_href(base, &item.href);
        let bytes = match self.read_file(&toc_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("[EPUB] cannot read toc {}: {}", toc_path, err);
                return names;
            }
        };
        let parsed = if is_nav {
            navigation::parse_nav_xhtml_with_limits(&bytes, limits)
        } else {
            navigation::parse_ncx_with_limits(&bytes, limits)
        };
        let nav: Navigation = match parsed {
            Ok(nav) => nav,
            Err(err) => {
                log::warn!("[EPUB] toc {} ignored: {}", toc_path, err);
                return names;
            }
        };

        let toc_base = parent_dir(&toc_path);
        for (_, point) in nav.toc_flat() {
            let target = resolve_href(toc_base, &point.href);
            if let Some(index) = self.spine.iter().position(|s| s.path == target) {
                if names[index].is_none() && !point.label.is_empty() {
                    names[index] = Some(point.label.clone());
                }
            }
        }
        let mut inherited: Option<String> = None;
        for name in names.iter_mut() {
            match name {
                Some(own) => inherited = Some(own.clone()),
                None => name.clone_from(&inherited),
            }
        }
        names
    }

    /// Whether the package opened with a non-empty spine and no corrupt
    /// entry has been detected since.
    pub fn is_valid(&self) -> bool {
        !self.corrupt && !self.spine.is_empty()
    }

    /// Number of spine items.
    pub fn spine_count(&self) -> usize {
        self.spine.len()
    }

    /// Spine item `index`.
    pub fn spine_item(&self, index: usize) -> Option<&SpineItem> {
        self.spine.get(index)
    }

    /// All spine items in reading order.
    pub fn spine(&self) -> &[SpineItem] {
        &self.spine
    }

    /// Archive path of the package document.
    pub fn content_opf_path(&self) -> &str {
        &self.opf_path
    }

    /// Options the container was opened with.
    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// TOC label for spine item `index`.
    ///
    /// Items without their own TOC entry carry the name of the nearest
    /// preceding item that has one.
    pub fn chapter_name_for_spine(&self, index: usize) -> Option<&str> {
        self.chapter_names.get(index)?.as_deref()
    }

    /// Sum of all spine items' uncompressed sizes.
    pub fn total_book_size(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Uncompressed bytes before spine item `index`; clamps to the book
    /// size past the end.
    pub fn spine_item_offset(&self, index: usize) -> u64 {
        let clamped = index.min(self.spine.len());
        self.offsets.get(clamped).copied().unwrap_or(0)
    }

    /// Book-wide progress of byte `local` inside spine item `index`, in
    /// `[0, 1]`. An empty book reports `1.0`.
    pub fn percentage_at(&self, index: usize, local: u64) -> f32 {
        let total = self.total_book_size();
        if total == 0 {
            return 1.0;
        }
        let absolute = self.spine_item_offset(index).saturating_add(local);
        (absolute as f64 / total as f64).clamp(0.0, 1.0) as f32
    }

    /// Archive path for `href`: tried as an archive path, then relative to
    /// the package document, each also percent-decoded.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let plain = strip_fragment(href);
        if let Some(entry) = self.zip.entry(plain) {
            return Some(entry.name.clone());
        }
        let candidates = [
            resolve_href("", plain),
            resolve_href(parent_dir(&self.opf_path), plain),
        ];
        candidates
            .iter()
            .find_map(|path| self.zip.entry(path).map(|e| e.name.clone()))
    }

    /// Uncompressed size of the entry behind `href`.
    pub fn file_size(&self, href: &str) -> Option<u64> {
        let name = self.resolve(href)?;
        self.zip.entry(&name).map(|e| e.uncompressed_size)
    }

    /// Read the entry behind `href` into memory.
    pub fn read_file(&mut self, href: &str) -> Result<Vec<u8>, EpubError> {
        let entry = self
            .resolve(href)
            .and_then(|name| self.zip.entry(&name).cloned())
            .ok_or_else(|| EpubError::UnknownHref(href.to_string()))?;
        self.zip.read_entry(&entry).map_err(|err| {
            if err.kind() == ZipErrorKind::CrcMismatch {
                self.corrupt = true;
            }
            err.into()
        })
    }

    /// Extract the entry behind `href` into the cache directory and return
    /// the file path. Repeated calls return the same path without
    /// decompressing again. `None` when the href is unknown or extraction
    /// fails.
    pub fn get_file(&mut self, href: &str) -> Option<PathBuf> {
        let Some(name) = self.resolve(href) else {
            log::warn!("[EPUB] get_file: unknown href {}", href);
            return None;
        };
        if let Some(path) = self.extracted.get(&name) {
            return Some(path.clone());
        }
        match self.extract(&name) {
            Ok(path) => {
                self.extracted.insert(name, path.clone());
                Some(path)
            }
            Err(err) => {
                log::warn!("[EPUB] extract {} failed: {}", name, err);
                None
            }
        }
    }

    fn extract(&mut self, name: &str) -> Result<PathBuf, EpubError> {
        let entry = self
            .zip
            .entry(name)
            .cloned()
            .ok_or_else(|| EpubError::UnknownHref(name.to_string()))?;
        let target = cache_path(&self.options.cache_dir, name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = io::BufWriter::new(File::create(&target)?);
        let copied = self.zip.copy_entry(&entry, &mut out);
        let flushed = io::Write::flush(&mut out);
        match copied {
            Ok(bytes) => {
                flushed?;
                log::debug!("[EPUB] extracted {} ({} bytes) to {}", name, bytes, target.display());
                Ok(target)
            }
            Err(err) => {
                if err.kind() == ZipErrorKind::CrcMismatch {
                    self.corrupt = true;
                }
                let _ = fs::remove_file(&target);
                Err(err.into())
            }
        }
    }

    /// Begin a pull stream over the entry behind `href`.
    ///
    /// The stream borrows the container mutably, so a second session
    /// cannot start while this one is alive.
    pub fn start_streaming(
        &mut self,
        href: &str,
        chunk_size: usize,
    ) -> Result<EntryStream<'_, R>, EpubError> {
        let entry = self
            .resolve(href)
            .and_then(|name| self.zip.entry(&name).cloned())
            .ok_or_else(|| EpubError::UnknownHref(href.to_string()))?;
        log::debug!("[EPUB] streaming {} in {} byte chunks", entry.name, chunk_size);
        let reader = self.zip.open_entry(&entry)?;
        Ok(EntryStream {
            reader,
            chunk_size: chunk_size.max(1),
            corrupt: &mut self.corrupt,
            failed: false,
        })
    }
}

/// Active streaming session over one entry.
pub struct EntryStream<'a, R> {
    reader: ZipEntryReader<'a, R>,
    chunk_size: usize,
    corrupt: &'a mut bool,
    failed: bool,
}

impl<R: Read> EntryStream<'_, R> {
    /// Pull up to `min(buf.len(), chunk_size)` bytes. Returns `0` at the end
    /// of the entry or after a failure (see [`Self::failed`]).
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        if self.failed {
            return 0;
        }
        match self.pull(buf) {
            Ok(n) => n,
            Err(err) => {
                log::warn!("[EPUB] stream of {} failed: {}", self.reader.entry().name, err);
                0
            }
        }
    }

    /// Whether the stream stopped on an error.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Uncompressed bytes delivered so far.
    pub fn produced(&self) -> u64 {
        self.reader.produced()
    }

    /// Close the session and release the container.
    pub fn end(self) {
        log::debug!(
            "[EPUB] stream of {} ended after {} bytes",
            self.reader.entry().name,
            self.reader.produced()
        );
    }

    fn pull(&mut self, buf: &mut [u8]) -> Result<usize, EpubError> {
        let max = buf.len().min(self.chunk_size);
        match self.reader.read_chunk(&mut buf[..max]) {
            Ok(n) => Ok(n),
            Err(err) => {
                self.failed = true;
                if err.kind() == ZipErrorKind::CrcMismatch {
                    *self.corrupt = true;
                }
                Err(err.into())
            }
        }
    }
}

impl<R: Read> ChunkSource for EntryStream<'_, R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failed {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "stream failed"));
        }
        self.pull(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl<R: Read> Read for EntryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ChunkSource::read_chunk(self, buf)
    }
}

fn parse_container_xml(bytes: &[u8]) -> Result<String, EpubError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attr(&reader, &e, b"full-path") {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EpubError::MissingRootfile(format!("container.xml: {:?}", err)));
            }
            _ => {}
        }
        buf.clear();
    }
    Err(EpubError::MissingRootfile(
        "no rootfile in container.xml".to_string(),
    ))
}

fn parse_opf(bytes: &[u8]) -> Result<PackageDocument, EpubError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut package = PackageDocument::default();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"item" => {
                    let id = attr(&reader, &e, b"id");
                    let href = attr(&reader, &e, b"href");
                    if let (Some(id), Some(href)) = (id, href) {
                        let item = ManifestItem {
                            href,
                            media_type: attr(&reader, &e, b"media-type").unwrap_or_default(),
                            properties: attr(&reader, &e, b"properties").unwrap_or_default(),
                        };
                        package.manifest.insert(id, item);
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attr(&reader, &e, b"idref") {
                        package.spine_ids.push(idref);
                    }
                }
                b"spine" => package.toc_id = attr(&reader, &e, b"toc"),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(EpubError::Opf(format!("{:?}", err))),
            _ => {}
        }
        buf.clear();
    }
    log::debug!(
        "[EPUB] opf: {} manifest items, {} spine refs",
        package.manifest.len(),
        package.spine_ids.len()
    );
    Ok(package)
}

fn attr(reader: &Reader<&[u8]>, e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| {
            reader
                .decoder()
                .decode(a.value.as_ref())
                .ok()
                .map(|v| v.into_owned())
        })
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

fn strip_fragment(href: &str) -> &str {
    href.split('#').next().unwrap_or(href)
}

/// Join `href` onto `base`, percent-decode it and fold `.`/`..` segments.
pub(crate) fn resolve_href(base: &str, href: &str) -> String {
    let href = strip_fragment(href);
    let decoded = percent_encoding::percent_decode_str(href).decode_utf8_lossy();
    let mut parts: Vec<&str> = Vec::new();
    if !decoded.starts_with('/') {
        parts.extend(base.split('/').filter(|s| !s.is_empty()));
    }
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Cache subdirectory of `root` owned by the book at `path`.
///
/// The name is the file stem plus a CRC-32 of the canonical path, the file
/// size and the modification time, so two books sharing a stem never share
/// cached files and a replaced book starts from a clean directory.
pub fn book_cache_dir(root: &Path, path: &Path) -> io::Result<PathBuf> {
    let canonical = fs::canonicalize(path)?;
    let metadata = fs::metadata(&canonical)?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |since| since.as_nanos());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hasher.update(&metadata.len().to_le_bytes());
    hasher.update(&modified.to_le_bytes());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    Ok(root.join(format!("{}-{:08x}", stem, hasher.finalize())))
}

fn cache_path(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    for component in Path::new(name).components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::tests::build_zip;
    use std::io::Cursor;

    const CONTAINER: &[u8] = br#"<?xml version="1.0"?>
<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container" version="1.0">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    const OPF: &[u8] = br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="text/ch%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c3" href="text/ch3.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/><itemref idref="c2"/><itemref idref="c3"/></spine>
</package>"#;

    const NAV: &[u8] = br#"<html><body><nav epub:type="toc"><ol>
  <li><a href="text/ch%201.xhtml">First</a></li>
  <li><a href="text/ch3.xhtml#top">Third</a></li>
</ol></nav></body></html>"#;

    fn sample(c1: &[u8], c2: &[u8], c3: &[u8]) -> Vec<u8> {
        build_zip(&[
            ("mimetype", b"application/epub+zip", false),
            ("META-INF/container.xml", CONTAINER, true),
            ("OEBPS/content.opf", OPF, true),
            ("OEBPS/nav.xhtml", NAV, true),
            ("OEBPS/text/ch 1.xhtml", c1, true),
            ("OEBPS/text/ch2.xhtml", c2, false),
            ("OEBPS/text/ch3.xhtml", c3, true),
        ])
    }

    fn open(bytes: Vec<u8>, cache: &Path) -> EpubContainer<Cursor<Vec<u8>>> {
        let options = ContainerOptions::default().with_cache_dir(cache);
        EpubContainer::from_reader(Cursor::new(bytes), options).expect("open")
    }

    #[test]
    fn resolves_spine_relative_to_package_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let c = open(sample(b"a", b"b", b"c"), dir.path());
        assert!(c.is_valid());
        assert_eq!(c.content_opf_path(), "OEBPS/content.opf");
        assert_eq!(c.spine_count(), 3);
        let first = c.spine_item(0).expect("item");
        assert_eq!(first.href, "text/ch%201.xhtml");
        assert_eq!(first.path, "OEBPS/text/ch 1.xhtml");
        assert!(c.spine_item(3).is_none());
    }

    #[test]
    fn chapter_names_inherit_from_preceding_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let c = open(sample(b"a", b"b", b"c"), dir.path());
        assert_eq!(c.chapter_name_for_spine(0), Some("First"));
        assert_eq!(c.chapter_name_for_spine(1), Some("First"));
        assert_eq!(c.chapter_name_for_spine(2), Some("Third"));
        assert_eq!(c.chapter_name_for_spine(9), None);
    }

    #[test]
    fn book_percentage_uses_cumulative_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let c = open(
            sample(&[b'a'; 1000], &[b'b'; 2000], &[b'c'; 3000]),
            dir.path(),
        );
        assert_eq!(c.total_book_size(), 6000);
        assert_eq!(c.spine_item_offset(0), 0);
        assert_eq!(c.spine_item_offset(1), 1000);
        assert_eq!(c.spine_item_offset(2), 3000);
        assert_eq!(c.spine_item_offset(7), 6000);
        let pct = c.percentage_at(1, 500);
        assert!((pct - 1500.0 / 6000.0).abs() < 1e-6);
        assert_eq!(c.percentage_at(2, 99_999), 1.0);
    }

    #[test]
    fn get_file_memoizes_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut c = open(sample(b"<p>one</p>", b"b", b"c"), dir.path());
        let first = c.get_file("OEBPS/text/ch 1.xhtml").expect("extract");
        assert_eq!(fs::read(&first).expect("read"), b"<p>one</p>");
        fs::write(&first, b"changed").expect("overwrite");
        let again = c.get_file("text/ch%201.xhtml").expect("cached");
        assert_eq!(first, again);
        assert_eq!(fs::read(&again).expect("read"), b"changed");
        assert!(c.get_file("missing.xhtml").is_none());
    }

    #[test]
    fn streaming_pulls_bounded_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let body = b"abcdefghij".repeat(50);
        let mut c = open(sample(&body, b"b", b"c"), dir.path());
        let mut stream = c.start_streaming("OEBPS/text/ch 1.xhtml", 64).expect("stream");
        let mut buf = [0u8; 256];
        let mut out = Vec::new();
        loop {
            let n = stream.read_chunk(&mut buf);
            assert!(n <= 64);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert!(!stream.failed());
        stream.end();
        assert_eq!(out, body);
        assert!(matches!(
            c.start_streaming("nope.xhtml", 64),
            Err(EpubError::UnknownHref(_))
        ));
    }

    #[test]
    fn missing_container_is_an_error() {
        let bytes = build_zip(&[("mimetype", b"application/epub+zip", false)]);
        let result = EpubContainer::from_reader(Cursor::new(bytes), ContainerOptions::default());
        assert!(matches!(result, Err(EpubError::MissingRootfile(_))));
    }

    #[test]
    fn books_sharing_a_stem_extract_into_separate_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = dir.path().join("cache");
        let mut paths = Vec::new();
        for (sub, body) in [("a", &b"<p>alpha</p>"[..]), ("b", &b"<p>bravo</p>"[..])] {
            fs::create_dir_all(dir.path().join(sub)).expect("mkdir");
            let path = dir.path().join(sub).join("book.epub");
            fs::write(&path, sample(body, b"b", b"c")).expect("write");
            paths.push(path);
        }

        let options = ContainerOptions::default().with_cache_dir(&cache);
        let mut first = EpubContainer::open(&paths[0], options.clone()).expect("open a");
        let mut second = EpubContainer::open(&paths[1], options).expect("open b");
        let a = first.get_file("text/ch%201.xhtml").expect("extract a");
        let b = second.get_file("text/ch%201.xhtml").expect("extract b");
        assert_ne!(a, b);
        assert!(a.starts_with(&cache) && b.starts_with(&cache));
        assert_eq!(fs::read(&a).expect("read a"), b"<p>alpha</p>");
        assert_eq!(fs::read(&b).expect("read b"), b"<p>bravo</p>");
        assert_eq!(
            book_cache_dir(&cache, &paths[0]).expect("key"),
            book_cache_dir(&cache, &paths[0]).expect("key")
        );
    }

    #[test]
    fn href_resolution_folds_dot_segments() {
        assert_eq!(resolve_href("OEBPS/text", "../img/a%20b.png#x"), "OEBPS/img/a b.png");
        assert_eq!(resolve_href("OEBPS", "/top.xhtml"), "top.xhtml");
        assert_eq!(resolve_href("", "./a.xhtml"), "a.xhtml");
    }
}
