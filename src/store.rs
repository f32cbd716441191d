//! Byte sources consumed by the tokenizer and the word scanner.
//!
//! Storage is injected: a [`ByteStore`] offers random access (file or
//! memory), a [`ChunkSource`] is a forward-only pull stream such as the
//! output of an archive entry being inflated. Both are read through a
//! bounded buffer so memory does not grow with document size.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Default sliding window size in bytes.
pub const DEFAULT_WINDOW_SIZE: usize = 2048;

const MIN_WINDOW_SIZE: usize = 64;

/// Random-access byte storage.
pub trait ByteStore {
    /// Total length in bytes.
    fn len(&self) -> usize;

    /// True when the store holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes copied; `0` means `offset` is at or past
    /// the end.
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: ByteStore + ?Sized> ByteStore for Box<T> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// In-memory byte store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    /// Wrap owned bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Borrow the stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<&str> for MemoryStore {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

impl From<String> for MemoryStore {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl ByteStore for MemoryStore {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<usize> {
        let Some(rest) = self.data.get(offset..) else {
            return Ok(0);
        };
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }
}

/// File-backed byte store; reads are positioned seeks on one handle.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    len: usize,
}

impl FileStore {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    /// Wrap an already opened file.
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = usize::try_from(file.metadata()?.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))?;
        Ok(Self { file, len })
    }
}

impl ByteStore for FileStore {
    fn len(&self) -> usize {
        self.len
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read(buf)
    }
}

/// Forward-only pull stream of bytes.
pub trait ChunkSource {
    /// Fill `buf` with the next bytes; `Ok(0)` signals end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: ChunkSource + ?Sized> ChunkSource for &mut T {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }
}

/// Adapts a pull callback into a [`ChunkSource`].
pub struct ChunkFn<F>(pub F);

impl<F> ChunkSource for ChunkFn<F>
where
    F: FnMut(&mut [u8]) -> io::Result<usize>,
{
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (self.0)(buf)
    }
}

/// Adapts any [`Read`] into a [`ChunkSource`].
pub struct ReadChunks<R>(pub R);

impl<R: Read> ChunkSource for ReadChunks<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.0.read(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

/// Byte-addressed access used by the lexers.
pub trait ByteAccess {
    /// Byte at absolute offset `pos`, or `None` past the end (or before the
    /// retained region of a forward-only source).
    fn byte_at(&mut self, pos: usize) -> Option<u8>;

    /// Total length when known. Forward-only sources learn it at end of
    /// stream.
    fn total_len(&self) -> Option<usize>;

    /// Whether arbitrary offsets (including backward) can be revisited.
    fn is_seekable(&self) -> bool;

    /// Hint that bytes before `pos` will not be requested again.
    fn retain_from(&mut self, _pos: usize) {}
}

/// Fixed-size window over a [`ByteStore`], re-centered on a miss.
#[derive(Debug)]
pub struct SlidingWindow<S> {
    store: S,
    buf: Vec<u8>,
    start: usize,
    filled: usize,
    len: usize,
    refills: usize,
}

impl<S: ByteStore> SlidingWindow<S> {
    /// Window of [`DEFAULT_WINDOW_SIZE`] bytes.
    pub fn new(store: S) -> Self {
        Self::with_capacity(store, DEFAULT_WINDOW_SIZE)
    }

    /// Window of `capacity` bytes (at least 64).
    pub fn with_capacity(store: S, capacity: usize) -> Self {
        let len = store.len();
        Self {
            store,
            buf: vec![0; capacity.max(MIN_WINDOW_SIZE)],
            start: 0,
            filled: 0,
            len,
            refills: 0,
        }
    }

    /// Length of the underlying store.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the underlying store is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Window size in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of refills so far.
    pub fn refill_count(&self) -> usize {
        self.refills
    }

    /// Byte at `pos`, refilling the window around it when needed.
    pub fn get(&mut self, pos: usize) -> Option<u8> {
        if pos >= self.len {
            return None;
        }
        if pos < self.start || pos >= self.start + self.filled {
            self.refill(pos);
        }
        pos.checked_sub(self.start)
            .filter(|rel| *rel < self.filled)
            .map(|rel| self.buf[rel])
    }

    /// Copy `out.len()` bytes starting at `pos`; returns the count copied.
    pub fn copy_range(&mut self, pos: usize, out: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < out.len() {
            match self.get(pos + copied) {
                Some(byte) => out[copied] = byte,
                None => break,
            }
            copied += 1;
        }
        copied
    }

    /// Release the underlying store.
    pub fn into_inner(self) -> S {
        self.store
    }

    fn refill(&mut self, pos: usize) {
        let cap = self.buf.len();
        let start = pos.saturating_sub(cap / 2).min(self.len.saturating_sub(cap));
        let want = (self.len - start).min(cap);
        let mut filled = 0;
        while filled < want {
            match self.store.read_at(start + filled, &mut self.buf[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!("[STORE] window refill at {} failed: {}", start, err);
                    break;
                }
            }
        }
        self.start = start;
        self.filled = filled;
        self.refills += 1;
    }
}

impl<S: ByteStore> ByteAccess for SlidingWindow<S> {
    fn byte_at(&mut self, pos: usize) -> Option<u8> {
        self.get(pos)
    }

    fn total_len(&self) -> Option<usize> {
        Some(self.len)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Forward-only buffer over a [`ChunkSource`].
///
/// Bytes before the last [`ByteAccess::retain_from`] mark are dropped when
/// more input is pulled, so the buffer holds at most one lexical unit plus
/// one chunk.
pub struct ChunkWindow<C> {
    source: C,
    buf: Vec<u8>,
    base: usize,
    keep_from: usize,
    chunk_size: usize,
    eof: bool,
}

impl<C: ChunkSource> ChunkWindow<C> {
    /// Pull `chunk_size` bytes at a time from `source`.
    pub fn new(source: C, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(MIN_WINDOW_SIZE);
        Self {
            source,
            buf: Vec::with_capacity(chunk_size * 2),
            base: 0,
            keep_from: 0,
            chunk_size,
            eof: false,
        }
    }

    /// Release the underlying source.
    pub fn into_inner(self) -> C {
        self.source
    }

    fn pull(&mut self) -> bool {
        let drop = self.keep_from.saturating_sub(self.base).min(self.buf.len());
        if drop > 0 {
            self.buf.drain(..drop);
            self.base += drop;
        }
        let old = self.buf.len();
        self.buf.resize(old + self.chunk_size, 0);
        let read = loop {
            match self.source.read_chunk(&mut self.buf[old..]) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        match read {
            Ok(n) => {
                self.buf.truncate(old + n);
                if n == 0 {
                    self.eof = true;
                }
                n > 0
            }
            Err(err) => {
                log::warn!("[STORE] chunk read at {} failed: {}", self.base + old, err);
                self.buf.truncate(old);
                self.eof = true;
                false
            }
        }
    }
}

impl<C: ChunkSource> ByteAccess for ChunkWindow<C> {
    fn byte_at(&mut self, pos: usize) -> Option<u8> {
        if pos < self.base {
            return None;
        }
        while pos >= self.base + self.buf.len() {
            if self.eof || !self.pull() {
                return None;
            }
        }
        self.buf.get(pos - self.base).copied()
    }

    fn total_len(&self) -> Option<usize> {
        self.eof.then_some(self.base + self.buf.len())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn retain_from(&mut self, pos: usize) {
        self.keep_from = self.keep_from.max(pos);
    }
}
