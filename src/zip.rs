//! Streaming ZIP reader.
//!
//! Parses the central directory once, then serves entries either whole or
//! as a pull stream that inflates through a fixed input buffer. CRC-32 is
//! checked when an entry has been read to its end.

use std::io::{self, Read, Seek, SeekFrom};

use miniz_oxide::inflate::stream::{inflate, InflateState};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};

use crate::error::{ZipError, ZipErrorKind};

const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;
const SIG_CD_ENTRY: u32 = 0x02014b50;
const SIG_EOCD: u32 = 0x06054b50;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const EOCD_LEN: usize = 22;
const LOCAL_HEADER_LEN: u64 = 30;
const CD_FIXED_LEN: usize = 42;

/// Input buffer size for inflating an entry stream.
pub const INFLATE_INPUT_SIZE: usize = 4096;

/// Archive parsing limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum central directory entries kept.
    pub max_entries: usize,
    /// Maximum uncompressed size of one entry read into memory.
    pub max_entry_size: usize,
    /// Maximum entry name length in bytes.
    pub max_name_len: usize,
    /// Bytes scanned from the end of the archive for the EOCD record.
    pub max_eocd_scan: usize,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_entries: 8192,
            max_entry_size: 64 * 1024 * 1024,
            max_name_len: 1024,
            max_eocd_scan: EOCD_LEN + u16::MAX as usize,
        }
    }
}

impl ZipLimits {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            max_entries: 512,
            max_entry_size: 2 * 1024 * 1024,
            max_name_len: 256,
            max_eocd_scan: 1024,
        }
    }
}

/// Central directory record of one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipEntry {
    /// Path inside the archive.
    pub name: String,
    /// Compression method (0 stored, 8 deflate).
    pub method: u16,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// Uncompressed size in bytes.
    pub uncompressed_size: u64,
    /// Offset of the local file header.
    pub local_header_offset: u64,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
}

/// ZIP archive reader over a seekable byte source.
pub struct StreamingZip<R> {
    reader: R,
    entries: Vec<ZipEntry>,
    limits: ZipLimits,
}

impl<R: Read + Seek> StreamingZip<R> {
    /// Open an archive with default limits.
    pub fn new(reader: R) -> Result<Self, ZipError> {
        Self::with_limits(reader, ZipLimits::default())
    }

    /// Open an archive with explicit limits.
    pub fn with_limits(mut reader: R, limits: ZipLimits) -> Result<Self, ZipError> {
        let (cd_offset, count) = Self::find_eocd(&mut reader, &limits)?;
        if count > limits.max_entries {
            return Err(ZipError::new(
                ZipErrorKind::LimitExceeded,
                format!("{} entries exceed max_entries {}", count, limits.max_entries),
            ));
        }
        reader.seek(SeekFrom::Start(cd_offset))?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            match Self::read_cd_entry(&mut reader, &limits)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }
        log::debug!(
            "[ZIP] central directory at {}: {} of {} entries",
            cd_offset,
            entries.len(),
            count
        );
        Ok(Self {
            reader,
            entries,
            limits,
        })
    }

    /// All entries in directory order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Limits in effect.
    pub fn limits(&self) -> ZipLimits {
        self.limits
    }

    /// Look up an entry by path; exact match first, then ASCII
    /// case-insensitive.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .or_else(|| self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
    }

    /// Read a whole entry into memory.
    pub fn read_entry(&mut self, entry: &ZipEntry) -> Result<Vec<u8>, ZipError> {
        if entry.uncompressed_size > self.limits.max_entry_size as u64 {
            return Err(ZipError::new(
                ZipErrorKind::LimitExceeded,
                format!(
                    "entry size {} exceeds max_entry_size {}",
                    entry.uncompressed_size, self.limits.max_entry_size
                ),
            )
            .with_entry(&entry.name));
        }
        let max = self.limits.max_entry_size;
        let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
        let mut stream = self.open_entry(entry)?;
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read_chunk(&mut chunk)?;
            if n == 0 {
                break;
            }
            if out.len() + n > max {
                return Err(ZipError::new(
                    ZipErrorKind::LimitExceeded,
                    "inflated data exceeds max_entry_size",
                )
                .with_entry(&entry.name));
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    /// Copy a whole entry into `out` without buffering it; returns the byte
    /// count.
    pub fn copy_entry<W: io::Write>(
        &mut self,
        entry: &ZipEntry,
        out: &mut W,
    ) -> Result<u64, ZipError> {
        let mut stream = self.open_entry(entry)?;
        let mut chunk = [0u8; 4096];
        let mut total = 0u64;
        loop {
            let n = stream.read_chunk(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            out.write_all(&chunk[..n])?;
            total += n as u64;
        }
    }

    /// Start a pull stream over one entry. The stream borrows the archive,
    /// so only one can be active at a time.
    pub fn open_entry(&mut self, entry: &ZipEntry) -> Result<ZipEntryReader<'_, R>, ZipError> {
        let data_offset = self.data_offset(entry)?;
        self.reader.seek(SeekFrom::Start(data_offset))?;
        let inflater = match entry.method {
            METHOD_STORED => None,
            METHOD_DEFLATED => Some(InflateState::new_boxed(DataFormat::Raw)),
            other => {
                return Err(ZipError::new(
                    ZipErrorKind::UnsupportedMethod,
                    format!("compression method {}", other),
                )
                .with_entry(&entry.name))
            }
        };
        Ok(ZipEntryReader {
            reader: &mut self.reader,
            entry: entry.clone(),
            remaining: entry.compressed_size,
            input: Vec::new(),
            in_pos: 0,
            inflater,
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            done: entry.compressed_size == 0 && entry.method == METHOD_STORED,
        })
    }

    fn find_eocd(reader: &mut R, limits: &ZipLimits) -> Result<(u64, usize), ZipError> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < EOCD_LEN as u64 {
            return Err(ZipError::new(ZipErrorKind::MissingEocd, "archive too small"));
        }
        let scan = file_size.min(limits.max_eocd_scan.max(EOCD_LEN) as u64) as usize;
        let mut tail = vec![0u8; scan];
        reader.seek(SeekFrom::Start(file_size - scan as u64))?;
        reader.read_exact(&mut tail)?;

        for i in (0..=scan - EOCD_LEN).rev() {
            if read_u32_le(&tail, i) == SIG_EOCD {
                let count = read_u16_le(&tail, i + 10) as usize;
                let cd_offset = read_u32_le(&tail, i + 16) as u64;
                return Ok((cd_offset, count));
            }
        }
        Err(ZipError::new(
            ZipErrorKind::MissingEocd,
            "end of central directory not found",
        ))
    }

    fn read_cd_entry(reader: &mut R, limits: &ZipLimits) -> Result<Option<ZipEntry>, ZipError> {
        let mut sig = [0u8; 4];
        if reader.read_exact(&mut sig).is_err() || u32::from_le_bytes(sig) != SIG_CD_ENTRY {
            return Ok(None);
        }
        let mut buf = [0u8; CD_FIXED_LEN];
        reader.read_exact(&mut buf)?;

        let name_len = read_u16_le(&buf, 24) as usize;
        let extra_len = read_u16_le(&buf, 26) as i64;
        let comment_len = read_u16_le(&buf, 28) as i64;
        if name_len > limits.max_name_len {
            return Err(ZipError::new(
                ZipErrorKind::LimitExceeded,
                format!("entry name length {} exceeds {}", name_len, limits.max_name_len),
            ));
        }
        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        reader.seek(SeekFrom::Current(extra_len + comment_len))?;

        Ok(Some(ZipEntry {
            name: String::from_utf8_lossy(&name).into_owned(),
            method: read_u16_le(&buf, 6),
            crc32: read_u32_le(&buf, 12),
            compressed_size: read_u32_le(&buf, 16) as u64,
            uncompressed_size: read_u32_le(&buf, 20) as u64,
            local_header_offset: read_u32_le(&buf, 38) as u64,
        }))
    }

    fn data_offset(&mut self, entry: &ZipEntry) -> Result<u64, ZipError> {
        self.reader.seek(SeekFrom::Start(entry.local_header_offset))?;
        let mut header = [0u8; LOCAL_HEADER_LEN as usize];
        self.reader.read_exact(&mut header)?;
        if read_u32_le(&header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(
                ZipError::new(ZipErrorKind::BadSignature, "local file header")
                    .with_entry(&entry.name),
            );
        }
        let name_len = read_u16_le(&header, 26) as u64;
        let extra_len = read_u16_le(&header, 28) as u64;
        Ok(entry.local_header_offset + LOCAL_HEADER_LEN + name_len + extra_len)
    }
}

/// Pull stream over one entry's uncompressed bytes.
pub struct ZipEntryReader<'a, R> {
    reader: &'a mut R,
    entry: ZipEntry,
    remaining: u64,
    input: Vec<u8>,
    in_pos: usize,
    inflater: Option<Box<InflateState>>,
    hasher: crc32fast::Hasher,
    produced: u64,
    done: bool,
}

impl<R: Read> ZipEntryReader<'_, R> {
    /// The entry being read.
    pub fn entry(&self) -> &ZipEntry {
        &self.entry
    }

    /// Uncompressed bytes produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Fill `out` with the next uncompressed bytes; `Ok(0)` at the end.
    pub fn read_chunk(&mut self, out: &mut [u8]) -> Result<usize, ZipError> {
        if self.done || out.is_empty() {
            return Ok(0);
        }
        if self.inflater.is_none() {
            return self.read_stored(out);
        }
        loop {
            if self.in_pos == self.input.len() && self.remaining > 0 {
                self.fill_input()?;
            }
            let exhausted = self.in_pos == self.input.len() && self.remaining == 0;
            let Some(state) = self.inflater.as_mut() else {
                return Ok(0);
            };
            let result = inflate(state, &self.input[self.in_pos..], out, MZFlush::None);
            self.in_pos += result.bytes_consumed;
            let written = result.bytes_written;
            self.hasher.update(&out[..written]);
            self.produced += written as u64;
            match result.status {
                Ok(MZStatus::StreamEnd) => {
                    self.finish()?;
                    return Ok(written);
                }
                Ok(_) | Err(MZError::Buf) => {
                    if written > 0 {
                        return Ok(written);
                    }
                    if exhausted {
                        return Err(self.error(ZipErrorKind::Decompress, "truncated deflate data"));
                    }
                }
                Err(err) => {
                    return Err(
                        self.error(ZipErrorKind::Decompress, &format!("inflate failed: {:?}", err))
                    )
                }
            }
        }
    }

    fn read_stored(&mut self, out: &mut [u8]) -> Result<usize, ZipError> {
        let want = (out.len() as u64).min(self.remaining) as usize;
        let n = self.reader.read(&mut out[..want])?;
        if n == 0 {
            return Err(self.error(ZipErrorKind::Io, "unexpected end of stored data"));
        }
        self.hasher.update(&out[..n]);
        self.produced += n as u64;
        self.remaining -= n as u64;
        if self.remaining == 0 {
            self.finish()?;
        }
        Ok(n)
    }

    fn fill_input(&mut self) -> Result<(), ZipError> {
        let want = (INFLATE_INPUT_SIZE as u64).min(self.remaining) as usize;
        self.input.resize(want, 0);
        self.reader.read_exact(&mut self.input)?;
        self.remaining -= want as u64;
        self.in_pos = 0;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ZipError> {
        self.done = true;
        let crc = core::mem::take(&mut self.hasher).finalize();
        if crc != self.entry.crc32 {
            log::warn!(
                "[ZIP] crc mismatch for {}: expected {:08x}, got {:08x}",
                self.entry.name,
                self.entry.crc32,
                crc
            );
            return Err(self.error(ZipErrorKind::CrcMismatch, "checksum differs"));
        }
        Ok(())
    }

    fn error(&self, kind: ZipErrorKind, message: &str) -> ZipError {
        ZipError::new(kind, message).with_entry(&self.entry.name)
    }
}

impl<R: Read> Read for ZipEntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
