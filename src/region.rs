// Segment file creation/opening with header validation and mmap-backed
// buffer views.
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libc::{EACCES, EPERM};
use memmap2::MmapMut;
use tracing::debug;

use crate::buffer::AtomicBuffer;
use crate::error::{Error, ErrorKind};
use crate::segment::{check_term_buffer, STATE_BUFFER_LENGTH};

const MAGIC: [u8; 4] = *b"TLOG";
const VERSION: u32 = 1;
// Tail counter and length fields live in the file as native-endian atomics,
// so a segment is only shared between processes of the same endianness.
// 1 = little-endian, 2 = big-endian.
#[cfg(target_endian = "little")]
const HOST_ENDIANNESS: u8 = 1;
#[cfg(target_endian = "big")]
const HOST_ENDIANNESS: u8 = 2;
const FILE_HEADER_LENGTH: usize = 4096;

const STATE_REGION_OFFSET: usize = FILE_HEADER_LENGTH;
const LOG_REGION_OFFSET: usize = FILE_HEADER_LENGTH + STATE_BUFFER_LENGTH;

#[derive(Clone, Copy, Debug)]
pub struct SegmentOptions {
    pub term_length: usize,
}

impl SegmentOptions {
    pub fn new(term_length: usize) -> Self {
        Self { term_length }
    }
}

/// A file-backed segment: file header, metadata region, then the log buffer.
///
/// Producers in separate processes map the same file and drive a
/// [`TermAppender`](crate::appender::TermAppender) over the views this hands
/// out; the views stay valid while the `Segment` lives.
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    _file: File,
    mmap: MmapMut,
    term_length: usize,
}

impl Segment {
    pub fn create(path: impl AsRef<Path>, options: SegmentOptions) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        check_term_buffer(options.term_length)?;

        let file_size = (LOG_REGION_OFFSET + options.term_length) as u64;
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| io_error(&path, err))?;

        file.set_len(file_size)
            .map_err(|err| io_error(&path, err))?;
        write_header(&mut file, options.term_length, &path)?;

        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|err| io_error(&path, err))? };

        debug!(path = %path.display(), term_length = options.term_length, "created segment");
        Ok(Self {
            path,
            _file: file,
            mmap,
            term_length: options.term_length,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| io_error(&path, err))?;

        let actual_size = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| io_error(&path, err))?;

        let term_length = read_header(&mut file, &path)?;
        let expected_size = (LOG_REGION_OFFSET + term_length) as u64;
        if expected_size != actual_size {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_path(&path)
                .with_message(format!(
                    "file is {actual_size} bytes but the header implies {expected_size}"
                )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|err| io_error(&path, err))? };

        debug!(path = %path.display(), term_length, "opened segment");
        Ok(Self {
            path,
            _file: file,
            mmap,
            term_length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// View over the log buffer region.
    pub fn log_buffer(&self) -> AtomicBuffer {
        self.view(LOG_REGION_OFFSET, self.term_length)
    }

    /// View over the metadata (state) region holding the tail counter.
    pub fn state_buffer(&self) -> AtomicBuffer {
        self.view(STATE_REGION_OFFSET, STATE_BUFFER_LENGTH)
    }

    fn view(&self, offset: usize, len: usize) -> AtomicBuffer {
        debug_assert!(offset + len <= self.mmap.len());
        // The mapping is shared mutable memory; writes land through the
        // AtomicBuffer accessors, not through the mmap's slice impls.
        let ptr = unsafe { self.mmap.as_ptr().add(offset).cast_mut() };
        unsafe { AtomicBuffer::wrap(NonNull::new_unchecked(ptr), len) }
    }
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::new(io_error_kind(&err)).with_path(path).with_source(err)
}

fn io_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

fn write_header(file: &mut File, term_length: usize, path: &Path) -> Result<(), Error> {
    let mut buf = [0u8; FILE_HEADER_LENGTH];
    buf[0..4].copy_from_slice(&MAGIC);
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf[8] = HOST_ENDIANNESS;
    buf[16..24].copy_from_slice(&(term_length as u64).to_le_bytes());

    file.seek(SeekFrom::Start(0))
        .map_err(|err| io_error(path, err))?;
    file.write_all(&buf).map_err(|err| io_error(path, err))?;
    file.flush().map_err(|err| io_error(path, err))?;
    Ok(())
}

fn read_header(file: &mut File, path: &Path) -> Result<usize, Error> {
    let mut buf = [0u8; FILE_HEADER_LENGTH];
    file.seek(SeekFrom::Start(0))
        .map_err(|err| io_error(path, err))?;
    file.read_exact(&mut buf)
        .map_err(|err| io_error(path, err))?;

    if buf[0..4] != MAGIC {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_path(path)
            .with_message("bad magic"));
    }
    let version = u32::from_le_bytes(buf[4..8].try_into().expect("4 bytes"));
    if version != VERSION {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_path(path)
            .with_message("unsupported version"));
    }
    if buf[8] != HOST_ENDIANNESS {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_path(path)
            .with_message("endianness mismatch"));
    }

    let term_length = u64::from_le_bytes(buf[16..24].try_into().expect("8 bytes")) as usize;
    check_term_buffer(term_length)
        .map_err(|_| Error::new(ErrorKind::Corrupt).with_path(path).with_message(
            "header declares an invalid term length",
        ))?;
    Ok(term_length)
}
