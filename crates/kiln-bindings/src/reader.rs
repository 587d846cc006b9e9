//! Byte readers and zip archives
//!
//! `StringReader` and `FileReader` share one set of stream methods.
//! `ZipReader` accepts either kind; it opens its own view of the bytes, so
//! the source reader keeps its position and can be released independently.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_sdk::{BridgeError, BridgeResult, ScriptContext, ScriptString, ScriptValue};
use tracing::debug;

use crate::adapter::native_error;
use crate::args::{arg, check_bytes, check_integer, check_str, check_usize};
use crate::dispatch::DispatchTable;
use crate::handle::{allocate, Slot};
use crate::namespace::Namespace;
use crate::registry::{check_any, check_handle};

/// Tag carried by in-memory readers
pub const STRING_READER_TAG: &str = "kiln.StringReader";
/// Tag carried by file readers
pub const FILE_READER_TAG: &str = "kiln.FileReader";
/// Tag carried by zip readers
pub const ZIP_READER_TAG: &str = "kiln.ZipReader";

/// Seekable byte source
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Reader exposed to scripts
pub trait ByteStream: Read + Seek + 'static {
    /// Total length in bytes
    fn size(&self) -> io::Result<u64>;

    /// Independent view of the same bytes, positioned at the start
    fn source(&self) -> io::Result<Box<dyn ReadSeek>>;
}

/// Reader over an in-memory byte string
#[derive(Debug, Clone)]
pub struct StringReader {
    cursor: Cursor<Vec<u8>>,
}

impl StringReader {
    /// Reader over `bytes`
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }
}

impl Read for StringReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for StringReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl ByteStream for StringReader {
    fn size(&self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn source(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(self.cursor.get_ref().clone())))
    }
}

/// Reader over a file on disk
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    file: File,
}

impl FileReader {
    /// Open `path` for reading
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: File::open(path)?,
        })
    }

    /// Path the reader was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ByteStream for FileReader {
    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn source(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// Most bytes reserved up front for a read of caller- or archive-declared
/// length
const MAX_RESERVE: usize = 64 * 1024;

/// Buffer for `declared` bytes, reserving at most [`MAX_RESERVE`]
fn reserve_for(declared: u64) -> Vec<u8> {
    Vec::with_capacity(usize::try_from(declared).map_or(MAX_RESERVE, |n| n.min(MAX_RESERVE)))
}

fn read_up_to<S: Read>(stream: &mut S, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = reserve_for(n as u64);
    stream.by_ref().take(n as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_byte<S: Read>(stream: &mut S) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match stream.read(&mut byte)? {
        0 => Ok(None),
        _ => Ok(Some(byte[0])),
    }
}

fn has_more<S: ByteStream>(stream: &mut S) -> io::Result<bool> {
    Ok(stream.stream_position()? < stream.size()?)
}

fn position(n: u64) -> ScriptValue {
    ScriptValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Dispatch table with the stream methods shared by every reader
pub fn stream_table<T: ByteStream>(tag: &str) -> BridgeResult<Arc<DispatchTable<T>>> {
    DispatchTable::<T>::builder(tag)
        .method("read", |_ctx, handle, args| {
            let n = check_usize(args, 0, "read")?;
            let bytes = handle.with_mut(|s| read_up_to(s, n))?.map_err(native_error)?;
            Ok(ScriptString::from(bytes).into())
        })
        .method("readByte", |_ctx, handle, _args| {
            let byte = handle.with_mut(read_byte)?.map_err(native_error)?;
            Ok(byte.map(u32::from).into())
        })
        .method("seek", |_ctx, handle, args| {
            let pos = check_integer(args, 0, "seek")?;
            let pos = u64::try_from(pos)
                .map_err(|_| BridgeError::Argument(format!("negative seek position {}", pos)))?;
            let at = handle
                .with_mut(|s| s.seek(SeekFrom::Start(pos)))?
                .map_err(native_error)?;
            Ok(position(at))
        })
        .method("tell", |_ctx, handle, _args| {
            let at = handle.with_mut(|s| s.stream_position())?.map_err(native_error)?;
            Ok(position(at))
        })
        .method("size", |_ctx, handle, _args| {
            let size = handle.with(|s| s.size())?.map_err(native_error)?;
            Ok(position(size))
        })
        .method("hasMore", |_ctx, handle, _args| {
            let more = handle.with_mut(has_more)?.map_err(native_error)?;
            Ok(more.into())
        })
        .build()
}

// ============================================================================
// Zip archives
// ============================================================================

/// Archive entry as listed by [`ZipReader::entries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Entry name inside the archive
    pub name: String,
    /// Offset of the entry's local header
    pub offset: u64,
}

/// Zip archive read from a [`ByteStream`] source
pub struct ZipReader {
    archive: zip::ZipArchive<Box<dyn ReadSeek>>,
    entries: Vec<ZipEntry>,
}

impl std::fmt::Debug for ZipReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipReader")
            .field("entries", &self.entries)
            .finish()
    }
}

impl ZipReader {
    /// Parse the central directory of `source`
    pub fn new(source: Box<dyn ReadSeek>) -> BridgeResult<Self> {
        let mut archive = zip::ZipArchive::new(source).map_err(native_error)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).map_err(native_error)?;
            entries.push(ZipEntry {
                name: entry.name().to_owned(),
                offset: entry.header_start(),
            });
        }
        debug!(entries = entries.len(), "opened zip archive");
        Ok(Self { archive, entries })
    }

    /// Entries in central directory order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Decompressed contents of the entry whose header starts at `offset`
    pub fn contents(&mut self, offset: u64) -> BridgeResult<Vec<u8>> {
        let index = self
            .entries
            .iter()
            .position(|e| e.offset == offset)
            .ok_or_else(|| BridgeError::Argument(format!("no archive entry at offset {}", offset)))?;
        let mut entry = self.archive.by_index(index).map_err(native_error)?;
        let mut buf = reserve_for(entry.size());
        entry.read_to_end(&mut buf).map_err(native_error)?;
        Ok(buf)
    }
}

fn zip_table() -> BridgeResult<Arc<DispatchTable<ZipReader>>> {
    DispatchTable::<ZipReader>::builder(ZIP_READER_TAG)
        .method("getFileList", |ctx, handle, _args| {
            let entries = handle.with(|z| z.entries().to_vec())?;
            let list = ctx.create_table();
            for (i, entry) in entries.into_iter().enumerate() {
                let item = ctx.create_table();
                ctx.raw_set(&item, "name".into(), entry.name.into())?;
                ctx.raw_set(&item, "offset".into(), position(entry.offset))?;
                ctx.raw_set(&list, ScriptValue::Integer(i as i64 + 1), item)?;
            }
            Ok(list)
        })
        .method("getFileContents", |_ctx, handle, args| {
            let offset = check_integer(args, 0, "getFileContents")?;
            let offset = u64::try_from(offset)
                .map_err(|_| BridgeError::Argument(format!("negative offset {}", offset)))?;
            let bytes = handle.with_mut(|z| z.contents(offset))??;
            Ok(ScriptString::from(bytes).into())
        })
        .build()
}

fn zip_source(
    ctx: &dyn ScriptContext,
    value: &ScriptValue,
    strings: &DispatchTable<StringReader>,
    files: &DispatchTable<FileReader>,
) -> BridgeResult<Box<dyn ReadSeek>> {
    let tag = check_any(ctx, value, &[strings.tag(), files.tag()])?;
    let source = if &tag == strings.tag() {
        check_handle::<StringReader>(ctx, value)?.with(|r| r.source())?
    } else {
        check_handle::<FileReader>(ctx, value)?.with(|r| r.source())?
    };
    source.map_err(native_error)
}

/// Add the reader constructors to `ns`
pub fn register(ns: Namespace) -> BridgeResult<Namespace> {
    let strings = stream_table::<StringReader>(STRING_READER_TAG)?;
    let files = stream_table::<FileReader>(FILE_READER_TAG)?;
    let zips = zip_table()?;

    let string_ctor = Arc::clone(&strings);
    let file_ctor = Arc::clone(&files);
    Ok(ns
        .function("StringReader", move |ctx, args| {
            let bytes = check_bytes(args, 0, "StringReader")?.to_vec();
            allocate(ctx, &string_ctor, Slot::owned(StringReader::new(bytes)))
        })
        .function("FileReader", move |ctx, args| {
            let path = check_str(args, 0, "FileReader")?;
            let reader = FileReader::open(Path::new(path)).map_err(|e| {
                BridgeError::NativeOperation(format!("cannot open '{}': {}", path, e))
            })?;
            allocate(ctx, &file_ctor, Slot::owned(reader))
        })
        .function("ZipReader", move |ctx, args| {
            let source = zip_source(ctx, arg(args, 0), &strings, &files)?;
            let reader = ZipReader::new(source)?;
            allocate(ctx, &zips, Slot::owned(reader))
        }))
}
