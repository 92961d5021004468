//! Converter input: uniform access to a path or an already-open stream.
//!
//! ## Why two variants?
//!
//! Callers either hand us a path (we own opening and closing the file) or a
//! stream they already hold (an in-memory buffer, a socket they buffered,
//! stdin). [`ConverterInput`] keeps that distinction explicit:
//!
//! * **path-backed** — every [`ConverterInput::open`] opens the file anew,
//!   so each handle is independent and starts at offset 0;
//! * **object-backed** — [`ConverterInput::open`] lends out the caller's own
//!   handle verbatim. It is *not* rewound: a consumer that already read from
//!   it must seek back itself.
//!
//! Construction from a textual kind validates the kind eagerly.

use crate::error::Doc2MdError;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Any readable, seekable byte source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Run `f` on `stream` and put the read position back where it was.
///
/// The position is restored whatever `f` returns; only a failure to read
/// or restore the position itself is reported.
pub fn restore_position<S, T>(stream: &mut S, f: impl FnOnce(&mut S) -> T) -> io::Result<T>
where
    S: Seek + ?Sized,
{
    let pos = stream.stream_position()?;
    let out = f(stream);
    stream.seek(SeekFrom::Start(pos))?;
    Ok(out)
}

/// The two recognised input kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `"filepath"` — a path opened on demand.
    FilePath,
    /// `"object"` — a caller-owned stream handle.
    Object,
}

impl FromStr for InputKind {
    type Err = Doc2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filepath" => Ok(InputKind::FilePath),
            "object" => Ok(InputKind::Object),
            other => Err(Doc2MdError::InvalidInputKind {
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::FilePath => f.write_str("filepath"),
            InputKind::Object => f.write_str("object"),
        }
    }
}

/// A document to convert: a path or an open stream.
pub enum ConverterInput {
    /// Opened from disk on every [`ConverterInput::open`].
    Path(PathBuf),
    /// Borrowed out as-is on every [`ConverterInput::open`].
    Object(Box<dyn ReadSeek + Send>),
}

impl fmt::Debug for ConverterInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConverterInput::Path(p) => f.debug_tuple("Path").field(p).finish(),
            ConverterInput::Object(_) => f.debug_tuple("Object").field(&"<dyn ReadSeek>").finish(),
        }
    }
}

impl ConverterInput {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ConverterInput::Path(path.into())
    }

    pub fn from_reader(reader: impl Read + Seek + Send + 'static) -> Self {
        ConverterInput::Object(Box::new(reader))
    }

    /// Build an input from a textual kind plus the payload for that kind.
    ///
    /// Fails with [`Doc2MdError::InvalidInputKind`] for any kind other than
    /// `"filepath"` or `"object"`, and with
    /// [`Doc2MdError::MissingInputSource`] when the payload for a valid
    /// kind is absent.
    pub fn new(
        kind: &str,
        path: Option<PathBuf>,
        object: Option<Box<dyn ReadSeek + Send>>,
    ) -> Result<Self, Doc2MdError> {
        match kind.parse::<InputKind>()? {
            InputKind::FilePath => path.map(ConverterInput::Path).ok_or_else(|| {
                Doc2MdError::MissingInputSource {
                    kind: InputKind::FilePath.to_string(),
                }
            }),
            InputKind::Object => object.map(ConverterInput::Object).ok_or_else(|| {
                Doc2MdError::MissingInputSource {
                    kind: InputKind::Object.to_string(),
                }
            }),
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            ConverterInput::Path(_) => InputKind::FilePath,
            ConverterInput::Object(_) => InputKind::Object,
        }
    }

    /// The backing path, for path-backed inputs.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConverterInput::Path(p) => Some(p.as_path()),
            ConverterInput::Object(_) => None,
        }
    }

    /// Get a readable handle.
    ///
    /// Path-backed: a fresh file handle positioned at 0. Object-backed: the
    /// caller's handle at whatever position it currently has.
    pub fn open(&mut self) -> Result<InputHandle<'_>, Doc2MdError> {
        match self {
            ConverterInput::Path(path) => {
                debug!("Opening input file {}", path.display());
                Ok(InputHandle::File(BufReader::new(open_file(path)?)))
            }
            ConverterInput::Object(reader) => Ok(InputHandle::Borrowed(reader.as_mut())),
        }
    }

    /// Read the remaining content as text decoded with `charset`.
    ///
    /// Unknown or absent charsets fall back to BOM detection, then UTF-8,
    /// then windows-1252.
    pub fn read_text(&mut self, charset: Option<&str>) -> Result<String, Doc2MdError> {
        let mut handle = self.open()?;
        let mut bytes = Vec::new();
        handle.read_to_end(&mut bytes)?;
        Ok(crate::pipeline::charset::decode_text(&bytes, charset).0)
    }
}

/// A readable handle produced by [`ConverterInput::open`].
pub enum InputHandle<'a> {
    File(BufReader<File>),
    Borrowed(&'a mut (dyn ReadSeek + Send)),
}

impl Read for InputHandle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputHandle::File(f) => f.read(buf),
            InputHandle::Borrowed(r) => r.read(buf),
        }
    }
}

impl Seek for InputHandle<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            InputHandle::File(f) => f.seek(pos),
            InputHandle::Borrowed(r) => r.seek(pos),
        }
    }
}

/// Open `path` for reading, mapping the common failures to typed errors.
pub(crate) fn open_file(path: &Path) -> Result<File, Doc2MdError> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Doc2MdError::FileNotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => Doc2MdError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Doc2MdError::Io(e),
    })
}
