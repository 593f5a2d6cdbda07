//! Inbound MIME attachments and their hand-off to the security library.
//!
//! [`IncomingAttachment`] is a uniform read-only view over one MIME part:
//! a lazily opened byte stream plus a case-sensitive header map. Two sources
//! exist, [`FileAttachment`] and [`MemoryAttachment`]; consumers only see the
//! difference through [`IncomingAttachment::file_path`], which feeds the
//! `Content-Disposition` header of the security representation.
//!
//! [`IncomingAttachment::to_security_attachment`] builds the structure the
//! external signing/encryption engine consumes. It is a pure mapping: every
//! call re-derives the headers and opens a fresh stream.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;

pub const HEADER_CONTENT_ID: &str = "Content-ID";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
pub const HEADER_CONTENT_DESCRIPTION: &str = "Content-Description";
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";

/// Fixed `Content-Description` value of every security attachment.
pub const SECURITY_CONTENT_DESCRIPTION: &str = "Attachment";

/// Owned byte stream over an attachment body. Not rewindable.
pub type AttachmentStream = Box<dyn Read + Send>;

// ---------------------------------------------------------------------------
// AttachmentHeaders
// ---------------------------------------------------------------------------

/// Header-like metadata of a MIME part. Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentHeaders {
    entries: BTreeMap<String, String>,
}

impl AttachmentHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttachmentHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// SecurityAttachment
// ---------------------------------------------------------------------------

/// Attachment representation consumed by the external security library.
pub struct SecurityAttachment {
    /// The raw Content-ID (not the `<attachment=...>` form).
    pub id: Option<String>,
    pub mime_type: Option<String>,
    /// Synthesized MIME headers.
    pub headers: BTreeMap<String, String>,
    pub stream: AttachmentStream,
}

impl SecurityAttachment {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Gives up the metadata and returns the body stream.
    #[must_use]
    pub fn into_stream(self) -> AttachmentStream {
        self.stream
    }
}

impl fmt::Debug for SecurityAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityAttachment")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// IncomingAttachment
// ---------------------------------------------------------------------------

/// Read-only view over one inbound MIME part.
pub trait IncomingAttachment: Send + Sync {
    fn headers(&self) -> &AttachmentHeaders;

    /// Opens the attachment body. Ownership of the stream passes to the caller;
    /// callers must not assume a second call yields a rewound stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the underlying source cannot be opened.
    fn open_stream(&self) -> io::Result<AttachmentStream>;

    /// Backing file, for file-backed attachments only.
    fn file_path(&self) -> Option<&Path> {
        None
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)
    }

    fn content_id(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_ID)
    }

    fn content_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
    }

    fn content_transfer_encoding(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TRANSFER_ENCODING)
    }

    /// Builds the representation required by the security library.
    ///
    /// Synthesizes `Content-Description: Attachment`, a `Content-Disposition`
    /// carrying the file name (file-backed attachments only), a
    /// `Content-ID` of the form `<attachment=CID>` and the unchanged
    /// `Content-Type`. A missing Content-ID or Content-Type omits its header.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the body stream cannot be opened.
    fn to_security_attachment(&self) -> io::Result<SecurityAttachment> {
        let mut headers = BTreeMap::new();
        headers.insert(
            HEADER_CONTENT_DESCRIPTION.to_string(),
            SECURITY_CONTENT_DESCRIPTION.to_string(),
        );
        if let Some(file_name) = self.file_path().and_then(Path::file_name) {
            headers.insert(
                HEADER_CONTENT_DISPOSITION.to_string(),
                format!("attachment; filename=\"{}\"", file_name.to_string_lossy()),
            );
        }
        if let Some(cid) = self.content_id() {
            headers.insert(HEADER_CONTENT_ID.to_string(), format!("<attachment={cid}>"));
        }
        if let Some(content_type) = self.content_type() {
            headers.insert(HEADER_CONTENT_TYPE.to_string(), content_type.to_string());
        }

        Ok(SecurityAttachment {
            id: self.content_id().map(str::to_string),
            mime_type: self.content_type().map(str::to_string),
            headers,
            stream: self.open_stream()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Attachment whose body was spooled to a file.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    path: PathBuf,
    headers: AttachmentHeaders,
}

impl FileAttachment {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, headers: AttachmentHeaders) -> Self {
        Self {
            path: path.into(),
            headers,
        }
    }
}

impl IncomingAttachment for FileAttachment {
    fn headers(&self) -> &AttachmentHeaders {
        &self.headers
    }

    fn open_stream(&self) -> io::Result<AttachmentStream> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn file_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Attachment whose body is held in memory.
#[derive(Debug, Clone)]
pub struct MemoryAttachment {
    body: Bytes,
    headers: AttachmentHeaders,
}

impl MemoryAttachment {
    #[must_use]
    pub fn new(body: impl Into<Bytes>, headers: AttachmentHeaders) -> Self {
        Self {
            body: body.into(),
            headers,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl IncomingAttachment for MemoryAttachment {
    fn headers(&self) -> &AttachmentHeaders {
        &self.headers
    }

    fn open_stream(&self) -> io::Result<AttachmentStream> {
        // Bytes clones share the buffer.
        Ok(Box::new(Cursor::new(self.body.clone())))
    }
}

// ---------------------------------------------------------------------------
// Security library boundary
// ---------------------------------------------------------------------------

/// External signing/encryption/verification engine.
///
/// The core only interprets the outcome as pass (`Ok`) or fail (`Err`).
pub trait SecurityProcessor: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the security operation failed.
    fn process(&self, attachments: Vec<SecurityAttachment>) -> anyhow::Result<()>;
}

/// Converts every attachment and hands the batch to the security processor.
///
/// # Errors
///
/// Returns an error if an attachment stream cannot be opened or the
/// processor reports failure.
pub fn secure_attachments(
    processor: &dyn SecurityProcessor,
    attachments: &[&dyn IncomingAttachment],
) -> anyhow::Result<()> {
    let converted = attachments
        .iter()
        .map(|a| a.to_security_attachment())
        .collect::<io::Result<Vec<_>>>()?;
    tracing::debug!(count = converted.len(), "handing attachments to security processor");
    processor.process(converted)
}
