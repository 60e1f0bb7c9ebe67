//! Content wrappers returned by reads.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::{fmt, io};

use super::metadata::Metadata;

/// A live byte channel. Dropping it releases the underlying connection.
pub type ContentStream = BoxStream<'static, io::Result<Bytes>>;

/// Fully buffered object content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Contents {
    /// Decoded text, produced when a read requested an encoding.
    Text(String),
    /// Raw stored bytes.
    Binary(Bytes),
}

impl Contents {
    pub fn len(&self) -> usize {
        match self {
            Contents::Text(text) => text.len(),
            Contents::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text as UTF-8 bytes, binary as-is.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Contents::Text(text) => Bytes::from(text),
            Contents::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Contents::Text(text) => Some(text),
            Contents::Binary(_) => None,
        }
    }
}

impl From<String> for Contents {
    fn from(text: String) -> Self {
        Contents::Text(text)
    }
}

impl From<&str> for Contents {
    fn from(text: &str) -> Self {
        Contents::Text(text.to_string())
    }
}

impl From<Bytes> for Contents {
    fn from(bytes: Bytes) -> Self {
        Contents::Binary(bytes)
    }
}

impl From<Vec<u8>> for Contents {
    fn from(bytes: Vec<u8>) -> Self {
        Contents::Binary(Bytes::from(bytes))
    }
}

/// Metadata plus buffered content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct File {
    pub metadata: Metadata,
    pub contents: Contents,
}

/// Metadata plus an undrained content channel. Read errors that arrive after
/// this value is returned surface as `Err` items on `stream`.
pub struct StreamFile {
    pub metadata: Metadata,
    pub stream: ContentStream,
}

impl fmt::Debug for StreamFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamFile")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
