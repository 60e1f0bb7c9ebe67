//! Error types shared by the adapter, the configuration layer and the
//! bucket port.

use std::io;

use thiserror::Error;

/// Raised synchronously while validating an [`AdapterConfig`](crate::config::AdapterConfig).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You must provide a 'bucket' to the GcsAdapter constructor")]
    MissingBucket,
    #[error("You must provide a 'projectId' to the GcsAdapter constructor")]
    MissingProjectId,
    #[error("You must provide a 'keyFilename', 'credentials' or 'key' to the GcsAdapter constructor")]
    MissingCredentials,
    #[error("Only one of 'keyFilename', 'credentials' or 'key' may be provided, got {}", .0.join(", "))]
    ConflictingCredentials(Vec<&'static str>),
}

/// Failures reported by a [`Bucket`](crate::store::Bucket) implementation.
///
/// These are surfaced to adapter callers unchanged; the adapter never
/// remaps a store error into a different kind.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{path}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, path: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object name `{name}`: {reason}")]
    InvalidObjectName { name: String, reason: String },
    #[error("remote request failed: HTTP {status} - {message}")]
    Http { status: u16, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything an adapter operation can fail with.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Unsupported Visibility: {0}")]
    UnsupportedVisibility(String),
    #[error("unknown text encoding `{0}`")]
    UnknownEncoding(String),
    #[error("character {character:?} cannot be encoded as {encoding}")]
    UnencodableText {
        encoding: &'static str,
        character: char,
    },
    #[error("input is not valid {encoding} text")]
    MalformedText { encoding: &'static str },
    #[error("object `{path}` reported an unreadable size `{raw}`")]
    InvalidSize { path: String, raw: String },
}

impl AdapterError {
    /// True when the underlying store reported that the object or bucket
    /// does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AdapterError::Store(StoreError::ObjectNotFound { .. })
                | AdapterError::Store(StoreError::BucketNotFound(_))
        )
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Lets transcoding stages fail a byte stream.
impl From<AdapterError> for io::Error {
    fn from(err: AdapterError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}
