use serde::{Deserialize, Serialize};

use super::metadata::Visibility;

/// Options for [`write`](crate::FilesystemAdapter::write) and
/// [`write_stream`](crate::FilesystemAdapter::write_stream).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// ACL applied at write time.
    pub visibility: Visibility,

    /// Encoding text is stored in. `None` stores UTF-8.
    pub encoding: Option<String>,
}

impl WriteOptions {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Options for [`read`](crate::FilesystemAdapter::read) and
/// [`read_stream`](crate::FilesystemAdapter::read_stream).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Decode stored bytes from this encoding. `None` returns raw bytes.
    pub encoding: Option<String>,
}

impl ReadOptions {
    pub fn raw() -> Self {
        Self { encoding: None }
    }

    pub fn text(encoding: impl Into<String>) -> Self {
        Self {
            encoding: Some(encoding.into()),
        }
    }
}
