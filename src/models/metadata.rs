//! Describes a stored object as a file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::AdapterError;
use crate::paths;

/// Who may read an object.
///
/// Nothing stores this flag. It is derived from the object's ACL on every
/// read, and turned into an ACL shortcut on every write.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("public") {
            Ok(Visibility::Public)
        } else if value.eq_ignore_ascii_case("private") {
            Ok(Visibility::Private)
        } else {
            Err(AdapterError::UnsupportedVisibility(value.to_string()))
        }
    }
}

/// A stored object, described as a file.
///
/// Built fresh from the store on every call; never cached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Full object name within the bucket.
    pub path: String,

    /// Last path segment (`img.jpg`).
    pub name: String,

    /// Extension with its dot (`.jpg`), or empty.
    pub ext: String,

    /// Prefix the object lives under, `.` at the top level.
    pub parent_dir: String,

    /// Size in bytes.
    pub size: u64,

    /// Always true: every entry this adapter returns is an object.
    pub is_file: bool,

    /// Always false: the store has no directory primitive.
    pub is_dir: bool,

    /// When the object was created.
    pub timestamp: DateTime<Utc>,

    pub visibility: Visibility,

    /// Guessed from the name, not read from the store.
    pub mimetype: String,
}

impl Metadata {
    /// Describe the object at `path`. Name parts and MIME type come from the
    /// path text alone.
    pub fn for_object(
        path: &str,
        size: u64,
        timestamp: DateTime<Utc>,
        visibility: Visibility,
    ) -> Self {
        Self {
            path: path.to_string(),
            name: paths::basename(path).to_string(),
            ext: paths::extname(path).to_string(),
            parent_dir: paths::dirname(path).to_string(),
            size,
            is_file: true,
            is_dir: false,
            timestamp,
            visibility,
            mimetype: paths::mimetype(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_parts_and_mimetype() {
        let meta = Metadata::for_object("docs/2025/report.pdf", 42, Utc::now(), Visibility::Private);
        assert_eq!(meta.name, "report.pdf");
        assert_eq!(meta.ext, ".pdf");
        assert_eq!(meta.parent_dir, "docs/2025");
        assert_eq!(meta.mimetype, "application/pdf");
        assert!(meta.is_file);
        assert!(!meta.is_dir);
    }

    #[test]
    fn unknown_extensions_fall_back_to_octet_stream() {
        let meta = Metadata::for_object("blob", 0, Utc::now(), Visibility::Public);
        assert_eq!(meta.mimetype, "application/octet-stream");
        assert_eq!(meta.parent_dir, ".");
    }

    #[test]
    fn visibility_parses_case_insensitively() {
        assert_eq!("PUBLIC".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!("private".parse::<Visibility>().unwrap(), Visibility::Private);
        let err = "shared".parse::<Visibility>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported Visibility: shared");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let meta = Metadata::for_object("a/b.txt", 3, Utc::now(), Visibility::Public);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["parentDir"], "a");
        assert_eq!(json["isFile"], true);
        assert_eq!(json["visibility"], "public");
    }
}
