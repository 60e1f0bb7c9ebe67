//! The bucket port: the narrow slice of an object-store API the adapter
//! depends on.
//!
//! [`gcs::GcsBucket`] talks to Google Cloud Storage over its JSON API;
//! [`memory::MemoryBucket`] keeps objects in process and stands in for the
//! remote store in tests.

pub mod auth;
pub mod gcs;
pub mod memory;
pub mod naming;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreResult;
use crate::models::{ContentStream, Visibility};

/// The store's ACL shortcuts applied on write or by make-public/private.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredefinedAcl {
    PublicRead,
    Private,
}

impl PredefinedAcl {
    /// Value of the `predefinedAcl` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            PredefinedAcl::PublicRead => "publicRead",
            PredefinedAcl::Private => "private",
        }
    }
}

impl From<Visibility> for PredefinedAcl {
    fn from(visibility: Visibility) -> Self {
        match visibility {
            Visibility::Public => PredefinedAcl::PublicRead,
            Visibility::Private => PredefinedAcl::Private,
        }
    }
}

/// Object size as the store reports it. The JSON API sends a decimal string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum SizeField {
    Number(u64),
    Text(String),
}

impl SizeField {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SizeField::Number(n) => Some(*n),
            SizeField::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for SizeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeField::Number(n) => write!(f, "{}", n),
            SizeField::Text(text) => f.write_str(text),
        }
    }
}

/// Store-native object resource (subset of the JSON API `Object`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: String,
    #[serde(default)]
    pub bucket: String,
    pub size: SizeField,
    pub time_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
}

/// One object access-control entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AclEntry {
    pub entity: String,
    pub role: String,
}

impl AclEntry {
    pub const ALL_USERS: &'static str = "allUsers";
    pub const READER: &'static str = "READER";
    pub const OWNER: &'static str = "OWNER";

    pub fn new(entity: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            role: role.into(),
        }
    }

    /// True for the entry that makes an object world-readable.
    pub fn grants_public_read(&self) -> bool {
        self.entity == Self::ALL_USERS && self.role == Self::READER
    }
}

/// Operations on one bucket.
///
/// Every call is a fresh round trip; implementations hold no per-object
/// state. Missing objects are reported as
/// [`StoreError::ObjectNotFound`](crate::errors::StoreError::ObjectNotFound).
#[async_trait]
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    /// Create or replace the object at `path` in one request.
    async fn save(
        &self,
        path: &str,
        data: Bytes,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()>;

    /// Open a read channel. Not-found is reported here, before any content.
    async fn read_channel(&self, path: &str) -> StoreResult<ContentStream>;

    /// Pipe `data` into a new object. Resolves once the store has finalized
    /// the object; an error on `data` aborts the upload.
    async fn write_channel(
        &self,
        path: &str,
        data: ContentStream,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()>;

    async fn move_object(&self, from: &str, to: &str) -> StoreResult<()>;

    async fn copy_object(&self, from: &str, to: &str) -> StoreResult<()>;

    async fn delete_object(&self, path: &str) -> StoreResult<()>;

    async fn object_exists(&self, path: &str) -> StoreResult<bool>;

    async fn object_metadata(&self, path: &str) -> StoreResult<ObjectMetadata>;

    async fn object_acl(&self, path: &str) -> StoreResult<Vec<AclEntry>>;

    async fn make_public(&self, path: &str) -> StoreResult<()>;

    async fn make_private(&self, path: &str) -> StoreResult<()>;

    /// Delete every object whose name starts with `prefix`.
    async fn delete_files(&self, prefix: &str) -> StoreResult<()>;

    async fn exists(&self) -> StoreResult<bool>;

    async fn create(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_coerced_from_text() {
        assert_eq!(SizeField::Text("1024".into()).as_u64(), Some(1024));
        assert_eq!(SizeField::Number(7).as_u64(), Some(7));
        assert_eq!(SizeField::Text("lots".into()).as_u64(), None);
    }

    #[test]
    fn parses_json_api_object_resource() {
        let json = r#"{
            "kind": "storage#object",
            "name": "docs/a.txt",
            "bucket": "my-bucket",
            "size": "12",
            "timeCreated": "2025-03-01T10:00:00.000Z",
            "contentType": "text/plain",
            "md5Hash": "XUFAKrxLKna5cZ2REBfFkg==",
            "generation": "1740823200000000"
        }"#;
        let meta: ObjectMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.name, "docs/a.txt");
        assert_eq!(meta.size.as_u64(), Some(12));
        assert_eq!(meta.time_created.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn only_all_users_reader_is_public() {
        assert!(AclEntry::new("allUsers", "READER").grants_public_read());
        assert!(!AclEntry::new("allUsers", "OWNER").grants_public_read());
        assert!(!AclEntry::new("allAuthenticatedUsers", "READER").grants_public_read());
    }

    #[test]
    fn visibility_maps_to_predefined_acl() {
        assert_eq!(PredefinedAcl::from(Visibility::Public).as_str(), "publicRead");
        assert_eq!(PredefinedAcl::from(Visibility::Private).as_str(), "private");
    }
}
