//! A filesystem-style adapter over a Google Cloud Storage bucket.
//!
//! [`GcsAdapter`] implements [`FilesystemAdapter`] on top of the [`Bucket`]
//! port. [`GcsBucket`] speaks the Cloud Storage JSON API over `reqwest`;
//! [`MemoryBucket`] keeps objects in memory for tests.
//!
//! ```no_run
//! use gofer_gcs::{AdapterConfig, FilesystemAdapter, GcsAdapter, ReadOptions, WriteOptions};
//!
//! # async fn demo() -> Result<(), gofer_gcs::AdapterError> {
//! let adapter = GcsAdapter::new(AdapterConfig {
//!     project_id: "my-project".into(),
//!     bucket: "my-bucket".into(),
//!     key_filename: Some("keyfile.json".into()),
//!     ..Default::default()
//! })?;
//! adapter.write("hello.txt", "hi".into(), &WriteOptions::default()).await?;
//! let file = adapter.read("hello.txt", &ReadOptions::text("utf8")).await?;
//! assert_eq!(file.contents.as_text(), Some("hi"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod encoding;
pub mod errors;
pub mod models;
pub mod paths;
pub mod services;
pub mod store;

pub use config::{AdapterConfig, ConnectionArgs, Credentials, GcsSettings};
pub use encoding::TextEncoding;
pub use errors::{AdapterError, AdapterResult, ConfigError, StoreError, StoreResult};
pub use models::{
    ContentStream, Contents, File, Metadata, ReadOptions, StreamFile, Visibility, WriteOptions,
};
pub use services::{FilesystemAdapter, GcsAdapter};
pub use store::gcs::{GcsBucket, GcsClient};
pub use store::memory::MemoryBucket;
pub use store::{AclEntry, Bucket, ObjectMetadata, PredefinedAcl};
