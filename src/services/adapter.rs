//! The backend-agnostic filesystem contract every storage adapter fulfils.

use async_trait::async_trait;

use crate::errors::AdapterResult;
use crate::models::{ContentStream, Contents, File, Metadata, ReadOptions, StreamFile, Visibility, WriteOptions};

/// File operations over some storage backend.
///
/// Paths are slash-delimited names relative to the backend root. All
/// operations can fail asynchronously; none of them cache.
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    /// Short backend identifier, e.g. `"gcs"`.
    fn adapter_name(&self) -> &'static str;

    /// Version of this contract the adapter implements.
    fn target_version(&self) -> &'static str;

    /// Create or replace the file at `path`.
    async fn write(&self, path: &str, contents: Contents, options: &WriteOptions) -> AdapterResult<Metadata>;

    /// Create or replace the file at `path` from a byte stream.
    async fn write_stream(
        &self,
        path: &str,
        stream: ContentStream,
        options: &WriteOptions,
    ) -> AdapterResult<Metadata>;

    async fn move_file(&self, old_path: &str, new_path: &str) -> AdapterResult<Metadata>;

    async fn copy_file(&self, old_path: &str, new_path: &str) -> AdapterResult<Metadata>;

    async fn delete(&self, path: &str) -> AdapterResult<bool>;

    /// Remove everything under `path`.
    async fn delete_dir(&self, path: &str) -> AdapterResult<bool>;

    /// `None` when the backend has no directories to create.
    async fn create_dir(&self, path: &str) -> AdapterResult<Option<Metadata>>;

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> AdapterResult<Metadata>;

    async fn get_visibility(&self, path: &str) -> AdapterResult<Visibility>;

    async fn exists(&self, path: &str) -> AdapterResult<bool>;

    async fn read(&self, path: &str, options: &ReadOptions) -> AdapterResult<File>;

    async fn read_stream(&self, path: &str, options: &ReadOptions) -> AdapterResult<StreamFile>;

    async fn get_metadata(&self, path: &str) -> AdapterResult<Metadata>;
}
