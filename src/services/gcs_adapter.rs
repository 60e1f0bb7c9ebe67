//! Cloud Storage implementation of [`FilesystemAdapter`].
//!
//! Every operation maps onto one or two [`Bucket`] calls. Nothing is cached:
//! metadata and visibility are rebuilt from the store each time they are
//! asked for.

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::AdapterConfig;
use crate::encoding::{StreamDecoder, TextEncoding, decode_stream, recode_stream};
use crate::errors::{AdapterError, AdapterResult, StoreError};
use crate::models::{
    ContentStream, Contents, File, Metadata, ReadOptions, StreamFile, Visibility, WriteOptions,
};
use crate::paths;
use crate::services::adapter::FilesystemAdapter;
use crate::store::gcs::{GcsBucket, GcsClient};
use crate::store::{AclEntry, Bucket, ObjectMetadata, PredefinedAcl};

pub const ADAPTER_NAME: &str = "gcs";
pub const TARGET_VERSION: &str = "1.0";

/// Filesystem view over one bucket.
pub struct GcsAdapter<B = GcsBucket> {
    bucket: B,
}

impl GcsAdapter<GcsBucket> {
    /// Validate `config` and build the HTTP client. No request is sent; a
    /// key file is only read when the first token is needed.
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        let settings = config.validate()?;
        let client = GcsClient::new(&settings)?;
        info!(
            project = %settings.project_id,
            bucket = %settings.bucket,
            endpoint = client.endpoint(),
            "gcs adapter configured"
        );
        Ok(Self {
            bucket: client.bucket(&settings.bucket),
        })
    }
}

impl<B: Bucket> GcsAdapter<B> {
    pub fn from_bucket(bucket: B) -> Self {
        Self { bucket }
    }

    pub fn bucket(&self) -> &B {
        &self.bucket
    }

    /// Create the bucket if it does not exist yet. Returns `true` when this
    /// call created it.
    pub async fn ensure_bucket(&self) -> AdapterResult<bool> {
        if self.bucket.exists().await? {
            debug!(bucket = self.bucket.name(), "bucket already present");
            return Ok(false);
        }
        match self.bucket.create().await {
            Ok(()) => {
                info!(bucket = self.bucket.name(), "created bucket");
                Ok(true)
            }
            Err(StoreError::BucketAlreadyExists(_)) => {
                debug!(bucket = self.bucket.name(), "bucket created concurrently");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// [`set_visibility`](FilesystemAdapter::set_visibility) from a raw
    /// string. The value is parsed before anything is sent.
    pub async fn set_visibility_named(&self, path: &str, visibility: &str) -> AdapterResult<Metadata> {
        let visibility: Visibility = visibility.parse()?;
        self.set_visibility(path, visibility).await
    }

    async fn read_contents(&self, path: &str, encoding: Option<TextEncoding>) -> AdapterResult<Contents> {
        let mut channel = self.bucket.read_channel(path).await?;

        match encoding {
            Some(encoding) => {
                let mut decoder = StreamDecoder::new(encoding);
                let mut text = String::new();
                while let Some(chunk) = channel.next().await {
                    let chunk = chunk.map_err(StoreError::from)?;
                    text.push_str(&decoder.decode_chunk(&chunk, false));
                }
                text.push_str(&decoder.decode_chunk(&[], true));
                Ok(Contents::Text(text))
            }
            None => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = channel.next().await {
                    buf.extend_from_slice(&chunk.map_err(StoreError::from)?);
                }
                Ok(Contents::Binary(buf.freeze()))
            }
        }
    }
}

fn visibility_from_acl(acl: &[AclEntry]) -> Visibility {
    if acl.iter().any(AclEntry::grants_public_read) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn metadata_from(native: ObjectMetadata, acl: &[AclEntry]) -> AdapterResult<Metadata> {
    let size = native.size.as_u64().ok_or_else(|| AdapterError::InvalidSize {
        path: native.name.clone(),
        raw: native.size.to_string(),
    })?;
    Ok(Metadata::for_object(
        &native.name,
        size,
        native.time_created,
        visibility_from_acl(acl),
    ))
}

fn requested_encoding(label: Option<&str>) -> AdapterResult<Option<TextEncoding>> {
    label.map(TextEncoding::for_label).transpose()
}

#[async_trait]
impl<B: Bucket> FilesystemAdapter for GcsAdapter<B> {
    fn adapter_name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn target_version(&self) -> &'static str {
        TARGET_VERSION
    }

    async fn write(&self, path: &str, contents: Contents, options: &WriteOptions) -> AdapterResult<Metadata> {
        let data = match contents {
            Contents::Text(text) => TextEncoding::for_option(options.encoding.as_deref())?.encode(&text)?,
            Contents::Binary(bytes) => bytes,
        };
        let content_type = paths::mimetype(path);

        debug!(path = %path, size = data.len(), visibility = %options.visibility, "write");
        self.bucket
            .save(path, data, PredefinedAcl::from(options.visibility), Some(content_type.as_str()))
            .await?;
        self.get_metadata(path).await
    }

    async fn write_stream(
        &self,
        path: &str,
        stream: ContentStream,
        options: &WriteOptions,
    ) -> AdapterResult<Metadata> {
        let stream = match requested_encoding(options.encoding.as_deref())? {
            Some(encoding) => recode_stream(stream, encoding),
            None => stream,
        };
        let content_type = paths::mimetype(path);

        debug!(path = %path, visibility = %options.visibility, "write stream");
        self.bucket
            .write_channel(path, stream, PredefinedAcl::from(options.visibility), Some(content_type.as_str()))
            .await?;
        self.get_metadata(path).await
    }

    async fn move_file(&self, old_path: &str, new_path: &str) -> AdapterResult<Metadata> {
        debug!(from = %old_path, to = %new_path, "move");
        self.bucket.move_object(old_path, new_path).await?;
        self.get_metadata(new_path).await
    }

    async fn copy_file(&self, old_path: &str, new_path: &str) -> AdapterResult<Metadata> {
        debug!(from = %old_path, to = %new_path, "copy");
        self.bucket.copy_object(old_path, new_path).await?;
        self.get_metadata(new_path).await
    }

    async fn delete(&self, path: &str) -> AdapterResult<bool> {
        debug!(path = %path, "delete");
        self.bucket.delete_object(path).await?;
        Ok(true)
    }

    async fn delete_dir(&self, path: &str) -> AdapterResult<bool> {
        debug!(prefix = %path, "delete dir");
        self.bucket.delete_files(path).await?;
        Ok(true)
    }

    async fn create_dir(&self, path: &str) -> AdapterResult<Option<Metadata>> {
        debug!(path = %path, "create dir is a no-op on object storage");
        Ok(None)
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> AdapterResult<Metadata> {
        debug!(path = %path, visibility = %visibility, "set visibility");
        match visibility {
            Visibility::Public => self.bucket.make_public(path).await?,
            Visibility::Private => self.bucket.make_private(path).await?,
        }
        self.get_metadata(path).await
    }

    async fn get_visibility(&self, path: &str) -> AdapterResult<Visibility> {
        Ok(self.get_metadata(path).await?.visibility)
    }

    async fn exists(&self, path: &str) -> AdapterResult<bool> {
        Ok(self.bucket.object_exists(path).await?)
    }

    async fn read(&self, path: &str, options: &ReadOptions) -> AdapterResult<File> {
        let encoding = requested_encoding(options.encoding.as_deref())?;
        let (contents, metadata) =
            tokio::try_join!(self.read_contents(path, encoding), self.get_metadata(path))?;
        Ok(File { metadata, contents })
    }

    async fn read_stream(&self, path: &str, options: &ReadOptions) -> AdapterResult<StreamFile> {
        let encoding = requested_encoding(options.encoding.as_deref())?;
        let (channel, metadata) = tokio::try_join!(
            async { self.bucket.read_channel(path).await.map_err(AdapterError::from) },
            self.get_metadata(path)
        )?;
        let stream = match encoding {
            Some(encoding) => decode_stream(channel, encoding),
            None => channel,
        };
        Ok(StreamFile { metadata, stream })
    }

    async fn get_metadata(&self, path: &str) -> AdapterResult<Metadata> {
        let (native, acl) =
            tokio::try_join!(self.bucket.object_metadata(path), self.bucket.object_acl(path))?;
        metadata_from(native, &acl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SizeField;
    use crate::store::memory::MemoryBucket;
    use bytes::Bytes;
    use chrono::Utc;
    use futures::{TryStreamExt, stream};
    use std::io;

    fn adapter() -> GcsAdapter<MemoryBucket> {
        GcsAdapter::from_bucket(MemoryBucket::new("media"))
    }

    fn native(size: SizeField) -> ObjectMetadata {
        ObjectMetadata {
            name: "docs/a.txt".into(),
            bucket: "media".into(),
            size,
            time_created: Utc::now(),
            content_type: None,
            md5_hash: None,
            generation: None,
        }
    }

    #[test]
    fn size_is_coerced_from_text() {
        let meta = metadata_from(native(SizeField::Text("12".into())), &[]).unwrap();
        assert_eq!(meta.size, 12);
        assert_eq!(meta.visibility, Visibility::Private);
    }

    #[test]
    fn unparsable_size_is_an_error() {
        let err = metadata_from(native(SizeField::Text("lots".into())), &[]).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidSize { ref raw, .. } if raw == "lots"));
    }

    #[test]
    fn all_users_reader_means_public() {
        let acl = vec![
            AclEntry::new("user-owner", AclEntry::OWNER),
            AclEntry::new(AclEntry::ALL_USERS, AclEntry::READER),
        ];
        assert_eq!(visibility_from_acl(&acl), Visibility::Public);
        assert_eq!(visibility_from_acl(&acl[..1]), Visibility::Private);
    }

    #[tokio::test]
    async fn write_then_read_text() {
        let fs = adapter();
        let meta = fs
            .write("notes/hello.txt", "hi there".into(), &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(meta.size, 8);
        assert_eq!(meta.visibility, Visibility::Public);
        assert_eq!(meta.mimetype, "text/plain");

        let file = fs.read("notes/hello.txt", &ReadOptions::text("utf8")).await.unwrap();
        assert_eq!(file.contents.as_text(), Some("hi there"));
        assert_eq!(file.metadata, meta);
    }

    #[tokio::test]
    async fn text_is_stored_in_the_requested_encoding() {
        let fs = adapter();
        let opts = WriteOptions::new(Visibility::Private).with_encoding("latin1");
        fs.write("cafe.txt", "café".into(), &opts).await.unwrap();

        let raw = fs.bucket().raw_object("cafe.txt").await.unwrap();
        assert_eq!(&raw[..], b"caf\xe9");

        let file = fs.read("cafe.txt", &ReadOptions::text("latin1")).await.unwrap();
        assert_eq!(file.contents.as_text(), Some("café"));
    }

    #[tokio::test]
    async fn unknown_encoding_fails_before_writing() {
        let fs = adapter();
        let opts = WriteOptions::default().with_encoding("klingon");
        let err = fs.write("a.txt", "x".into(), &opts).await.unwrap_err();
        assert!(matches!(err, AdapterError::UnknownEncoding(_)));
        assert_eq!(fs.bucket().mutation_count(), 0);
    }

    #[tokio::test]
    async fn read_stream_decodes_in_line() {
        let fs = adapter();
        let opts = WriteOptions::default().with_encoding("utf16le");
        fs.write("u.txt", "hé".into(), &opts).await.unwrap();

        let file = fs.read_stream("u.txt", &ReadOptions::text("utf16le")).await.unwrap();
        let chunks: Vec<Bytes> = file.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), "hé".as_bytes());
        assert_eq!(file.metadata.size, 4);
    }

    #[tokio::test]
    async fn write_stream_stores_every_chunk() {
        let fs = adapter();
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let meta = fs
            .write_stream("s.bin", stream::iter(chunks).boxed(), &WriteOptions::new(Visibility::Private))
            .await
            .unwrap();
        assert_eq!(meta.size, 4);
        assert_eq!(meta.visibility, Visibility::Private);
        assert_eq!(fs.bucket().raw_object("s.bin").await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn write_stream_takes_bytes_in_the_named_encoding() {
        let fs = adapter();
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"caf")), Ok(Bytes::from_static(b"\xe9"))];
        let opts = WriteOptions::default().with_encoding("latin1");
        let meta = fs.write_stream("cafe.txt", stream::iter(chunks).boxed(), &opts).await.unwrap();
        assert_eq!(meta.size, 4);
        assert_eq!(fs.bucket().raw_object("cafe.txt").await.unwrap(), Bytes::from_static(b"caf\xe9"));

        let file = fs.read("cafe.txt", &ReadOptions::text("latin1")).await.unwrap();
        assert_eq!(file.contents.as_text(), Some("café"));
    }

    #[tokio::test]
    async fn write_stream_rejects_malformed_text() {
        let fs = adapter();
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"caf\xe9"))];
        let opts = WriteOptions::default().with_encoding("utf8");
        let err = fs.write_stream("bad.txt", stream::iter(chunks).boxed(), &opts).await.unwrap_err();
        match err {
            AdapterError::Store(StoreError::Io(io_err)) => {
                assert_eq!(io_err.kind(), io::ErrorKind::InvalidData)
            }
            other => panic!("expected an invalid-data error, got {other}"),
        }
        assert!(!fs.exists("bad.txt").await.unwrap());
    }

    #[tokio::test]
    async fn unencodable_text_fails_before_writing() {
        let fs = adapter();
        let opts = WriteOptions::default().with_encoding("latin1");
        let err = fs.write("jp.txt", "日本".into(), &opts).await.unwrap_err();
        assert!(matches!(err, AdapterError::UnencodableText { character: '日', .. }));
        assert_eq!(fs.bucket().mutation_count(), 0);
    }

    #[tokio::test]
    async fn set_visibility_named_rejects_before_any_mutation() {
        let fs = adapter();
        fs.write("a.txt", "x".into(), &WriteOptions::default()).await.unwrap();
        let before = fs.bucket().mutation_count();

        let err = fs.set_visibility_named("a.txt", "friends-only").await.unwrap_err();
        assert_eq!(err.to_string(), "Unsupported Visibility: friends-only");
        assert_eq!(fs.bucket().mutation_count(), before);

        let meta = fs.set_visibility_named("a.txt", "Private").await.unwrap();
        assert_eq!(meta.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn ensure_bucket_creates_once() {
        let fs = GcsAdapter::from_bucket(MemoryBucket::missing("fresh-bucket"));
        assert!(fs.ensure_bucket().await.unwrap());
        assert!(!fs.ensure_bucket().await.unwrap());
    }

    #[tokio::test]
    async fn create_dir_touches_nothing() {
        let fs = adapter();
        assert_eq!(fs.create_dir("some/dir").await.unwrap(), None);
        assert_eq!(fs.bucket().mutation_count(), 0);
        assert_eq!(fs.adapter_name(), "gcs");
        assert_eq!(fs.target_version(), "1.0");
    }
}
