//! In-process bucket.
//!
//! Behaves like a Cloud Storage bucket for everything the adapter observes:
//! names are validated, each write finalizes a whole object (an upload that
//! fails midway leaves nothing behind), ACLs follow the predefined shortcuts,
//! and copies get a fresh creation time with the default (private) ACL.
//! Every mutating call is counted so tests can assert that an operation
//! never reached the store.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{AclEntry, Bucket, ObjectMetadata, PredefinedAcl, SizeField, naming};
use crate::errors::{StoreError, StoreResult};
use crate::models::ContentStream;

/// Read channels hand content out in pieces of this size.
const READ_CHUNK_SIZE: usize = 64 * 1024;

const OWNER_ENTITY: &str = "project-owners-memory";

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    acl: Vec<AclEntry>,
    content_type: Option<String>,
    md5_hash: String,
    time_created: DateTime<Utc>,
    generation: i64,
}

struct BucketState {
    created: bool,
    objects: BTreeMap<String, StoredObject>,
}

/// A bucket that lives in memory. Clones share the same objects.
#[derive(Clone)]
pub struct MemoryBucket {
    name: String,
    state: Arc<RwLock<BucketState>>,
    mutations: Arc<AtomicUsize>,
}

impl MemoryBucket {
    /// An existing, empty bucket.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_state(name.into(), true)
    }

    /// A handle to a bucket that has not been created yet.
    pub fn missing(name: impl Into<String>) -> Self {
        Self::with_state(name.into(), false)
    }

    fn with_state(name: String, created: bool) -> Self {
        Self {
            name,
            state: Arc::new(RwLock::new(BucketState {
                created,
                objects: BTreeMap::new(),
            })),
            mutations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of calls so far that changed, or tried to change, the bucket.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Names of every stored object, in lexicographic order.
    pub async fn object_names(&self) -> Vec<String> {
        self.state.read().await.objects.keys().cloned().collect()
    }

    /// Raw stored bytes, bypassing the adapter.
    pub async fn raw_object(&self, path: &str) -> Option<Bytes> {
        self.state
            .read()
            .await
            .objects
            .get(path)
            .map(|o| o.data.clone())
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn not_found(&self, path: &str) -> StoreError {
        StoreError::ObjectNotFound {
            bucket: self.name.clone(),
            path: path.to_string(),
        }
    }

    fn ensure_created(&self, state: &BucketState) -> StoreResult<()> {
        if state.created {
            Ok(())
        } else {
            Err(StoreError::BucketNotFound(self.name.clone()))
        }
    }

    fn acl_for(acl: PredefinedAcl) -> Vec<AclEntry> {
        let mut entries = vec![AclEntry::new(OWNER_ENTITY, AclEntry::OWNER)];
        if acl == PredefinedAcl::PublicRead {
            entries.push(AclEntry::new(AclEntry::ALL_USERS, AclEntry::READER));
        }
        entries
    }

    async fn store(
        &self,
        path: &str,
        data: Bytes,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        let digest = md5::compute(&data);
        let now = Utc::now();
        let object = StoredObject {
            md5_hash: general_purpose::STANDARD.encode(digest.0),
            data,
            acl: Self::acl_for(acl),
            content_type: content_type.map(str::to_string),
            time_created: now,
            generation: now.timestamp_micros(),
        };

        let mut state = self.state.write().await;
        self.ensure_created(&state)?;
        state.objects.insert(path.to_string(), object);
        debug!(bucket = %self.name, path = %path, "stored object");
        Ok(())
    }

    async fn duplicate(&self, from: &str, to: &str) -> StoreResult<()> {
        naming::ensure_object_name(to)?;
        let mut state = self.state.write().await;
        self.ensure_created(&state)?;
        let source = state
            .objects
            .get(from)
            .cloned()
            .ok_or_else(|| self.not_found(from))?;
        let now = Utc::now();
        state.objects.insert(
            to.to_string(),
            StoredObject {
                acl: Self::acl_for(PredefinedAcl::Private),
                time_created: now,
                generation: now.timestamp_micros(),
                ..source
            },
        );
        Ok(())
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(
        &self,
        path: &str,
        data: Bytes,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        self.record_mutation();
        naming::ensure_object_name(path)?;
        self.store(path, data, acl, content_type).await
    }

    async fn read_channel(&self, path: &str) -> StoreResult<ContentStream> {
        let state = self.state.read().await;
        self.ensure_created(&state)?;
        let data = state
            .objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| self.not_found(path))?;

        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(READ_CHUNK_SIZE)
            .map(|start| data.slice(start..(start + READ_CHUNK_SIZE).min(data.len())))
            .collect();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn write_channel(
        &self,
        path: &str,
        mut data: ContentStream,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        self.record_mutation();
        naming::ensure_object_name(path)?;

        // Nothing becomes visible until the source is fully drained.
        let mut buffer = Vec::new();
        while let Some(chunk) = data.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        self.store(path, Bytes::from(buffer), acl, content_type).await
    }

    async fn move_object(&self, from: &str, to: &str) -> StoreResult<()> {
        if from == to {
            return self.object_metadata(from).await.map(|_| ());
        }
        self.record_mutation();
        self.duplicate(from, to).await?;
        self.state.write().await.objects.remove(from);
        Ok(())
    }

    async fn copy_object(&self, from: &str, to: &str) -> StoreResult<()> {
        self.record_mutation();
        self.duplicate(from, to).await
    }

    async fn delete_object(&self, path: &str) -> StoreResult<()> {
        self.record_mutation();
        let mut state = self.state.write().await;
        self.ensure_created(&state)?;
        state
            .objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| self.not_found(path))
    }

    async fn object_exists(&self, path: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        self.ensure_created(&state)?;
        Ok(state.objects.contains_key(path))
    }

    async fn object_metadata(&self, path: &str) -> StoreResult<ObjectMetadata> {
        let state = self.state.read().await;
        self.ensure_created(&state)?;
        let object = state.objects.get(path).ok_or_else(|| self.not_found(path))?;
        Ok(ObjectMetadata {
            name: path.to_string(),
            bucket: self.name.clone(),
            // The JSON API reports sizes as decimal strings.
            size: SizeField::Text(object.data.len().to_string()),
            time_created: object.time_created,
            content_type: object.content_type.clone(),
            md5_hash: Some(object.md5_hash.clone()),
            generation: Some(object.generation.to_string()),
        })
    }

    async fn object_acl(&self, path: &str) -> StoreResult<Vec<AclEntry>> {
        let state = self.state.read().await;
        self.ensure_created(&state)?;
        state
            .objects
            .get(path)
            .map(|o| o.acl.clone())
            .ok_or_else(|| self.not_found(path))
    }

    async fn make_public(&self, path: &str) -> StoreResult<()> {
        self.record_mutation();
        let mut state = self.state.write().await;
        self.ensure_created(&state)?;
        let object = state
            .objects
            .get_mut(path)
            .ok_or_else(|| self.not_found(path))?;
        object.acl = Self::acl_for(PredefinedAcl::PublicRead);
        Ok(())
    }

    async fn make_private(&self, path: &str) -> StoreResult<()> {
        self.record_mutation();
        let mut state = self.state.write().await;
        self.ensure_created(&state)?;
        let object = state
            .objects
            .get_mut(path)
            .ok_or_else(|| self.not_found(path))?;
        object.acl = Self::acl_for(PredefinedAcl::Private);
        Ok(())
    }

    async fn delete_files(&self, prefix: &str) -> StoreResult<()> {
        self.record_mutation();
        let mut state = self.state.write().await;
        self.ensure_created(&state)?;
        let before = state.objects.len();
        state.objects.retain(|name, _| !name.starts_with(prefix));
        debug!(
            bucket = %self.name,
            prefix = %prefix,
            removed = before - state.objects.len(),
            "deleted by prefix"
        );
        Ok(())
    }

    async fn exists(&self) -> StoreResult<bool> {
        Ok(self.state.read().await.created)
    }

    async fn create(&self) -> StoreResult<()> {
        self.record_mutation();
        naming::ensure_bucket_name(&self.name)?;
        let mut state = self.state.write().await;
        if state.created {
            return Err(StoreError::BucketAlreadyExists(self.name.clone()));
        }
        state.created = true;
        Ok(())
    }
}
