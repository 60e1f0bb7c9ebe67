//! Cloud Storage JSON API client.
//!
//! A thin [`Bucket`] implementation over `reqwest`. Each trait call maps to
//! one documented endpoint (two for move, a loop for large copies, a listing
//! plus bounded-concurrency deletes for prefix deletion). No retries.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::{io, sync::Arc};
use tracing::debug;

use super::auth::Authorizer;
use super::{AclEntry, Bucket, ObjectMetadata, PredefinedAcl, naming};
use crate::config::GcsSettings;
use crate::errors::{StoreError, StoreResult};
use crate::models::ContentStream;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Deletes in flight at once while deleting by prefix.
const DELETE_CONCURRENCY: usize = 10;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

struct ClientInner {
    http: Client,
    endpoint: String,
    project_id: String,
    auth: Authorizer,
}

/// Handle to the storage service for one project. Cheap to clone.
#[derive(Clone)]
pub struct GcsClient {
    inner: Arc<ClientInner>,
}

impl GcsClient {
    /// Build the HTTP client. Performs no I/O.
    pub fn new(settings: &GcsSettings) -> StoreResult<Self> {
        let http = Client::builder().build()?;
        let endpoint = settings
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();
        let auth = Authorizer::new(&settings.credentials, http.clone());
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                endpoint,
                project_id: settings.project_id.clone(),
                auth,
            }),
        })
    }

    pub fn bucket(&self, name: &str) -> GcsBucket {
        GcsBucket {
            client: self.clone(),
            name: name.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }
}

/// One bucket reached through the JSON API.
#[derive(Clone)]
pub struct GcsBucket {
    client: GcsClient,
    name: String,
}

/// What a request addressed, for mapping a 404.
#[derive(Clone, Copy)]
enum Target<'a> {
    Bucket,
    Object(&'a str),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct AclList {
    #[serde(default)]
    items: Vec<AclEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ListedObject>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteResponse {
    done: bool,
    rewrite_token: Option<String>,
}

impl GcsBucket {
    fn http(&self) -> &Client {
        &self.client.inner.http
    }

    fn bucket_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}",
            self.client.inner.endpoint,
            urlencoding::encode(&self.name)
        )
    }

    fn objects_url(&self) -> String {
        format!("{}/o", self.bucket_url())
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/o/{}", self.bucket_url(), urlencoding::encode(path))
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.client.inner.endpoint,
            urlencoding::encode(&self.name)
        )
    }

    /// Authorize and send; any non-2xx status becomes a [`StoreError`].
    async fn send(&self, request: RequestBuilder, target: Target<'_>) -> StoreResult<Response> {
        let request = self.client.inner.auth.authorize(request).await?;
        let resp = request.send().await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(self.error_from(resp, target).await)
        }
    }

    /// Like [`send`](Self::send) but reports a 404 as `None`.
    async fn send_optional(
        &self,
        request: RequestBuilder,
        target: Target<'_>,
    ) -> StoreResult<Option<Response>> {
        match self.send(request, target).await {
            Ok(resp) => Ok(Some(resp)),
            Err(StoreError::ObjectNotFound { .. }) | Err(StoreError::BucketNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn error_from(&self, resp: Response, target: Target<'_>) -> StoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        classify(&self.name, status, message, target)
    }

    async fn upload(
        &self,
        path: &str,
        body: Body,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        naming::ensure_object_name(path)?;
        let request = self
            .http()
            .post(self.upload_url())
            .query(&[
                ("uploadType", "media"),
                ("name", path),
                ("predefinedAcl", acl.as_str()),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
            )
            .body(body);
        self.send(request, Target::Object(path)).await?;
        debug!(bucket = %self.name, path = %path, acl = acl.as_str(), "upload complete");
        Ok(())
    }

    async fn apply_acl(&self, path: &str, acl: PredefinedAcl) -> StoreResult<()> {
        let request = self
            .http()
            .patch(self.object_url(path))
            .query(&[("predefinedAcl", acl.as_str())])
            .json(&json!({ "acl": null }));
        self.send(request, Target::Object(path)).await?;
        Ok(())
    }

    async fn list_names(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http()
                .get(self.objects_url())
                .query(&[("prefix", prefix), ("fields", "items(name),nextPageToken")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: ObjectList = self.send(request, Target::Bucket).await?.json().await?;
            names.extend(page.items.into_iter().map(|o| o.name));
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(names)
    }
}

/// Map an error status to a store error.
fn classify(bucket: &str, status: StatusCode, message: String, target: Target<'_>) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        let bucket_missing = message.to_ascii_lowercase().contains("bucket does not exist");
        return match target {
            Target::Object(path) if !bucket_missing => StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            },
            _ => StoreError::BucketNotFound(bucket.to_string()),
        };
    }
    StoreError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Bucket for GcsBucket {
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
        self.upload(path, Body::from(data), acl, content_type).await
    }

    async fn read_channel(&self, path: &str) -> StoreResult<ContentStream> {
        let request = self
            .http()
            .get(self.object_url(path))
            .query(&[("alt", "media")]);
        let resp = self.send(request, Target::Object(path)).await?;
        Ok(resp.bytes_stream().map_err(io::Error::other).boxed())
    }

    async fn write_channel(
        &self,
        path: &str,
        data: ContentStream,
        acl: PredefinedAcl,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        self.upload(path, Body::wrap_stream(data), acl, content_type)
            .await
    }

    async fn move_object(&self, from: &str, to: &str) -> StoreResult<()> {
        if from == to {
            self.object_metadata(from).await?;
            return Ok(());
        }
        self.copy_object(from, to).await?;
        self.delete_object(from).await
    }

    async fn copy_object(&self, from: &str, to: &str) -> StoreResult<()> {
        naming::ensure_object_name(to)?;
        let url = format!(
            "{}/rewriteTo/b/{}/o/{}",
            self.object_url(from),
            urlencoding::encode(&self.name),
            urlencoding::encode(to)
        );

        // Large or cross-location copies take several calls.
        let mut rewrite_token: Option<String> = None;
        loop {
            let mut request = self.http().post(&url).json(&json!({}));
            if let Some(token) = &rewrite_token {
                request = request.query(&[("rewriteToken", token.as_str())]);
            }
            let progress: RewriteResponse =
                self.send(request, Target::Object(from)).await?.json().await?;
            if progress.done {
                break;
            }
            rewrite_token = progress.rewrite_token;
            if rewrite_token.is_none() {
                return Err(StoreError::Http {
                    status: StatusCode::OK.as_u16(),
                    message: "rewrite not done but no rewriteToken returned".into(),
                });
            }
        }
        debug!(bucket = %self.name, from = %from, to = %to, "copy complete");
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> StoreResult<()> {
        let request = self.http().delete(self.object_url(path));
        self.send(request, Target::Object(path)).await?;
        debug!(bucket = %self.name, path = %path, "delete complete");
        Ok(())
    }

    async fn object_exists(&self, path: &str) -> StoreResult<bool> {
        let request = self
            .http()
            .get(self.object_url(path))
            .query(&[("fields", "name")]);
        match self.send(request, Target::Object(path)).await {
            Ok(_) => Ok(true),
            Err(StoreError::ObjectNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn object_metadata(&self, path: &str) -> StoreResult<ObjectMetadata> {
        let request = self.http().get(self.object_url(path));
        Ok(self.send(request, Target::Object(path)).await?.json().await?)
    }

    async fn object_acl(&self, path: &str) -> StoreResult<Vec<AclEntry>> {
        let request = self.http().get(format!("{}/acl", self.object_url(path)));
        let list: AclList = self.send(request, Target::Object(path)).await?.json().await?;
        Ok(list.items)
    }

    async fn make_public(&self, path: &str) -> StoreResult<()> {
        self.apply_acl(path, PredefinedAcl::PublicRead).await
    }

    async fn make_private(&self, path: &str) -> StoreResult<()> {
        self.apply_acl(path, PredefinedAcl::Private).await
    }

    async fn delete_files(&self, prefix: &str) -> StoreResult<()> {
        let names = self.list_names(prefix).await?;
        let total = names.len();
        stream::iter(names)
            .map(|name| async move {
                match self.delete_object(&name).await {
                    // Already gone between listing and deleting.
                    Err(StoreError::ObjectNotFound { .. }) => Ok(()),
                    other => other,
                }
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;
        debug!(bucket = %self.name, prefix = %prefix, deleted = total, "prefix delete complete");
        Ok(())
    }

    async fn exists(&self) -> StoreResult<bool> {
        let request = self
            .http()
            .get(self.bucket_url())
            .query(&[("fields", "name")]);
        Ok(self.send_optional(request, Target::Bucket).await?.is_some())
    }

    async fn create(&self) -> StoreResult<()> {
        naming::ensure_bucket_name(&self.name)?;
        let request = self
            .http()
            .post(format!("{}/storage/v1/b", self.client.inner.endpoint))
            .query(&[("project", self.client.inner.project_id.as_str())])
            .json(&json!({ "name": self.name }));
        match self.send(request, Target::Bucket).await {
            Ok(_) => Ok(()),
            Err(StoreError::Http { status: 409, .. }) => {
                Err(StoreError::BucketAlreadyExists(self.name.clone()))
            }
            Err(err) => Err(err),
        }
    }
}
