//! Request authorization for the Cloud Storage JSON API.
//!
//! An API key travels as the `key` query parameter. Service-account
//! credentials are exchanged for an OAuth2 access token with the JWT-bearer
//! grant; the token is reused until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Credentials;
use crate::errors::{StoreError, StoreResult};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Decorates outgoing requests with credentials.
pub enum Authorizer {
    ApiKey(String),
    ServiceAccount(TokenSource),
}

impl Authorizer {
    pub fn new(credentials: &Credentials, http: Client) -> Self {
        match credentials {
            Credentials::ApiKey(key) => Authorizer::ApiKey(key.clone()),
            Credentials::KeyFile(path) => {
                Authorizer::ServiceAccount(TokenSource::new(KeySource::File(path.clone()), http))
            }
            Credentials::Inline(material) => Authorizer::ServiceAccount(TokenSource::new(
                KeySource::Inline(material.clone()),
                http,
            )),
        }
    }

    pub async fn authorize(&self, request: RequestBuilder) -> StoreResult<RequestBuilder> {
        match self {
            Authorizer::ApiKey(key) => Ok(request.query(&[("key", key.as_str())])),
            Authorizer::ServiceAccount(source) => {
                let token = source.token().await?;
                Ok(request.bearer_auth(token))
            }
        }
    }
}

/// Where the service-account key comes from. Files are read on first use,
/// never at construction.
pub enum KeySource {
    File(PathBuf),
    Inline(Vec<u8>),
}

impl KeySource {
    async fn load(&self) -> StoreResult<ServiceAccountKey> {
        match self {
            KeySource::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                ServiceAccountKey::from_slice(&bytes)
            }
            KeySource::Inline(bytes) => ServiceAccountKey::from_slice(bytes),
        }
    }
}

/// The fields of a `keyfile.json` needed to mint tokens.
#[derive(Deserialize, Clone)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_slice(bytes: &[u8]) -> StoreResult<Self> {
        let key: ServiceAccountKey = serde_json::from_slice(bytes)
            .map_err(|err| StoreError::Auth(format!("unreadable service account key: {}", err)))?;
        match key.key_type.as_deref() {
            None | Some("service_account") => Ok(key),
            Some(other) => Err(StoreError::Auth(format!(
                "unsupported credential type `{}`",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Build the RS256-signed JWT assertion for the token exchange.
pub fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> StoreResult<String> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: STORAGE_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|err| StoreError::Auth(format!("invalid private key: {}", err)))?;
    jsonwebtoken::encode(&header, &claims, &signing_key)
        .map_err(|err| StoreError::Auth(format!("signing assertion: {}", err)))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches OAuth2 access tokens for one service account.
pub struct TokenSource {
    key: KeySource,
    http: Client,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(key: KeySource, http: Client) -> Self {
        Self {
            key,
            http,
            cached: Mutex::new(None),
        }
    }

    /// A token valid for at least another minute.
    pub async fn token(&self) -> StoreResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let key = self.key.load().await?;
        let fresh = self.exchange(&key).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self, key: &ServiceAccountKey) -> StoreResult<AccessToken> {
        let now = Utc::now();
        let assertion = sign_assertion(key, now)?;
        let resp = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!(
                "token exchange failed: HTTP {} - {}",
                status, body
            )));
        }

        let body: TokenResponse = resp.json().await?;
        debug!(client = %key.client_email, expires_in = body.expires_in, "obtained access token");
        Ok(AccessToken {
            value: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        })
    }
}
