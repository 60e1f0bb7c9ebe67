use anyhow::{Context, Result};
use clap::Args;
use std::{env, fmt, path::PathBuf};

use crate::errors::ConfigError;

/// Connection settings for a [`GcsAdapter`](crate::GcsAdapter).
///
/// Built by hand, or from environment variables and CLI arguments via
/// [`AdapterConfig::from_env_and_args`]. Nothing is checked until
/// [`AdapterConfig::validate`] runs, which the adapter constructor does first.
#[derive(Clone, Default)]
pub struct AdapterConfig {
    pub project_id: String,
    pub bucket: String,
    /// Path to a service-account `keyfile.json`...
    pub key_filename: Option<PathBuf>,
    /// ...or the contents of one.
    pub credentials: Option<Vec<u8>>,
    /// ...or a plain API key.
    pub api_key: Option<String>,
    /// Overrides `https://storage.googleapis.com`, e.g. for an emulator.
    pub endpoint: Option<String>,
}

/// The single credential source an adapter authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    KeyFile(PathBuf),
    Inline(Vec<u8>),
    ApiKey(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Credentials::Inline(_) => f.write_str("Inline(<redacted>)"),
            Credentials::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// A configuration that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsSettings {
    pub project_id: String,
    pub bucket: String,
    pub credentials: Credentials,
    pub endpoint: Option<String>,
}

/// Connection flags shared by every CLI subcommand.
/// Each flag overrides the matching `GCS_*` environment variable.
#[derive(Args, Clone, Default)]
pub struct ConnectionArgs {
    /// Project that owns the bucket (overrides GCS_PROJECT_ID)
    #[arg(long, global = true)]
    pub project_id: Option<String>,

    /// Bucket to operate on (overrides GCS_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Service-account key file (overrides GCS_KEY_FILENAME)
    #[arg(long, global = true)]
    pub key_filename: Option<PathBuf>,

    /// Inline service-account JSON (overrides GCS_CREDENTIALS)
    #[arg(long, global = true)]
    pub credentials: Option<String>,

    /// API key (overrides GCS_API_KEY)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Storage endpoint (overrides GCS_ENDPOINT)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,
}

impl AdapterConfig {
    /// Merge CLI arguments over `GCS_*` environment variables.
    pub fn from_env_and_args(args: &ConnectionArgs) -> Result<Self> {
        let project_id = match args.project_id.clone() {
            Some(value) => value,
            None => env_var("GCS_PROJECT_ID")?.unwrap_or_default(),
        };
        let bucket = match args.bucket.clone() {
            Some(value) => value,
            None => env_var("GCS_BUCKET")?.unwrap_or_default(),
        };
        let key_filename = match args.key_filename.clone() {
            Some(path) => Some(path),
            None => env_var("GCS_KEY_FILENAME")?.map(PathBuf::from),
        };
        let credentials = match args.credentials.clone() {
            Some(json) => Some(json),
            None => env_var("GCS_CREDENTIALS")?,
        };
        let api_key = match args.api_key.clone() {
            Some(key) => Some(key),
            None => env_var("GCS_API_KEY")?,
        };
        let endpoint = match args.endpoint.clone() {
            Some(url) => Some(url),
            None => env_var("GCS_ENDPOINT")?,
        };

        Ok(Self {
            project_id,
            bucket,
            key_filename,
            credentials: credentials.map(String::into_bytes),
            api_key,
            endpoint,
        })
    }

    /// Check required fields in order: bucket, project, then exactly one
    /// credential. Empty values count as missing.
    pub fn validate(self) -> Result<GcsSettings, ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        if self.project_id.is_empty() {
            return Err(ConfigError::MissingProjectId);
        }

        let key_filename = self.key_filename.filter(|p| !p.as_os_str().is_empty());
        let inline = self.credentials.filter(|c| !c.is_empty());
        let api_key = self.api_key.filter(|k| !k.is_empty());

        let credentials = match (key_filename, inline, api_key) {
            (Some(path), None, None) => Credentials::KeyFile(path),
            (None, Some(material), None) => Credentials::Inline(material),
            (None, None, Some(key)) => Credentials::ApiKey(key),
            (None, None, None) => return Err(ConfigError::MissingCredentials),
            (path, material, key) => {
                let mut supplied = Vec::new();
                if path.is_some() {
                    supplied.push("keyFilename");
                }
                if material.is_some() {
                    supplied.push("credentials");
                }
                if key.is_some() {
                    supplied.push("key");
                }
                return Err(ConfigError::ConflictingCredentials(supplied));
            }
        };

        Ok(GcsSettings {
            project_id: self.project_id,
            bucket: self.bucket,
            credentials,
            endpoint: self.endpoint.filter(|e| !e.is_empty()),
        })
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("project_id", &self.project_id)
            .field("bucket", &self.bucket)
            .field("key_filename", &self.key_filename)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn env_var(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AdapterConfig {
        AdapterConfig {
            project_id: "my-project".into(),
            bucket: "my-bucket".into(),
            api_key: Some("AIza-test".into()),
            ..Default::default()
        }
    }

    #[test]
    fn requires_a_bucket() {
        let cfg = AdapterConfig {
            bucket: String::new(),
            ..base()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err, ConfigError::MissingBucket);
        assert!(err.to_string().contains("'bucket'"));
    }

    #[test]
    fn requires_a_project_id() {
        let cfg = AdapterConfig {
            project_id: String::new(),
            ..base()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("'projectId'"));
    }

    #[test]
    fn bucket_is_checked_before_project() {
        let cfg = AdapterConfig {
            bucket: String::new(),
            project_id: String::new(),
            ..base()
        };
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::MissingBucket);
    }

    #[test]
    fn requires_some_credential() {
        let cfg = AdapterConfig {
            api_key: None,
            ..base()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("'keyFilename', 'credentials' or 'key'"));
    }

    #[test]
    fn empty_credentials_count_as_missing() {
        let cfg = AdapterConfig {
            api_key: Some(String::new()),
            credentials: Some(Vec::new()),
            key_filename: Some(PathBuf::new()),
            ..base()
        };
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::MissingCredentials);
    }

    #[test]
    fn rejects_more_than_one_credential() {
        let cfg = AdapterConfig {
            key_filename: Some("/etc/gcs/key.json".into()),
            ..base()
        };
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::ConflictingCredentials(vec!["keyFilename", "key"])
        );
    }

    #[test]
    fn maps_each_credential_form() {
        let settings = base().validate().unwrap();
        assert_eq!(settings.credentials, Credentials::ApiKey("AIza-test".into()));

        let settings = AdapterConfig {
            api_key: None,
            credentials: Some(br#"{"type":"service_account"}"#.to_vec()),
            ..base()
        }
        .validate()
        .unwrap();
        assert!(matches!(settings.credentials, Credentials::Inline(_)));

        let settings = AdapterConfig {
            api_key: None,
            key_filename: Some("key.json".into()),
            ..base()
        }
        .validate()
        .unwrap();
        assert_eq!(settings.credentials, Credentials::KeyFile("key.json".into()));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", base());
        assert!(!rendered.contains("AIza-test"));
        assert!(rendered.contains("my-bucket"));
        let rendered = format!("{:?}", base().validate().unwrap());
        assert!(!rendered.contains("AIza-test"));
    }

    #[test]
    fn args_take_precedence() {
        let args = ConnectionArgs {
            project_id: Some("cli-project".into()),
            bucket: Some("cli-bucket".into()),
            key_filename: None,
            credentials: None,
            api_key: Some("cli-key".into()),
            endpoint: Some("http://localhost:4443".into()),
        };
        let cfg = AdapterConfig::from_env_and_args(&args).unwrap();
        assert_eq!(cfg.project_id, "cli-project");
        assert_eq!(cfg.bucket, "cli-bucket");
        assert_eq!(cfg.api_key.as_deref(), Some("cli-key"));
        assert_eq!(cfg.endpoint.as_deref(), Some("http://localhost:4443"));
    }
}
