//! Google Cloud Storage provider.
//!
//! Authenticates with a service-account key file (OAuth2 JWT bearer grant, RS256) and talks
//! to the GCS JSON API directly:
//! - `GET  /storage/v1/b/{bucket}` resolves the bucket once, at connect time
//! - `GET  /storage/v1/b/{bucket}/o/{object}` answers [`BackupStore::exists_at`]
//! - `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}` streams the file
//!
//! One access token is minted per run; it is valid for an hour, far longer than a single
//! backup attempt.

use super::{BackupStore, StorageError, StorageResult};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, instrument};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: u64 = 3600;
const MAX_OBJECT_NAME_BYTES: usize = 1024;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account key file this client needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Never print the private key.
impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Reads and parses a JSON key file. The PEM key is validated as well.
    pub fn from_file(path: &Path) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StorageError::credentials_invalid(path, e))?;
        let key: Self =
            serde_json::from_str(&text).map_err(|e| StorageError::credentials_invalid(path, e))?;
        key.encoding_key()
            .map_err(|e| StorageError::credentials_invalid(path, e))?;
        debug!(
            client_email = %key.client_email,
            project_id = ?key.project_id,
            "Loaded service account key"
        );
        Ok(key)
    }

    fn encoding_key(&self) -> Result<EncodingKey, jsonwebtoken::errors::Error> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
    }

    /// Builds the signed JWT assertion exchanged for an access token.
    pub fn signed_assertion(&self, issued_at: u64) -> StorageResult<String> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: u64,
            exp: u64,
        }

        let claims = Claims {
            iss: &self.client_email,
            scope: STORAGE_SCOPE,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + TOKEN_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = self
            .encoding_key()
            .map_err(|e| StorageError::Auth(format!("unusable private key: {e}")))?;
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| StorageError::Auth(format!("failed to sign assertion: {e}")))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn fetch_access_token(http: &Client, key: &ServiceAccountKey) -> StorageResult<String> {
    let assertion = key.signed_assertion(jsonwebtoken::get_current_timestamp())?;
    let response = http
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), token_uri = %key.token_uri, "Token exchange rejected");
        return Err(StorageError::Auth(format!("{status}: {body}")));
    }
    let token: TokenResponse = response.json().await?;
    info!(client_email = %key.client_email, "Obtained access token");
    Ok(token.access_token)
}

/// Rejects names GCS cannot store. `.` and `..` would also be dropped as URL path segments,
/// turning an object request into a bucket listing.
fn validate_object_name(name: &str) -> StorageResult<()> {
    let reason = match name {
        "" => "empty",
        "." | ".." => "reserved",
        _ if name.len() > MAX_OBJECT_NAME_BYTES => "longer than 1024 bytes",
        _ if name.contains(['\r', '\n']) => "contains a line break",
        _ => return Ok(()),
    };
    error!(remote_path = name, reason, "Invalid object name");
    Err(StorageError::InvalidObjectName {
        name: name.to_string(),
        reason,
    })
}

async fn api_error(response: Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StorageError::Api { status, body }
}

/// A GCS bucket bound to one service account for the lifetime of the process.
pub struct GoogleCloudStorage {
    http: Client,
    endpoint: Url,
    bucket: String,
    project_id: String,
    access_token: String,
}

impl fmt::Debug for GoogleCloudStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCloudStorage")
            .field("endpoint", &self.endpoint.as_str())
            .field("bucket", &self.bucket)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl GoogleCloudStorage {
    /// Loads the key file, authenticates and resolves `bucket`.
    ///
    /// `project_override` wins over the key file's `project_id`. `endpoint` replaces
    /// [`DEFAULT_ENDPOINT`], e.g. for an emulator.
    ///
    /// # Errors
    /// - [`StorageError::CredentialsInvalid`] if the key file is unreadable or malformed
    /// - [`StorageError::Auth`] if the token exchange fails
    /// - [`StorageError::BucketNotFound`] if the bucket is missing or not visible
    #[instrument(skip_all, fields(bucket = %bucket))]
    pub async fn connect(
        credentials_path: &Path,
        bucket: &str,
        project_override: Option<&str>,
        endpoint: Option<&str>,
    ) -> StorageResult<Self> {
        let key = ServiceAccountKey::from_file(credentials_path)?;
        let project_id = match project_override {
            Some(project) => project.to_string(),
            None => key.project_id.clone().ok_or_else(|| {
                StorageError::credentials_invalid(credentials_path, "missing field `project_id`")
            })?,
        };

        let endpoint_raw = endpoint.unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Url::parse(endpoint_raw).map_err(|e| StorageError::InvalidEndpoint {
            endpoint: endpoint_raw.to_string(),
            reason: e.to_string(),
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::InvalidEndpoint {
                endpoint: endpoint_raw.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let http = Client::new();
        let access_token = fetch_access_token(&http, &key).await?;

        let storage = Self {
            http,
            endpoint,
            bucket: bucket.to_string(),
            project_id,
            access_token,
        };
        storage.resolve_bucket().await?;
        info!(
            bucket = %storage.bucket,
            project_id = %storage.project_id,
            "Connected to Google Cloud Storage"
        );
        Ok(storage)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        // cannot_be_a_base was rejected in connect
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL of the object metadata resource; `/` inside the object name is percent-encoded.
    pub fn object_url(&self, remote_path: &str) -> StorageResult<Url> {
        validate_object_name(remote_path)?;
        Ok(self.url(["storage", "v1", "b", self.bucket.as_str(), "o", remote_path]))
    }

    /// URL of the simple (single request) media upload for `remote_path`.
    pub fn upload_url(&self, remote_path: &str) -> StorageResult<Url> {
        validate_object_name(remote_path)?;
        let mut url = self.url(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", remote_path);
        Ok(url)
    }

    async fn resolve_bucket(&self) -> StorageResult<()> {
        let url = self.url(["storage", "v1", "b", self.bucket.as_str()]);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!(bucket = %self.bucket, "Bucket resolved");
                Ok(())
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                error!(bucket = %self.bucket, status = response.status().as_u16(), "Bucket not found");
                Err(StorageError::BucketNotFound(self.bucket.clone()))
            }
            _ => Err(api_error(response).await),
        }
    }
}

#[async_trait]
impl BackupStore for GoogleCloudStorage {
    #[instrument(skip(self))]
    async fn exists_at(&self, remote_path: &str) -> StorageResult<bool> {
        let url = self.object_url(remote_path)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!(remote_path, "Object found");
                Ok(true)
            }
            StatusCode::NOT_FOUND => {
                debug!(remote_path, "Object not found");
                Ok(false)
            }
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        let url = self.upload_url(remote_path)?;
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        info!(?local_path, remote_path, size, "Uploading backup");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::PermissionDenied(body))
            }
            _ => Err(api_error(response).await),
        }
    }
}
