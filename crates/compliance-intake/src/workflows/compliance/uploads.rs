//! Pre-signed upload URLs and the bookkeeping that lets submissions reference uploaded files.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::ApplicationId;

/// Upload URLs stay valid for exactly this long after issuance.
pub const UPLOAD_URL_TTL_MINUTES: i64 = 15;

const MAX_FILE_NAME_CHARS: usize = 128;
const SIGNING_CONTEXT: &str = "compliance-intake 2024 pre-signed upload url";

fn object_key_shape() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| {
        Regex::new(
            r"^uploads/[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}/[A-Za-z0-9._-]{1,128}$",
        )
        .expect("object key pattern compiles")
    })
}

/// Whether `raw` has the shape of a key produced by [`FileReferenceResolver::issue`].
pub fn is_object_key(raw: &str) -> bool {
    object_key_shape().is_match(raw)
}

/// Reduce a client-supplied file name to characters safe inside an object key and URL.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();

    let cleaned = match cleaned.strip_prefix('.') {
        Some(rest) => format!("_{rest}"),
        None => cleaned,
    };

    if cleaned.chars().all(|c| c == '_') {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Key issued for one file plus its upload window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub object_key: String,
    pub original_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedUpload {
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Registry record tracking a key from issuance through upload and claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub reference: FileReference,
    pub issued_at: DateTime<Utc>,
    pub uploaded: Option<CompletedUpload>,
    pub claimed_by: Option<ApplicationId>,
}

impl UploadEntry {
    pub fn availability(&self) -> FileAvailability {
        match (&self.uploaded, &self.claimed_by) {
            (_, Some(owner)) => FileAvailability::Claimed(owner.clone()),
            (Some(upload), None) if upload.uploaded_at <= self.reference.expires_at => {
                FileAvailability::Available
            }
            (Some(_), None) => FileAvailability::Expired,
            (None, None) => FileAvailability::NotUploaded,
        }
    }

    /// Compare-and-set on `claimed_by`. Registries call this while holding their lock.
    pub fn claim_for(&mut self, application_id: &ApplicationId) -> Result<(), UploadError> {
        match &self.claimed_by {
            Some(owner) if owner == application_id => Ok(()),
            Some(owner) => Err(UploadError::AlreadyClaimed {
                object_key: self.reference.object_key.clone(),
                owner: owner.clone(),
            }),
            None => {
                self.claimed_by = Some(application_id.clone());
                Ok(())
            }
        }
    }

    pub fn release_for(&mut self, application_id: &ApplicationId) {
        if self.claimed_by.as_ref() == Some(application_id) {
            self.claimed_by = None;
        }
    }
}

/// Why a key can or cannot back a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAvailability {
    Available,
    NotUploaded,
    Expired,
    Unknown,
    Claimed(ApplicationId),
}

impl FileAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, FileAvailability::Available)
    }

    pub fn describe(&self) -> String {
        match self {
            FileAvailability::Available => "file is available".to_string(),
            FileAvailability::NotUploaded => "file was never uploaded".to_string(),
            FileAvailability::Expired => "upload window lapsed before the file arrived".to_string(),
            FileAvailability::Unknown => "object key was not issued by this service".to_string(),
            FileAvailability::Claimed(owner) => {
                format!("file is already attached to application {owner}")
            }
        }
    }
}

/// Response item for `POST /api/compliance/document_upload_url/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedUpload {
    pub file_name: String,
    pub object_key: String,
    pub pre_signed_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage abstraction for issued keys.
pub trait UploadRegistry: Send + Sync {
    fn insert(&self, entry: UploadEntry) -> Result<(), UploadError>;
    fn fetch(&self, object_key: &str) -> Result<Option<UploadEntry>, UploadError>;
    fn update(&self, entry: UploadEntry) -> Result<(), UploadError>;
    /// Bind the key to `application_id` in one step; fails when another application holds it.
    fn claim(&self, object_key: &str, application_id: &ApplicationId) -> Result<(), UploadError>;
    /// Clear the claim if `application_id` holds it.
    fn release(
        &self,
        object_key: &str,
        application_id: &ApplicationId,
    ) -> Result<(), UploadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("file_names must contain at least one file name")]
    NoFiles,
    #[error("file name '{0}' is blank")]
    InvalidFileName(String),
    #[error("object key '{0}' was not issued")]
    UnknownObjectKey(String),
    #[error("upload url for '{object_key}' expired at {expired_at}")]
    Expired {
        object_key: String,
        expired_at: DateTime<Utc>,
    },
    #[error("object key '{0}' already holds an upload")]
    AlreadyUploaded(String),
    #[error("upload signature is invalid")]
    InvalidSignature,
    #[error("object key '{object_key}' is already attached to application {owner}")]
    AlreadyClaimed {
        object_key: String,
        owner: ApplicationId,
    },
    #[error("object key '{0}' already exists")]
    Conflict(String),
    #[error("upload registry unavailable: {0}")]
    Unavailable(String),
}

/// Keyed blake3 signer for upload URLs.
#[derive(Clone)]
pub struct UploadSigner {
    key: [u8; 32],
}

impl std::fmt::Debug for UploadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSigner").finish_non_exhaustive()
    }
}

impl UploadSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(SIGNING_CONTEXT, secret.as_bytes()),
        }
    }

    fn digest(&self, object_key: &str, expires: i64) -> blake3::Hash {
        let message = format!("PUT\n{object_key}\n{expires}");
        blake3::keyed_hash(&self.key, message.as_bytes())
    }

    pub fn sign(&self, object_key: &str, expires: i64) -> String {
        self.digest(object_key, expires).to_hex().to_string()
    }

    pub fn verify(&self, object_key: &str, expires: i64, signature: &str) -> bool {
        match signature.parse::<blake3::Hash>() {
            // blake3::Hash equality is constant time.
            Ok(provided) => provided == self.digest(object_key, expires),
            Err(_) => false,
        }
    }
}

/// Issues upload URLs and answers whether a key can back a submission.
pub struct FileReferenceResolver<U> {
    registry: Arc<U>,
    signer: UploadSigner,
    base_url: String,
}

impl<U> FileReferenceResolver<U>
where
    U: UploadRegistry + 'static,
{
    pub fn new(registry: Arc<U>, base_url: &str, signing_secret: &str) -> Self {
        Self {
            registry,
            signer: UploadSigner::new(signing_secret),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<U> {
        &self.registry
    }

    /// Issue one fresh key and URL per file name. Repeated names get distinct keys.
    pub fn issue(
        &self,
        file_names: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<IssuedUpload>, UploadError> {
        if file_names.is_empty() {
            return Err(UploadError::NoFiles);
        }
        if let Some(blank) = file_names.iter().find(|name| name.trim().is_empty()) {
            return Err(UploadError::InvalidFileName(blank.clone()));
        }

        let expires_at = now + Duration::minutes(UPLOAD_URL_TTL_MINUTES);
        let mut issued = Vec::with_capacity(file_names.len());

        for file_name in file_names {
            let object_key = format!(
                "uploads/{}/{}",
                uuid::Uuid::new_v4(),
                sanitize_file_name(file_name)
            );
            self.registry.insert(UploadEntry {
                reference: FileReference {
                    object_key: object_key.clone(),
                    original_name: file_name.clone(),
                    expires_at,
                },
                issued_at: now,
                uploaded: None,
                claimed_by: None,
            })?;

            let expires = expires_at.timestamp();
            let signature = self.signer.sign(&object_key, expires);
            issued.push(IssuedUpload {
                file_name: file_name.clone(),
                pre_signed_url: format!(
                    "{}/{}?expires={}&signature={}",
                    self.base_url, object_key, expires, signature
                ),
                object_key,
                expires_at,
            });
        }

        debug!(count = issued.len(), %expires_at, "issued upload urls");
        Ok(issued)
    }

    /// Check the query parameters a storage endpoint received with a `PUT`.
    pub fn authorize_upload(
        &self,
        object_key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), UploadError> {
        if !self.signer.verify(object_key, expires, signature) {
            return Err(UploadError::InvalidSignature);
        }
        if now.timestamp() > expires {
            return Err(UploadError::Expired {
                object_key: object_key.to_string(),
                expired_at: DateTime::from_timestamp(expires, 0).unwrap_or(now),
            });
        }
        Ok(())
    }

    /// Record that a blob landed at `object_key`. Late or repeated uploads are refused.
    pub fn record_upload(
        &self,
        object_key: &str,
        now: DateTime<Utc>,
        size_bytes: u64,
    ) -> Result<UploadEntry, UploadError> {
        let mut entry = self
            .registry
            .fetch(object_key)?
            .ok_or_else(|| UploadError::UnknownObjectKey(object_key.to_string()))?;

        if now > entry.reference.expires_at {
            return Err(UploadError::Expired {
                object_key: object_key.to_string(),
                expired_at: entry.reference.expires_at,
            });
        }
        if entry.uploaded.is_some() {
            return Err(UploadError::AlreadyUploaded(object_key.to_string()));
        }

        entry.uploaded = Some(CompletedUpload {
            uploaded_at: now,
            size_bytes,
        });
        self.registry.update(entry.clone())?;
        info!(object_key, size_bytes, "upload recorded");
        Ok(entry)
    }

    pub fn availability(&self, object_key: &str) -> Result<FileAvailability, UploadError> {
        Ok(self
            .registry
            .fetch(object_key)?
            .map(|entry| entry.availability())
            .unwrap_or(FileAvailability::Unknown))
    }

    /// True when a blob exists at the key, arrived inside its window, and is unclaimed.
    pub fn consume(&self, object_key: &str) -> Result<bool, UploadError> {
        Ok(self.availability(object_key)?.is_available())
    }

    /// Bind keys to a persisted application so no other application can reuse them.
    pub fn claim(
        &self,
        object_keys: &[String],
        application_id: &ApplicationId,
    ) -> Result<(), UploadError> {
        for object_key in object_keys {
            self.registry.claim(object_key, application_id)?;
        }
        Ok(())
    }

    /// Undo claims held by `application_id`, e.g. when persisting the application failed.
    pub fn release(
        &self,
        object_keys: &[String],
        application_id: &ApplicationId,
    ) -> Result<(), UploadError> {
        for object_key in object_keys {
            self.registry.release(object_key, application_id)?;
        }
        Ok(())
    }
}
