use crate::Digest;
use oci_spec::{distribution::ErrorResponse, OciSpecError};
use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Invalid user input
    //
    #[error("Invalid reference to image: {0}")]
    InvalidReference(String),
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),

    //
    // Authentication
    //
    #[error("Failed to discover auth challenge from {url}: {reason}")]
    AuthDiscoveryFailed { url: String, reason: String },
    #[error("Failed to get token from {url}: {reason}")]
    AuthExchangeFailed { url: String, reason: String },

    //
    // Manifest resolution
    //
    #[error("Failed to fetch manifest from {url}\ncode: {status}\nbody: {body}")]
    ManifestFetchFailed {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Unsupported manifest Content-Type: {0}")]
    UnsupportedManifestType(String),
    #[error("No manifest found for platform {os}/{architecture}")]
    NoMatchingPlatform { architecture: String, os: String },
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    //
    // Blob transfer
    //
    #[error("Failed to download blob {digest} from {url}\ncode: {status}\nbody: {body}")]
    BlobFetchFailed {
        digest: Digest,
        url: String,
        status: u16,
        body: String,
    },
    #[error("Failed to start upload at {url}\ncode: {status}\nbody: {body}")]
    UploadInitFailed {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Failed to upload chunk {range} to {url}\ncode: {status}\nbody: {body}")]
    ChunkUploadFailed {
        url: String,
        range: String,
        status: u16,
        body: String,
    },
    #[error("Digest mismatch, expected {expected} but uploaded content is {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
    #[error("Failed to upload manifest to {url}\ncode: {status}\nbody: {body}")]
    ManifestUploadFailed {
        url: String,
        status: u16,
        body: String,
    },

    //
    // Local layout
    //
    #[error("I/O error on {path}: {source}")]
    LocalLayoutIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid local layout in {path}: {reason}")]
    InvalidLayout { path: PathBuf, reason: String },
    #[error(transparent)]
    InvalidJson(#[from] serde_json::error::Error),

    //
    // Transport and control
    //
    #[error(transparent)]
    NetworkError(Box<ureq::Transport>),
    #[error("Operation is cancelled")]
    Cancelled,
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("No valid runtime directory where authentication info will be stored.")]
    NoValidRuntimeDirectory,
    #[error("No valid home directory path could be retrieved from the operating system.")]
    NoValidHomeDirectory,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error happened on the local layout
    pub fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::LocalLayoutIo {
            path: path.into(),
            source,
        }
    }
}

impl From<OciSpecError> for Error {
    fn from(e: OciSpecError) -> Self {
        match e {
            OciSpecError::SerDe(e) => Error::InvalidJson(e),
            // Raised only by builders of manifest and descriptor
            e => Error::InvalidManifest(e.to_string()),
        }
    }
}

impl From<ureq::Transport> for Error {
    fn from(e: ureq::Transport) -> Self {
        Error::NetworkError(Box::new(e))
    }
}

/// Human readable message from a registry error body.
///
/// Registries answer with `{"errors": [...]}` as defined in the OCI distribution specification,
/// and this falls back to the raw body if it is not the case.
pub(crate) fn describe_body(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => err
            .errors()
            .iter()
            .map(|info| {
                format!(
                    "{:?}: {}",
                    info.code(),
                    info.message().as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
        Err(_) => body.trim().to_string(),
    }
}
