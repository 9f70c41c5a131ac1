use crate::Digest;
use oci_spec::{distribution::ErrorResponse, OciSpecError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Invalid user input
    //
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
    #[error("Invalid name for repository: {0}")]
    InvalidName(String),
    #[error(transparent)]
    InvalidPort(#[from] std::num::ParseIntError),
    #[error("Invalid reference to image: {0}")]
    InvalidReference(String),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("Not found, or not accessible: {0}")]
    NotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    //
    // Invalid or missing content
    //
    #[error("Blob not found in store: {0}")]
    BlobNotFound(Digest),
    #[error("No manifest found in image")]
    MissingManifest,
    #[error("Manifest not found in registry: {0}")]
    ManifestNotFound(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Archive entry escapes the target directory: {0}")]
    UnsafePath(PathBuf),
    #[error(transparent)]
    InvalidJson(#[from] serde_json::error::Error),
    #[error(transparent)]
    InvalidToml(#[from] toml::de::Error),
    #[error("Failed to encode image metadata: {0}")]
    Encoding(String),

    //
    // Store write failure
    //
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: i64, actual: i64 },
    #[error("Failed to write {digest} into store: {reason}")]
    StoreWrite { digest: Digest, reason: String },

    //
    // Error from OCI registry
    //
    #[error(transparent)]
    NetworkError(Box<ureq::Transport>),
    #[error(transparent)]
    RegistryError(#[from] ErrorResponse),
    #[error("Unexpected response from registry: {status} {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("Location header is lacked in registry response: {0}")]
    MissingLocation(String),
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(url::Url),
    #[error("Unsupported WWW-Authentication header: {0}")]
    UnSupportedAuthHeader(String),

    //
    // System error
    //
    #[error("Operation cancelled")]
    Cancelled,
    #[error("No valid home directory path could be retrieved from the operating system.")]
    NoValidHomeDirectory,
    #[error("No valid runtime directory where authentication info will be stored.")]
    NoValidRuntimeDirectory,
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    UnknownIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<OciSpecError> for Error {
    fn from(e: OciSpecError) -> Self {
        match e {
            OciSpecError::SerDe(e) => Error::InvalidJson(e),
            OciSpecError::Io(e) => Error::UnknownIo(e),
            OciSpecError::Builder(e) => Error::Encoding(e.to_string()),
            OciSpecError::Other(e) => Error::Encoding(e),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(|p| p.to_owned());
        match path {
            Some(path) => Error::Io {
                path,
                source: e.into(),
            },
            None => Error::UnknownIo(e.into()),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(status, res) => {
                let url = res.get_url().to_string();
                match res.into_json::<ErrorResponse>() {
                    Ok(err) => Error::RegistryError(err),
                    Err(_) => Error::UnexpectedStatus { status, url },
                }
            }
            ureq::Error::Transport(e) => Error::NetworkError(e.into()),
        }
    }
}

/// Attach the path being operated on to an IO error
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

impl Error {
    /// Failures the caller should treat as "content or source is absent"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::NotADirectory(_)
                | Error::BlobNotFound(_)
                | Error::MissingManifest
                | Error::ManifestNotFound(_)
        )
    }
}
