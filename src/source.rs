//! Where archive resources come from.
//!
//! The [`ContentSource`] trait is the only I/O seam of the pipeline: every
//! document and image is requested by its archive-relative path
//! (`./content/shared.json`). Implementations report failures in HTTP terms so
//! the store can classify them uniformly.
//!
//! | Source | Backing | Missing resource |
//! |---|---|---|
//! | [`DirSource`] | archive unpacked on disk (`tokio::fs`) | `Status(404)` |
//! | [`HttpSource`] | archive served over HTTP (`reqwest`) | response status |
//!
//! [`ArchiveSource`] picks one of them from configuration.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The resource answered with a non-success HTTP status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// Any failure that produced no status (connection, TLS, timeout, URL).
    #[error("transport error: {0}")]
    Transport(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// The HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Async access to archive resources.
///
/// The pipeline runs on a single-threaded event loop, so futures are not
/// required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait ContentSource {
    /// Fetch the raw bytes of an archive-relative resource.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Strip the `./` and `/` prefixes viewers put in front of archive paths.
pub fn normalize_path(path: &str) -> &str {
    let mut trimmed = path;
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            return trimmed;
        }
    }
}

// ============================================================================
// Directory source
// ============================================================================

/// Archive unpacked into a directory (the one holding `content/`).
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an archive path below the root; paths escaping it are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(normalize_path(path));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(FetchError::Status(400));
        }
        Ok(self.root.join(relative))
    }
}

impl ContentSource for DirSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::Status(404)),
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

// ============================================================================
// HTTP source
// ============================================================================

/// Archive served over HTTP, e.g. by a ZIM reader's web server.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base: reqwest::Url,
    client: reqwest::Client,
}

impl HttpSource {
    /// `base_url` is the viewer's location; a trailing `/` is added if missing
    /// so relative paths resolve below it.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let with_slash = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = reqwest::Url::parse(&with_slash)
            .map_err(|e| FetchError::Transport(format!("invalid base URL {base_url}: {e}")))?;
        Ok(Self {
            base,
            client: reqwest::Client::new(),
        })
    }

    pub fn base(&self) -> &reqwest::Url {
        &self.base
    }

    /// Resolve an archive path below the base; leading `/` stays below it too.
    pub fn url_for(&self, path: &str) -> Result<reqwest::Url, FetchError> {
        self.base
            .join(normalize_path(path))
            .map_err(|e| FetchError::Transport(format!("invalid path {path}: {e}")))
    }
}

impl ContentSource for HttpSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// A source chosen at runtime.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    Dir(DirSource),
    Http(HttpSource),
}

impl ArchiveSource {
    /// HTTP when `base_url` is non-empty, otherwise the directory.
    pub fn from_settings(archive_dir: &Path, base_url: &str) -> Result<Self, FetchError> {
        if base_url.is_empty() {
            Ok(ArchiveSource::Dir(DirSource::new(archive_dir)))
        } else {
            Ok(ArchiveSource::Http(HttpSource::new(base_url)?))
        }
    }
}

impl ContentSource for ArchiveSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        match self {
            ArchiveSource::Dir(source) => source.fetch(path).await,
            ArchiveSource::Http(source) => source.fetch(path).await,
        }
    }
}
