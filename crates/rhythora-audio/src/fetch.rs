//! Fetching encoded audio over HTTP or from disk.

use std::future::Future;
use std::path::PathBuf;

use bytes::Bytes;
use rhythora_core::{Error, HttpError, Result};
use tracing::debug;
use url::Url;

/// Source of raw encoded audio bytes.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Where a catalog location resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Remote(Url),
    Local(PathBuf),
}

/// Fetches `http(s)` URLs with reqwest and `file://` URLs or plain paths from
/// disk. Relative locations such as `/assets/...` resolve against the base.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Option<Url>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base: None,
        }
    }

    /// Resolve relative locations against `base` (a URL or a directory path).
    pub fn with_base(base: &str) -> Result<Self> {
        let base = match Url::parse(base) {
            Ok(url) => url,
            Err(_) => {
                let dir = std::fs::canonicalize(base)?;
                Url::from_directory_path(&dir).map_err(|()| {
                    Error::InvalidArgument(format!("Not a directory: {}", dir.display()))
                })?
            }
        };
        let base = if base.path().ends_with('/') {
            base
        } else {
            Url::parse(&format!("{base}/"))
                .map_err(|e| Error::Http(HttpError::InvalidUrl(format!("{base}: {e}"))))?
        };
        debug!("Fetcher base set to {base}");
        Ok(Self {
            client: reqwest::Client::new(),
            base: Some(base),
        })
    }

    fn resolve(&self, location: &str) -> Result<Resolved> {
        let url = match (Url::parse(location), &self.base) {
            (Ok(url), _) => url,
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => base
                .join(location.trim_start_matches('/'))
                .map_err(|e| Error::Http(HttpError::InvalidUrl(format!("{location}: {e}"))))?,
            (Err(url::ParseError::RelativeUrlWithoutBase), None) => {
                return Ok(Resolved::Local(PathBuf::from(location)));
            }
            (Err(e), _) => {
                return Err(Error::Http(HttpError::InvalidUrl(format!("{location}: {e}"))));
            }
        };

        match url.scheme() {
            "http" | "https" => Ok(Resolved::Remote(url)),
            "file" => url
                .to_file_path()
                .map(Resolved::Local)
                .map_err(|()| Error::Http(HttpError::InvalidUrl(url.to_string()))),
            other => Err(Error::Http(HttpError::InvalidUrl(format!(
                "Unsupported scheme {other}: {url}"
            )))),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Bytes>> + Send {
        let resolved = self.resolve(location);
        let client = self.client.clone();
        async move {
            match resolved? {
                Resolved::Remote(url) => {
                    debug!("Fetching {url}");
                    let response = client.get(url.clone()).send().await.map_err(|e| {
                        Error::Http(HttpError::ConnectionFailed(format!("{url}: {e}")))
                    })?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(Error::Http(HttpError::StatusError {
                            status: status.as_u16(),
                            url: url.to_string(),
                        }));
                    }
                    let data = response
                        .bytes()
                        .await
                        .map_err(|e| Error::Network(format!("Failed to read {url}: {e}")))?;
                    debug!("Fetched {} bytes from {url}", data.len());
                    Ok(data)
                }
                Resolved::Local(path) => {
                    debug!("Reading {}", path.display());
                    Ok(Bytes::from(tokio::fs::read(&path).await?))
                }
            }
        }
    }
}
