//! Artifact locations and downloading.
//!
//! Index entries name artifacts by URL. A URL is either absolute
//! (`http(s)://`, `file://`) or relative to the configured mirror, which is
//! itself an HTTP base URL or a local directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Where artifacts and the index snapshot are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mirror {
  /// Base URL; always ends in `/` so relative joins stay below it.
  Http(Url),
  Directory(PathBuf),
}

#[derive(Debug, Error)]
pub enum MirrorError {
  #[error("invalid mirror URL '{value}': {reason}")]
  InvalidUrl { value: String, reason: String },
}

impl Mirror {
  /// Parse a mirror setting. Relative directory paths are joined onto
  /// `base` when given.
  pub fn parse(value: &str, base: Option<&Path>) -> Result<Self, MirrorError> {
    let invalid = |reason: String| MirrorError::InvalidUrl {
      value: value.to_string(),
      reason,
    };

    if is_http(value) {
      let with_slash = if value.ends_with('/') {
        value.to_string()
      } else {
        format!("{}/", value)
      };
      let url = Url::parse(&with_slash).map_err(|e| invalid(e.to_string()))?;
      return Ok(Mirror::Http(url));
    }

    if value.starts_with("file://") {
      let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
      let path = url
        .to_file_path()
        .map_err(|_| invalid("not a local path".to_string()))?;
      return Ok(Mirror::Directory(path));
    }

    let path = PathBuf::from(value);
    Ok(Mirror::Directory(match base {
      Some(base) if path.is_relative() => base.join(path),
      _ => path,
    }))
  }

  /// Resolve an index URL against this mirror.
  pub fn locate(&self, url: &str) -> Result<Location, FetchError> {
    locate(Some(self), url)
  }
}

impl std::fmt::Display for Mirror {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Mirror::Http(url) => write!(f, "{}", url),
      Mirror::Directory(path) => write!(f, "{}", path.display()),
    }
  }
}

/// A concrete place to read an artifact from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
  Remote(Url),
  Local(PathBuf),
}

impl std::fmt::Display for Location {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Location::Remote(url) => write!(f, "{}", url),
      Location::Local(path) => write!(f, "{}", path.display()),
    }
  }
}

fn is_http(value: &str) -> bool {
  value.starts_with("http://") || value.starts_with("https://")
}

/// Resolve `url` to a location, using `mirror` for relative URLs.
pub fn locate(mirror: Option<&Mirror>, url: &str) -> Result<Location, FetchError> {
  let invalid = |reason: String| FetchError::InvalidUrl {
    url: url.to_string(),
    reason,
  };

  if is_http(url) {
    return Url::parse(url)
      .map(Location::Remote)
      .map_err(|e| invalid(e.to_string()));
  }
  if url.starts_with("file://") {
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    return parsed
      .to_file_path()
      .map(Location::Local)
      .map_err(|_| invalid("not a local path".to_string()));
  }

  match mirror {
    Some(Mirror::Http(base)) => base
      .join(url)
      .map(Location::Remote)
      .map_err(|e| invalid(e.to_string())),
    Some(Mirror::Directory(dir)) => Ok(Location::Local(dir.join(url))),
    None => Err(FetchError::NoMirror { url: url.to_string() }),
  }
}

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("invalid artifact URL '{url}': {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("'{url}' is relative but no mirror is configured")]
  NoMirror { url: String },

  #[error("GET {url} returned HTTP {status}")]
  Status { url: Url, status: StatusCode },

  #[error("GET {url} failed: {source}")]
  Transport {
    url: Url,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl FetchError {
  /// Whether another attempt could succeed.
  fn is_transient(&self) -> bool {
    match self {
      FetchError::Transport { .. } => true,
      FetchError::Status { status, .. } => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
      _ => false,
    }
  }
}

/// Fetches artifacts with a bounded number of retries.
///
/// Every request honors the configured timeout. Only transport failures and
/// server errors are retried, with exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct Downloader {
  client: reqwest::Client,
  retries: u32,
  backoff: Duration,
}

impl Downloader {
  pub fn new(timeout: Duration, retries: u32) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("airpack/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(FetchError::Client)?;
    Ok(Self {
      client,
      retries,
      backoff: Duration::from_millis(500),
    })
  }

  /// Set the delay before the first retry; it doubles for each later one.
  pub fn with_backoff(mut self, backoff: Duration) -> Self {
    self.backoff = backoff;
    self
  }

  /// Read a whole (small) resource into memory.
  pub async fn fetch_bytes(&self, location: &Location) -> Result<Vec<u8>, FetchError> {
    match location {
      Location::Local(path) => tokio::fs::read(path).await.map_err(|source| FetchError::Read {
        path: path.clone(),
        source,
      }),
      Location::Remote(url) => {
        self
          .with_retries(url, move || async move {
            let response = self.get(url).await?;
            let bytes = response.bytes().await.map_err(|source| FetchError::Transport {
              url: url.clone(),
              source,
            })?;
            Ok(bytes.to_vec())
          })
          .await
      }
    }
  }

  /// Copy a resource to `dest`, returning the number of bytes written.
  ///
  /// `dest` is truncated before each attempt.
  pub async fn download(&self, location: &Location, dest: &Path) -> Result<u64, FetchError> {
    match location {
      Location::Local(path) => tokio::fs::copy(path, dest).await.map_err(|source| FetchError::Read {
        path: path.clone(),
        source,
      }),
      Location::Remote(url) => {
        self
          .with_retries(url, move || async move {
            let mut response = self.get(url).await?;
            let write_err = |source| FetchError::Write {
              path: dest.to_path_buf(),
              source,
            };
            let mut file = tokio::fs::File::create(dest).await.map_err(write_err)?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await.map_err(|source| FetchError::Transport {
              url: url.clone(),
              source,
            })? {
              file.write_all(&chunk).await.map_err(write_err)?;
              written += chunk.len() as u64;
            }
            file.flush().await.map_err(write_err)?;
            Ok(written)
          })
          .await
      }
    }
  }

  async fn get(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|source| FetchError::Transport {
        url: url.clone(),
        source,
      })?;
    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        url: url.clone(),
        status,
      });
    }
    Ok(response)
  }

  async fn with_retries<T, F, Fut>(&self, url: &Url, mut attempt: F) -> Result<T, FetchError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    let mut delay = self.backoff;
    let mut tries = 0;
    loop {
      match attempt().await {
        Ok(value) => {
          if tries > 0 {
            info!(url = %url, attempts = tries + 1, "fetch succeeded after retry");
          }
          return Ok(value);
        }
        Err(err) if err.is_transient() && tries < self.retries => {
          tries += 1;
          warn!(url = %url, error = %err, attempt = tries, "fetch failed, retrying");
          tokio::time::sleep(delay).await;
          delay = delay.saturating_mul(2);
        }
        Err(err) => {
          debug!(url = %url, attempts = tries + 1, "giving up");
          return Err(err);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn downloader(retries: u32) -> Downloader {
    Downloader::new(Duration::from_secs(5), retries)
      .unwrap()
      .with_backoff(Duration::from_millis(1))
  }

  mod mirrors {
    use super::*;

    #[test]
    fn http_mirror_gets_trailing_slash() {
      let mirror = Mirror::parse("https://mirror.example/simple", None).unwrap();
      assert_eq!(mirror.to_string(), "https://mirror.example/simple/");

      let location = mirror.locate("pkgA/pkgA-1.5.0.zip").unwrap();
      assert_eq!(
        location,
        Location::Remote(Url::parse("https://mirror.example/simple/pkgA/pkgA-1.5.0.zip").unwrap())
      );
    }

    #[test]
    fn directory_mirror_joins_base() {
      let mirror = Mirror::parse("mirror", Some(Path::new("/project"))).unwrap();
      assert_eq!(mirror, Mirror::Directory(PathBuf::from("/project/mirror")));
      assert_eq!(
        mirror.locate("a.zip").unwrap(),
        Location::Local(PathBuf::from("/project/mirror/a.zip"))
      );
    }

    #[test]
    fn absolute_urls_ignore_mirror() {
      let mirror = Mirror::Directory(PathBuf::from("/mirror"));
      assert!(matches!(
        mirror.locate("https://other.example/a.zip").unwrap(),
        Location::Remote(_)
      ));
      assert_eq!(
        locate(None, "file:///srv/a.zip").unwrap(),
        Location::Local(PathBuf::from("/srv/a.zip"))
      );
    }

    #[test]
    fn relative_url_without_mirror_fails() {
      assert!(matches!(locate(None, "a.zip"), Err(FetchError::NoMirror { .. })));
    }

    #[test]
    fn bad_http_mirror_is_rejected() {
      assert!(Mirror::parse("http://exa mple.com", None).is_err());
    }
  }

  mod downloads {
    use super::*;

    #[tokio::test]
    async fn downloads_remote_artifact() {
      let mut server = mockito::Server::new_async().await;
      let mock = server
        .mock("GET", "/pkgA-1.5.0.zip")
        .with_status(200)
        .with_body("artifact bytes")
        .create_async()
        .await;

      let temp = TempDir::new().unwrap();
      let dest = temp.path().join("out.zip");
      let url = Url::parse(&format!("{}/pkgA-1.5.0.zip", server.url())).unwrap();

      let written = downloader(2).download(&Location::Remote(url), &dest).await.unwrap();

      assert_eq!(written, 14);
      assert_eq!(std::fs::read(&dest).unwrap(), b"artifact bytes");
      mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_surface() {
      let mut server = mockito::Server::new_async().await;
      let mock = server
        .mock("GET", "/flaky.zip")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

      let url = Url::parse(&format!("{}/flaky.zip", server.url())).unwrap();
      let err = downloader(2).fetch_bytes(&Location::Remote(url)).await.unwrap_err();

      assert!(matches!(err, FetchError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE));
      mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
      let mut server = mockito::Server::new_async().await;
      let mock = server
        .mock("GET", "/missing.zip")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

      let url = Url::parse(&format!("{}/missing.zip", server.url())).unwrap();
      let err = downloader(2).fetch_bytes(&Location::Remote(url)).await.unwrap_err();

      assert!(matches!(err, FetchError::Status { status, .. } if status == StatusCode::NOT_FOUND));
      mock.assert_async().await;
    }

    #[tokio::test]
    async fn local_locations_are_copied() {
      let temp = TempDir::new().unwrap();
      let src = temp.path().join("src.zip");
      std::fs::write(&src, b"local").unwrap();
      let dest = temp.path().join("dest.zip");

      let d = downloader(0);
      assert_eq!(d.download(&Location::Local(src.clone()), &dest).await.unwrap(), 5);
      assert_eq!(d.fetch_bytes(&Location::Local(src)).await.unwrap(), b"local");

      let missing = d.fetch_bytes(&Location::Local(temp.path().join("nope"))).await;
      assert!(matches!(missing, Err(FetchError::Read { .. })));
    }
  }
}
