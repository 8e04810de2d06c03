use tracing::{info, warn};

use super::ResolveError;
use crate::cache::ArtifactCache;
use crate::config::BuildConfig;
use crate::consts::INDEX_FILENAME;
use crate::fetch::Downloader;
use crate::index::PackageIndex;

/// Load the index snapshot a build resolves against.
///
/// An explicit index file wins. Otherwise the mirror's `index.json` is
/// fetched and cached; when the mirror cannot be reached the last cached
/// snapshot is used instead. Failing all of these is `NetworkUnavailable`.
pub async fn load_index(
  config: &BuildConfig,
  cache: &ArtifactCache,
  downloader: &Downloader,
) -> Result<PackageIndex, ResolveError> {
  if let Some(path) = &config.index {
    let bytes = tokio::fs::read(path).await.map_err(|source| ResolveError::IndexFile {
      path: path.clone(),
      source,
    })?;
    let index = PackageIndex::from_json(&bytes)?;
    info!(path = %path.display(), packages = index.package_count(), "loaded index snapshot");
    return Ok(index);
  }

  let failure = match &config.mirror {
    Some(mirror) => {
      let fetched = match mirror.locate(INDEX_FILENAME) {
        Ok(location) => downloader.fetch_bytes(&location).await,
        Err(e) => Err(e),
      };
      match fetched {
        Ok(bytes) => {
          let index = PackageIndex::from_json(&bytes)?;
          if let Err(e) = cache.store_index(&bytes) {
            warn!(error = %e, "could not cache index snapshot");
          }
          info!(mirror = %mirror, packages = index.package_count(), "fetched index snapshot");
          return Ok(index);
        }
        Err(e) => ResolveError::NetworkUnavailable {
          source_desc: mirror.to_string(),
          reason: e.to_string(),
        },
      }
    }
    None => ResolveError::NetworkUnavailable {
      source_desc: "configuration".to_string(),
      reason: "no mirror or index snapshot configured".to_string(),
    },
  };

  match cache.cached_index() {
    Ok(Some(bytes)) => {
      warn!(error = %failure, "using cached index snapshot");
      Ok(PackageIndex::from_json(&bytes)?)
    }
    _ => Err(failure),
  }
}
