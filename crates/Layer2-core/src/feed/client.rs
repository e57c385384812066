//! Package Registry Client - 여러 피드 + 아티팩트 캐시

use super::{ArtifactCache, FeedSource, PackageFeed};
use crate::package::{PackageIdentity, PackageMetadata};
use kiln_foundation::{Error, Result};
use parking_lot::Mutex;
use semver::Version;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 순서가 있는 피드 목록과 공유 아티팩트 캐시
pub struct PackageRegistryClient {
    feeds: Vec<Arc<dyn PackageFeed>>,
    cache: ArtifactCache,

    /// 같은 아티팩트의 동시 다운로드 방지
    downloads: Mutex<HashMap<PackageIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl PackageRegistryClient {
    pub fn new(feeds: Vec<Arc<dyn PackageFeed>>, cache: ArtifactCache) -> Self {
        Self {
            feeds,
            cache,
            downloads: Mutex::new(HashMap::new()),
        }
    }

    /// 설정 문자열에서 생성
    pub fn from_sources(sources: &[String], cache_dir: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::new();
        let feeds = sources
            .iter()
            .filter_map(|s| {
                let parsed = FeedSource::parse(s);
                if parsed.is_none() {
                    warn!("Ignoring empty feed entry");
                }
                parsed
            })
            .map(|source| source.open(&http))
            .collect();

        Self::new(feeds, ArtifactCache::new(cache_dir))
    }

    pub fn feeds(&self) -> &[Arc<dyn PackageFeed>] {
        &self.feeds
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    fn feed(&self, source: usize) -> Result<&Arc<dyn PackageFeed>> {
        self.feeds
            .get(source)
            .ok_or_else(|| Error::Internal(format!("no feed at index {}", source)))
    }

    /// 특정 피드의 버전 목록
    pub async fn list_versions(&self, source: usize, package: &str) -> Result<Vec<Version>> {
        self.feed(source)?.list_versions(package).await
    }

    /// 특정 피드의 메타데이터
    pub async fn metadata(
        &self,
        source: usize,
        identity: &PackageIdentity,
    ) -> Result<Option<PackageMetadata>> {
        self.feed(source)?.metadata(identity).await
    }

    /// 아티팩트 경로 (캐시 우선, 없으면 다운로드)
    pub async fn fetch_artifact(&self, source: usize, identity: &PackageIdentity) -> Result<PathBuf> {
        let lock = self
            .downloads
            .lock()
            .entry(identity.clone())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        if let Some(path) = self.cache.get(identity).await {
            debug!("Artifact cache hit: {}", identity);
            return Ok(path);
        }

        let feed = self.feed(source)?;
        info!("Downloading {} from {}", identity, feed.name());

        let bytes = feed.download(identity).await.map_err(|e| match e {
            Error::Download { .. } => e,
            other => Error::download(identity.to_string(), other.to_string()),
        })?;

        self.cache
            .store(identity, &bytes)
            .await
            .map_err(|e| Error::download(identity.to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::MemoryFeed;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_uses_cache() {
        let temp = TempDir::new().unwrap();
        let feed = Arc::new(MemoryFeed::new("mem"));
        let meta = PackageMetadata::new("Json", Version::new(1, 0, 0));
        feed.add_with_archive(meta.clone(), b"archive".to_vec());

        let client = PackageRegistryClient::new(
            vec![feed.clone() as Arc<dyn PackageFeed>],
            ArtifactCache::new(temp.path()),
        );

        let first = client.fetch_artifact(0, &meta.identity()).await.unwrap();
        let second = client.fetch_artifact(0, &meta.identity()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(feed.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_download_error() {
        let temp = TempDir::new().unwrap();
        let client = PackageRegistryClient::new(
            vec![Arc::new(MemoryFeed::new("mem")) as Arc<dyn PackageFeed>],
            ArtifactCache::new(temp.path()),
        );

        let id = PackageIdentity::new("Ghost", Version::new(1, 0, 0));
        let err = client.fetch_artifact(0, &id).await.unwrap_err();
        assert!(err.is_retryable());

        assert!(client.list_versions(3, "Ghost").await.is_err());
    }

    #[test]
    fn test_from_sources() {
        let client = PackageRegistryClient::from_sources(
            &["https://feed.example.com".into(), "./local".into()],
            "/tmp/kiln-cache",
        );
        assert_eq!(client.feeds().len(), 2);
        assert_eq!(client.feeds()[0].name(), "https://feed.example.com");
    }
}
