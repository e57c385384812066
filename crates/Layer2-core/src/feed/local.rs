//! 로컬 디렉토리 피드

use super::{PackageFeed, VersionIndex, VERSION_INDEX_FILE};
use crate::package::{PackageIdentity, PackageMetadata, PACKAGE_METADATA_FILE};
use async_trait::async_trait;
use kiln_foundation::{Error, Result};
use semver::Version;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// HTTP 피드와 같은 레이아웃의 디렉토리
pub struct LocalFeed {
    root: PathBuf,
    name: String,
}

impl LocalFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self { root, name }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.root
            .join(identity.key())
            .join(identity.version.to_string())
    }

    /// 파일 읽기, 없으면 None
    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PackageFeed for LocalFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<Version>> {
        let path = self
            .root
            .join(crate::package::normalize_name(package))
            .join(VERSION_INDEX_FILE);

        match Self::read_optional(&path).await? {
            Some(bytes) => {
                let index: VersionIndex = serde_json::from_slice(&bytes)?;
                Ok(index.parsed())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn metadata(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>> {
        let path = self.version_dir(identity).join(PACKAGE_METADATA_FILE);

        match Self::read_optional(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn download(&self, identity: &PackageIdentity) -> Result<Vec<u8>> {
        let path = self.version_dir(identity).join(identity.archive_name());

        Self::read_optional(&path)
            .await
            .map_err(|e| Error::download(identity.to_string(), e.to_string()))?
            .ok_or_else(|| {
                Error::download(
                    identity.to_string(),
                    format!("artifact missing: {}", path.display()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(root: &Path, meta: &PackageMetadata, archive: &[u8]) {
        let identity = meta.identity();
        let package_dir = root.join(identity.key());
        let version_dir = package_dir.join(identity.version.to_string());
        std::fs::create_dir_all(&version_dir).unwrap();

        let index_path = package_dir.join(VERSION_INDEX_FILE);
        let mut index: VersionIndex = std::fs::read(&index_path)
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
            .unwrap_or_default();
        index.versions.push(identity.version.to_string());
        std::fs::write(&index_path, serde_json::to_vec(&index).unwrap()).unwrap();

        std::fs::write(
            version_dir.join(PACKAGE_METADATA_FILE),
            serde_json::to_vec(meta).unwrap(),
        )
        .unwrap();
        std::fs::write(version_dir.join(identity.archive_name()), archive).unwrap();
    }

    #[tokio::test]
    async fn test_local_feed_roundtrip() {
        let temp = TempDir::new().unwrap();
        let meta = PackageMetadata::new("SamplePlugin", Version::new(1, 2, 0));
        write_package(temp.path(), &meta, b"zip-bytes");

        let feed = LocalFeed::new(temp.path());
        let versions = feed.list_versions("sampleplugin").await.unwrap();
        assert_eq!(versions, vec![Version::new(1, 2, 0)]);

        let id = meta.identity();
        let fetched = feed.metadata(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, "SamplePlugin");

        assert_eq!(feed.download(&id).await.unwrap(), b"zip-bytes");
    }

    #[tokio::test]
    async fn test_missing_package_is_empty() {
        let temp = TempDir::new().unwrap();
        let feed = LocalFeed::new(temp.path());

        assert!(feed.list_versions("Nope").await.unwrap().is_empty());

        let id = PackageIdentity::new("Nope", Version::new(1, 0, 0));
        assert!(feed.metadata(&id).await.unwrap().is_none());
        assert!(matches!(
            feed.download(&id).await,
            Err(Error::Download { .. })
        ));
    }
}
