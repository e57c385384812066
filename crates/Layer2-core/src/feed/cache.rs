//! Artifact Cache - 아티팩트 로컬 캐시
//!
//! `{cache_dir}/{name}/{name}.{version}.kpkg` 에 저장합니다.
//! 임시 파일에 쓴 뒤 rename 하므로 중단된 다운로드가 캐시 항목으로 남지 않습니다.

use crate::package::PackageIdentity;
use kiln_foundation::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 아이덴티티별 아티팩트 캐시
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 캐시 경로 (존재 여부와 무관)
    pub fn path_for(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join(identity.key()).join(identity.archive_name())
    }

    /// 캐시된 아티팩트 경로
    pub async fn get(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        let path = self.path_for(identity);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// 아티팩트 저장
    pub async fn store(&self, identity: &PackageIdentity, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(identity);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = path.with_extension(format!("{}.partial", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp, bytes).await?;

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!("Cached {} ({} bytes)", identity, bytes.len());
        Ok(path)
    }
}
