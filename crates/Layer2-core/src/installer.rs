//! Artifact Installer - 해석된 패키지를 플러그인 디렉토리에 풀기
//!
//! ```text
//! {plugins_root}/{plugin_id}/            ← 플러그인 자체 패키지 (경로 유지)
//! {plugins_root}/{plugin_id}/dl/         ← 나머지 의존성 (파일 이름만)
//! {plugins_root}/{plugin_id}/.kiln/      ← 설치 마커
//! ```
//!
//! 마커와 마커에 기록된 파일이 모두 있으면 다운로드/압축 해제를 건너뜁니다.
//! 설치기는 파일을 삭제하지 않습니다.

use crate::feed::PackageRegistryClient;
use crate::package::{normalize_name, DependencyNode, PackageIdentity, PACKAGE_METADATA_FILE};
use chrono::{DateTime, Utc};
use kiln_foundation::{Error, Result};
use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 의존성 디렉토리 이름
pub const DEPENDENCY_DIR: &str = "dl";

/// 설치 마커 디렉토리 이름
pub const MARKER_DIR: &str = ".kiln";

/// 설치 마커
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallMarker {
    pub package: String,
    pub version: Version,

    /// 플러그인 디렉토리 기준 상대 경로
    pub files: Vec<PathBuf>,

    pub installed_at: DateTime<Utc>,
}

/// 설치 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub plugin_dir: PathBuf,

    /// 이번에 압축을 푼 패키지
    pub extracted: Vec<PackageIdentity>,

    /// 마커로 확인되어 건너뛴 패키지
    pub up_to_date: Vec<PackageIdentity>,
}

impl InstallReport {
    pub fn total(&self) -> usize {
        self.extracted.len() + self.up_to_date.len()
    }
}

// ============================================================================
// ArtifactInstaller
// ============================================================================

/// 아티팩트 설치기
pub struct ArtifactInstaller {
    client: Arc<PackageRegistryClient>,
    plugins_root: PathBuf,

    /// 대상 디렉토리별 압축 해제 직렬화
    dir_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactInstaller {
    pub fn new(client: Arc<PackageRegistryClient>, plugins_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            plugins_root: plugins_root.into(),
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    pub fn plugin_dir(&self, plugin_id: &str) -> PathBuf {
        self.plugins_root.join(plugin_id)
    }

    /// 해석된 패키지 집합 설치
    pub async fn install(
        &self,
        resolved: &[DependencyNode],
        plugin_id: &str,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let plugin_dir = self.plugin_dir(plugin_id);
        let plugin_key = normalize_name(plugin_id);

        let mut report = InstallReport {
            plugin_dir: plugin_dir.clone(),
            ..Default::default()
        };

        for node in resolved {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let identity = &node.identity;
            let is_root = node.key() == plugin_key;
            let marker_path = plugin_dir
                .join(MARKER_DIR)
                .join(format!("{}.json", identity.file_stem()));

            if marker_is_valid(&marker_path, &plugin_dir).await {
                debug!("{} already installed for {}", identity, plugin_id);
                report.up_to_date.push(identity.clone());
                continue;
            }

            let archive = self.client.fetch_artifact(node.source, identity).await?;

            let target = if is_root {
                plugin_dir.clone()
            } else {
                plugin_dir.join(DEPENDENCY_DIR)
            };

            let lock = self.dir_lock(&target);
            let _guard = lock.lock().await;

            let files = {
                let archive = archive.clone();
                let target = target.clone();
                let package = identity.to_string();
                tokio::task::spawn_blocking(move || {
                    extract_archive(&archive, &target, !is_root, &package)
                })
                .await
                .map_err(|e| Error::Internal(format!("extraction task failed: {}", e)))??
            };

            let prefix = if is_root { PathBuf::new() } else { PathBuf::from(DEPENDENCY_DIR) };
            let marker = InstallMarker {
                package: identity.name.clone(),
                version: identity.version.clone(),
                files: files.iter().map(|f| prefix.join(f)).collect(),
                installed_at: Utc::now(),
            };
            write_marker(&marker_path, &marker).await?;

            info!(
                "Installed {} into {} ({} files)",
                identity,
                target.display(),
                marker.files.len()
            );
            report.extracted.push(identity.clone());
        }

        Ok(report)
    }

    fn dir_lock(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.dir_locks
            .lock()
            .entry(dir.to_path_buf())
            .or_default()
            .clone()
    }
}

// ============================================================================
// 마커
// ============================================================================

async fn marker_is_valid(marker_path: &Path, plugin_dir: &Path) -> bool {
    let Ok(bytes) = tokio::fs::read(marker_path).await else {
        return false;
    };

    let marker: InstallMarker = match serde_json::from_slice(&bytes) {
        Ok(marker) => marker,
        Err(e) => {
            warn!("Ignoring corrupt install marker {}: {}", marker_path.display(), e);
            return false;
        }
    };

    for file in &marker.files {
        if !tokio::fs::try_exists(plugin_dir.join(file))
            .await
            .unwrap_or(false)
        {
            debug!("Installed file missing: {}", file.display());
            return false;
        }
    }

    true
}

async fn write_marker(path: &Path, marker: &InstallMarker) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_vec_pretty(marker)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

// ============================================================================
// 압축 해제 (blocking)
// ============================================================================

/// zip 아카이브를 대상 디렉토리에 풀고, 대상 기준 상대 경로 목록을 반환
fn extract_archive(archive: &Path, target: &Path, flatten: bool, package: &str) -> Result<Vec<PathBuf>> {
    let zip_error = |e: zip::result::ZipError| Error::download(package, e.to_string());

    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_error)?;
    std::fs::create_dir_all(target)?;

    let mut files = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_error)?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping unsafe archive entry {} in {}", entry.name(), package);
            continue;
        };

        if relative == Path::new(PACKAGE_METADATA_FILE) {
            continue;
        }

        let relative = if flatten {
            match relative.file_name() {
                Some(name) => PathBuf::from(name),
                None => continue,
            }
        } else {
            relative
        };

        let destination = target.join(&relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // 매핑된 모듈을 제자리에서 자르지 않도록 옆 파일에 쓴 뒤 교체
        let staging = staging_path(&destination);
        let mut output = std::fs::File::create(&staging)?;
        std::io::copy(&mut entry, &mut output)?;
        drop(output);
        std::fs::rename(&staging, &destination)?;
        files.push(relative);
    }

    Ok(files)
}

/// 같은 디렉토리의 임시 파일 경로 (`.{name}.partial`)
fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.partial", name))
}
