//! Host Libraries - 호스트가 이미 가지고 있는 라이브러리 스냅샷
//!
//! 호스트 실행 파일 옆의 `host-libraries.json` 과 실제로 존재하는 동적 라이브러리 파일로
//! 구성됩니다. 프로세스당 한 번 계산되어 읽기 전용으로 공유됩니다.

use crate::package::{is_prerelease, normalize_name, PackageDependency};
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// 호스트 라이브러리 목록 파일
pub const HOST_LIBRARIES_FILE: &str = "host-libraries.json";

/// 플러그인 계약을 정의하는 라이브러리 이름
pub const CONTRACT_LIBRARY: &str = "kiln-core";

static PROCESS_LIBRARIES: OnceLock<Arc<HostLibraries>> = OnceLock::new();

/// 의존성 엣지에 대한 호스트 제공 여부
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSupply {
    /// 호스트가 제공 (엣지 제거)
    Supplied,
    /// 같은 이름이 있지만 범위를 만족하지 않음
    Conflict(Version),
    /// 호스트에 없음
    Absent,
}

#[derive(Debug, Deserialize)]
struct HostLibraryFile {
    #[serde(default)]
    libraries: Vec<HostLibraryEntry>,
}

#[derive(Debug, Deserialize)]
struct HostLibraryEntry {
    name: String,
    version: Version,
}

/// 호스트 라이브러리 스냅샷
#[derive(Debug, Clone, Default)]
pub struct HostLibraries {
    libraries: HashMap<String, (String, Version)>,
    host_dir: Option<PathBuf>,
}

impl HostLibraries {
    /// 빈 스냅샷
    pub fn empty() -> Self {
        Self::default()
    }

    /// 명시적 목록으로 생성
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Version)>,
        S: Into<String>,
    {
        let libraries = entries
            .into_iter()
            .map(|(name, version)| {
                let name = name.into();
                (normalize_name(&name), (name, version))
            })
            .collect();

        Self {
            libraries,
            host_dir: None,
        }
    }

    /// 물리 파일 검사에 사용할 호스트 디렉토리 지정
    pub fn with_host_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_dir = Some(dir.into());
        self
    }

    /// 호스트 디렉토리에서 스냅샷 생성
    pub fn detect(host_dir: &Path) -> Self {
        let mut entries = vec![(
            CONTRACT_LIBRARY.to_string(),
            Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0)),
        )];

        let manifest = host_dir.join(HOST_LIBRARIES_FILE);
        match std::fs::read(&manifest) {
            Ok(bytes) => match serde_json::from_slice::<HostLibraryFile>(&bytes) {
                Ok(file) => {
                    entries.extend(file.libraries.into_iter().map(|e| (e.name, e.version)));
                }
                Err(e) => warn!("Ignoring malformed {}: {}", manifest.display(), e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read {}: {}", manifest.display(), e),
        }

        let snapshot = Self::from_entries(entries).with_host_dir(host_dir);
        debug!(
            "Host library snapshot: {} entries from {}",
            snapshot.len(),
            host_dir.display()
        );
        snapshot
    }

    /// 프로세스 전역 스냅샷 (최초 호출 시 한 번 계산)
    pub fn process() -> Arc<HostLibraries> {
        PROCESS_LIBRARIES
            .get_or_init(|| {
                let host_dir = std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
                    .unwrap_or_else(|| PathBuf::from("."));
                Arc::new(Self::detect(&host_dir))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// 이름으로 호스트 버전 조회
    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.libraries.get(&normalize_name(name)).map(|(_, v)| v)
    }

    /// 의존성 엣지를 호스트가 만족시키는지 판정
    ///
    /// - 호스트 버전이 프리릴리스면 범위와 무관하게 호스트가 이깁니다.
    /// - 호스트 버전이 범위를 만족하면 제공됩니다.
    /// - 메타데이터가 없으면 호스트 디렉토리에 같은 이름의 라이브러리 파일이 있는지 봅니다.
    pub fn supplies(&self, dependency: &PackageDependency) -> HostSupply {
        if let Some(version) = self.version_of(&dependency.name) {
            if is_prerelease(version) || dependency.range.matches(version, true) {
                return HostSupply::Supplied;
            }
            return HostSupply::Conflict(version.clone());
        }

        if self.has_library_file(&dependency.name) {
            return HostSupply::Supplied;
        }

        HostSupply::Absent
    }

    fn has_library_file(&self, name: &str) -> bool {
        let Some(dir) = &self.host_dir else {
            return false;
        };

        library_file_names(name)
            .iter()
            .any(|file| dir.join(file).is_file())
    }
}

/// 라이브러리 이름에 대한 플랫폼별 파일 이름 후보
pub fn library_file_names(name: &str) -> Vec<String> {
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};

    let mut names = vec![
        format!("{}{}", name, DLL_SUFFIX),
        format!("{}{}{}", DLL_PREFIX, name, DLL_SUFFIX),
    ];

    let snake = name.replace(['-', '.'], "_");
    if snake != name {
        names.push(format!("{}{}{}", DLL_PREFIX, snake, DLL_SUFFIX));
    }

    names.dedup();
    names
}
