//! Package - 패키지 식별자, 의존성, 메타데이터
//!
//! 피드 프로토콜과 해석기가 공유하는 데이터 모델입니다.

mod version;

pub use version::{is_prerelease, VersionRange};

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 패키지 메타데이터 파일 이름 (피드 및 아카이브 내부)
pub const PACKAGE_METADATA_FILE: &str = "kiln.json";

/// 패키지 아카이브 확장자
pub const PACKAGE_EXTENSION: &str = "kpkg";

/// 대상 디스크립터와 무관하게 적용되는 의존성 그룹
pub const ANY_TARGET: &str = "any";

/// 패키지 이름 정규화 (피드 경로, 맵 키)
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

// ============================================================================
// PackageIdentity
// ============================================================================

/// 패키지 식별자 (이름 + 버전)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub name: String,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// 정규화된 이름
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// 파일 이름에 쓰는 형태 ("name.1.2.0")
    pub fn file_stem(&self) -> String {
        format!("{}.{}", self.key(), self.version)
    }

    /// 아카이브 파일 이름 ("name.1.2.0.kpkg")
    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.file_stem(), PACKAGE_EXTENSION)
    }

    pub fn is_prerelease(&self) -> bool {
        is_prerelease(&self.version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

// ============================================================================
// PackageDependency
// ============================================================================

/// 의존성 엣지 (이름 + 버전 범위)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    #[serde(rename = "id")]
    pub name: String,

    #[serde(default)]
    pub range: VersionRange,
}

impl PackageDependency {
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }

    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.range)
    }
}

// ============================================================================
// DependencyNode
// ============================================================================

/// 의존성 그래프의 노드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub identity: PackageIdentity,

    /// 피드에 공개 목록으로 올라가 있는지
    pub listed: bool,

    /// 이 버전을 찾은 피드의 인덱스
    pub source: usize,

    /// 호스트가 제공하지 않는 의존성만 기록
    pub dependencies: Vec<PackageDependency>,

    /// 호스트 라이브러리와 충돌해 선택할 수 없는 후보 (`reject` 정책)
    pub host_conflict: Option<String>,
}

impl DependencyNode {
    pub fn new(identity: PackageIdentity, source: usize) -> Self {
        Self {
            identity,
            listed: true,
            source,
            dependencies: Vec::new(),
            host_conflict: None,
        }
    }

    pub fn with_dependency(mut self, dependency: PackageDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn unlisted(mut self) -> Self {
        self.listed = false;
        self
    }

    pub fn with_host_conflict(mut self, reason: impl Into<String>) -> Self {
        self.host_conflict = Some(reason.into());
        self
    }

    pub fn key(&self) -> String {
        self.identity.key()
    }
}

// ============================================================================
// PackageMetadata (kiln.json)
// ============================================================================

/// 타겟별 의존성 그룹
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGroup {
    pub target: String,

    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// 피드가 제공하는 패키지 메타데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub id: String,

    pub version: Version,

    #[serde(default = "default_true")]
    pub listed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 타겟과 무관한 의존성
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,

    /// 타겟별 의존성
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

fn default_true() -> bool {
    true
}

impl PackageMetadata {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            listed: true,
            description: None,
            dependencies: Vec::new(),
            dependency_groups: Vec::new(),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    pub fn with_dependency(mut self, name: impl Into<String>, range: VersionRange) -> Self {
        self.dependencies.push(PackageDependency::new(name, range));
        self
    }

    pub fn with_group(mut self, group: DependencyGroup) -> Self {
        self.dependency_groups.push(group);
        self
    }

    /// 대상 디스크립터에 맞는 의존성 선택
    ///
    /// 정확히 일치하는 그룹 → `any` 그룹 → 평면 목록 순으로 찾습니다.
    pub fn dependencies_for(&self, target: &str) -> Vec<PackageDependency> {
        let group = self
            .dependency_groups
            .iter()
            .find(|g| g.target.eq_ignore_ascii_case(target))
            .or_else(|| {
                self.dependency_groups
                    .iter()
                    .find(|g| g.target.eq_ignore_ascii_case(ANY_TARGET))
            });

        match group {
            Some(group) => group.dependencies.clone(),
            None => self.dependencies.clone(),
        }
    }
}
