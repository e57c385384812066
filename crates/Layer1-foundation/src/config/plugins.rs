//! Plugins Config - 플러그인 활성화/피드 설정
//!
//! 글로벌 + 프로젝트 `plugins.json`을 병합한 뒤 환경 변수로 덮어씁니다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// 설정 파일명
pub const PLUGINS_CONFIG_FILE: &str = "plugins.json";

/// 플러그인 루트를 덮어쓰는 환경 변수
pub const ENV_PLUGINS_ROOT: &str = "KILN_PLUGINS_ROOT";

/// 피드 목록을 덮어쓰는 환경 변수 (`;` 구분)
pub const ENV_FEEDS: &str = "KILN_FEEDS";

const DEFAULT_MAX_CONCURRENT_INSTALLS: usize = 4;

// ============================================================================
// HostConflictPolicy
// ============================================================================

/// 호스트가 같은 이름의 라이브러리를 가지고 있지만 요구 범위를 만족하지 못할 때의 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostConflictPolicy {
    /// 플러그인을 거부 (ResolutionConflict)
    #[default]
    Reject,

    /// 플러그인 전용 사본을 dl/ 에 설치
    Private,
}

// ============================================================================
// PluginsConfig
// ============================================================================

/// 플러그인 시스템 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    /// 활성화된 플러그인 (이름 -> 버전 제약)
    #[serde(default)]
    pub enabled_plugins: BTreeMap<String, Option<String>>,

    /// 비활성화된 플러그인 (해석 작업 전에 확인)
    #[serde(default)]
    pub disabled_plugins: Vec<String>,

    /// 패키지 피드 (URL 또는 로컬 경로, 순서대로 시도)
    #[serde(default)]
    pub feeds: Vec<String>,

    /// 프리릴리스 허용 여부
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_prerelease: Option<bool>,

    /// 런타임 타겟 디스크립터
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// 플러그인 설치 루트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_root: Option<PathBuf>,

    /// 아티팩트 캐시 디렉토리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// 호스트 라이브러리 충돌 정책
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_conflict_policy: Option<HostConflictPolicy>,

    /// 동시에 처리할 플러그인 수
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_installs: Option<usize>,
}

impl PluginsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드 후 환경 변수 적용
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<PluginsConfig>(PLUGINS_CONFIG_FILE)? {
                debug!("Loaded global plugin config from {}", global.base_dir().display());
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<PluginsConfig>(PLUGINS_CONFIG_FILE)?
            {
                debug!("Loaded project plugin config from {}", project.base_dir().display());
                config.merge(project_config);
            }
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// 특정 저장소에서만 로드
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        let config = store
            .load_optional::<PluginsConfig>(PLUGINS_CONFIG_FILE)?
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// 환경 변수 덮어쓰기
    pub fn apply_env(&mut self) {
        if let Ok(root) = std::env::var(ENV_PLUGINS_ROOT) {
            if !root.trim().is_empty() {
                debug!("{} overrides plugins root: {}", ENV_PLUGINS_ROOT, root);
                self.plugins_root = Some(PathBuf::from(root));
            }
        }
        if let Ok(feeds) = std::env::var(ENV_FEEDS) {
            let feeds: Vec<String> = feeds
                .split(';')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            if !feeds.is_empty() {
                self.feeds = feeds;
            }
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.feeds.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::Config("feed entries must not be empty".into()));
        }
        if self.max_concurrent_installs == Some(0) {
            return Err(Error::Config(
                "maxConcurrentInstalls must be at least 1".into(),
            ));
        }
        if let Some(name) = self.enabled_plugins.keys().find(|n| n.trim().is_empty()) {
            return Err(Error::Config(format!("invalid plugin name: {:?}", name)));
        }
        if let Some(name) = self.enabled_plugins.keys().find(|n| !is_plain_name(n)) {
            return Err(Error::InvalidInput(format!(
                "plugin name {:?} must be a single directory name",
                name
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: PluginsConfig) {
        self.enabled_plugins.extend(other.enabled_plugins);

        for name in other.disabled_plugins {
            if !self.is_disabled(&name) {
                self.disabled_plugins.push(name);
            }
        }

        if !other.feeds.is_empty() {
            self.feeds = other.feeds;
        }
        if other.allow_prerelease.is_some() {
            self.allow_prerelease = other.allow_prerelease;
        }
        if other.target.is_some() {
            self.target = other.target;
        }
        if other.plugins_root.is_some() {
            self.plugins_root = other.plugins_root;
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir;
        }
        if other.host_conflict_policy.is_some() {
            self.host_conflict_policy = other.host_conflict_policy;
        }
        if other.max_concurrent_installs.is_some() {
            self.max_concurrent_installs = other.max_concurrent_installs;
        }
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    /// 비활성화 목록에 있는지 확인 (대소문자 무시)
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_plugins
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    }

    /// 활성화되어 있고 비활성화 목록에 없는 플러그인
    pub fn active_plugins(&self) -> Vec<(String, Option<String>)> {
        self.enabled_plugins
            .iter()
            .filter(|(name, _)| !self.is_disabled(name))
            .map(|(name, constraint)| (name.clone(), constraint.clone()))
            .collect()
    }

    pub fn allow_prerelease(&self) -> bool {
        self.allow_prerelease.unwrap_or(false)
    }

    pub fn conflict_policy(&self) -> HostConflictPolicy {
        self.host_conflict_policy.unwrap_or_default()
    }

    pub fn max_concurrent_installs(&self) -> usize {
        self.max_concurrent_installs
            .unwrap_or(DEFAULT_MAX_CONCURRENT_INSTALLS)
            .max(1)
    }

    /// 플러그인 루트 (기본: {data_dir}/kiln/plugins)
    pub fn plugins_root(&self) -> PathBuf {
        self.plugins_root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiln")
                .join("plugins")
        })
    }

    /// 아티팩트 캐시 (기본: {cache_dir}/kiln/packages)
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiln")
                .join("packages")
        })
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn enable(mut self, name: impl Into<String>, constraint: Option<&str>) -> Self {
        self.enabled_plugins
            .insert(name.into(), constraint.map(String::from));
        self
    }

    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled_plugins.push(name.into());
        self
    }

    pub fn feed(mut self, feed: impl Into<String>) -> Self {
        self.feeds.push(feed.into());
        self
    }

    pub fn with_plugins_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.plugins_root = Some(root.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_prerelease(mut self, allow: bool) -> Self {
        self.allow_prerelease = Some(allow);
        self
    }

    pub fn with_conflict_policy(mut self, policy: HostConflictPolicy) -> Self {
        self.host_conflict_policy = Some(policy);
        self
    }
}

/// 플러그인 루트 아래 한 단계 디렉토리 이름으로만 쓰일 수 있는지
fn is_plain_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
