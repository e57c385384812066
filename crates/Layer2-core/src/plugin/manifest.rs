//! Plugin Manifest - 플러그인 메타데이터 정의

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 플러그인 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// 고유 플러그인 ID (예: "SamplePlugin")
    pub id: String,

    /// 표시 이름
    pub display_name: String,

    pub version: Version,

    #[serde(default)]
    pub description: String,

    /// 목록/도움말에 노출하지 않음
    #[serde(default)]
    pub stealth_mode: bool,

    /// 제공하는 기능 목록
    #[serde(default)]
    pub provides: PluginProvides,

    /// 추가 메타데이터
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PluginManifest {
    /// 새 매니페스트 생성 (버전 1.0.0)
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            version: Version::new(1, 0, 0),
            description: String::new(),
            stealth_mode: false,
            provides: PluginProvides::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// 빌더 패턴: 버전 설정
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// 빌더 패턴: 설명 설정
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 빌더 패턴: 숨김 모드
    pub fn stealth(mut self) -> Self {
        self.stealth_mode = true;
        self
    }

    /// 빌더 패턴: 제공 기능 설정
    pub fn with_provides(mut self, provides: PluginProvides) -> Self {
        self.provides = provides;
        self
    }

    /// 빌더 패턴: 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 플러그인이 제공하는 기능 목록
///
/// 명령 등록기와 웹 API 등록기가 로드/언로드 이벤트에서 참조합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginProvides {
    /// 채팅 명령 이름들
    #[serde(default)]
    pub commands: Vec<String>,

    /// 웹 API 엔드포인트 경로들
    #[serde(default)]
    pub web_endpoints: Vec<String>,
}

impl PluginProvides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn with_web_endpoint(mut self, path: impl Into<String>) -> Self {
        self.web_endpoints.push(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.web_endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_builder() {
        let manifest = PluginManifest::new("SamplePlugin", "Sample")
            .with_version(Version::new(1, 2, 0))
            .with_description("Sample plugin")
            .stealth()
            .with_provides(
                PluginProvides::new()
                    .with_command("roll")
                    .with_web_endpoint("/api/sample"),
            )
            .with_metadata("author", "kiln");

        assert_eq!(manifest.version, Version::new(1, 2, 0));
        assert!(manifest.stealth_mode);
        assert_eq!(manifest.provides.commands, vec!["roll"]);
        assert!(!manifest.provides.is_empty());
    }

    #[test]
    fn test_manifest_serde() {
        let manifest = PluginManifest::new("SamplePlugin", "Sample");
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["displayName"], "Sample");
        assert_eq!(json["version"], "1.0.0");

        let parsed: PluginManifest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
