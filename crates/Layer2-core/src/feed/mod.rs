//! # Package Feeds
//!
//! 패키지 피드(레지스트리) 클라이언트
//!
//! ## 피드 레이아웃
//!
//! ```text
//! {feed}/{name}/index.json                      → {"versions": ["1.0.0", ...]}
//! {feed}/{name}/{version}/kiln.json             → PackageMetadata
//! {feed}/{name}/{version}/{name}.{version}.kpkg → zip 아카이브
//! ```
//!
//! HTTP 피드와 로컬 디렉토리 피드가 같은 레이아웃을 사용합니다.
//! 여러 피드는 설정 순서대로 시도되며, 패키지마다 처음으로 만족하는 피드가 이깁니다.

mod cache;
mod client;
mod http;
mod local;

pub use cache::ArtifactCache;
pub use client::PackageRegistryClient;
pub use http::HttpFeed;
pub use local::LocalFeed;

use crate::package::{PackageIdentity, PackageMetadata};
use async_trait::async_trait;
use kiln_foundation::Result;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// 버전 인덱스 파일 이름
pub const VERSION_INDEX_FILE: &str = "index.json";

/// `index.json` 구조
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionIndex {
    #[serde(default)]
    pub versions: Vec<String>,
}

impl VersionIndex {
    /// 파싱 가능한 버전만 반환
    pub fn parsed(&self) -> Vec<Version> {
        self.versions
            .iter()
            .filter_map(|v| match Version::parse(v) {
                Ok(version) => Some(version),
                Err(e) => {
                    tracing::debug!("Ignoring unparsable version {}: {}", v, e);
                    None
                }
            })
            .collect()
    }
}

// ============================================================================
// PackageFeed Trait
// ============================================================================

/// 패키지 피드 인터페이스
#[async_trait]
pub trait PackageFeed: Send + Sync {
    /// 피드 이름 (로그용)
    fn name(&self) -> &str;

    /// 패키지의 모든 버전 (없으면 빈 목록)
    async fn list_versions(&self, package: &str) -> Result<Vec<Version>>;

    /// 특정 버전의 메타데이터 (없으면 None)
    async fn metadata(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>>;

    /// 아티팩트 다운로드
    async fn download(&self, identity: &PackageIdentity) -> Result<Vec<u8>>;
}

// ============================================================================
// FeedSource - 피드 설정 문자열
// ============================================================================

/// 설정의 피드 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// HTTP(S) 피드
    Url(String),
    /// 로컬 디렉토리 피드
    Local(PathBuf),
}

impl FeedSource {
    /// 피드 문자열 파싱
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            Some(FeedSource::Url(source.to_string()))
        } else if let Some(path) = source.strip_prefix("file://") {
            Some(FeedSource::Local(PathBuf::from(path)))
        } else {
            Some(FeedSource::Local(PathBuf::from(source)))
        }
    }

    /// 피드 인스턴스 생성
    pub fn open(&self, client: &reqwest::Client) -> Arc<dyn PackageFeed> {
        match self {
            FeedSource::Url(url) => Arc::new(HttpFeed::with_client(url.clone(), client.clone())),
            FeedSource::Local(path) => Arc::new(LocalFeed::new(path.clone())),
        }
    }
}

// ============================================================================
// 테스트 헬퍼
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_source() {
        assert_eq!(
            FeedSource::parse("https://feed.example.com/v1"),
            Some(FeedSource::Url("https://feed.example.com/v1".into()))
        );
        assert_eq!(
            FeedSource::parse("file:///srv/feed"),
            Some(FeedSource::Local(PathBuf::from("/srv/feed")))
        );
        assert_eq!(
            FeedSource::parse("./feed"),
            Some(FeedSource::Local(PathBuf::from("./feed")))
        );
        assert_eq!(FeedSource::parse("   "), None);
    }

    #[test]
    fn test_version_index_skips_invalid() {
        let index = VersionIndex {
            versions: vec!["1.0.0".into(), "not-a-version".into(), "2.0.0-beta".into()],
        };
        let parsed = index.parsed();
        assert_eq!(parsed.len(), 2);
    }
}
