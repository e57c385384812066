//! Identity Resolver - (이름, 범위?) → 구체적인 패키지 아이덴티티

use crate::feed::PackageRegistryClient;
use crate::package::{is_prerelease, PackageIdentity, VersionRange};
use kiln_foundation::{Error, Result};
use semver::Version;
use std::sync::Arc;
use tracing::{debug, warn};

/// 해석된 아이덴티티와 그것을 찾은 피드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: PackageIdentity,
    pub source: usize,
}

/// 피드를 순서대로 조회하는 아이덴티티 해석기
pub struct IdentityResolver {
    client: Arc<PackageRegistryClient>,
}

impl IdentityResolver {
    pub fn new(client: Arc<PackageRegistryClient>) -> Self {
        Self { client }
    }

    /// 패키지 이름과 선택적 범위를 아이덴티티로 해석
    ///
    /// 첫 번째로 일치하는 버전이 있는 피드가 이깁니다. 피드 에러는 기록 후 다음 피드로 넘어갑니다.
    pub async fn resolve(
        &self,
        name: &str,
        range: Option<&VersionRange>,
        allow_prerelease: bool,
    ) -> Result<ResolvedIdentity> {
        for (source, feed) in self.client.feeds().iter().enumerate() {
            let versions = match feed.list_versions(name).await {
                Ok(versions) => versions,
                Err(e) => {
                    warn!("Feed {} failed listing {}: {}", feed.name(), name, e);
                    continue;
                }
            };

            if let Some(version) = select_version(&versions, range, allow_prerelease) {
                debug!("Resolved {} to {} on {}", name, version, feed.name());
                return Ok(ResolvedIdentity {
                    identity: PackageIdentity::new(name, version),
                    source,
                });
            }
        }

        Err(Error::NotFound(match range {
            Some(range) => format!("{} {}", name, range),
            None => name.to_string(),
        }))
    }
}

/// 버전 목록에서 하나를 선택
///
/// 범위가 있으면 범위 안의 최고 버전, 없으면 프리릴리스 여부가 플래그와 같은 최신 버전.
pub fn select_version(
    versions: &[Version],
    range: Option<&VersionRange>,
    allow_prerelease: bool,
) -> Option<Version> {
    versions
        .iter()
        .filter(|v| match range {
            Some(range) => range.matches(v, allow_prerelease),
            None => is_prerelease(v) == allow_prerelease,
        })
        .max()
        .cloned()
}
