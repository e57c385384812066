//! Dependency Graph Collector - 루트에서 전이 의존성 노드 수집
//!
//! 레벨 단위로 프론티어를 확장합니다. 같은 레벨의 메타데이터 조회는 동시에 실행되고,
//! 하나의 아이덴티티는 한 번만 확장됩니다.
//!
//! `reject` 정책에서 호스트 라이브러리와 충돌하는 후보는 에러 대신 `host_conflict`로
//! 표시되고, 선택 여부는 `ConstraintResolver`가 결정합니다.

use super::host::{HostLibraries, HostSupply};
use super::identity::ResolvedIdentity;
use crate::feed::PackageRegistryClient;
use crate::package::{normalize_name, DependencyNode, PackageIdentity};
use kiln_foundation::{Error, HostConflictPolicy, Result};
use semver::Version;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 수집된 노드 집합 (아이덴티티 순)
pub type NodeSet = BTreeMap<PackageIdentity, DependencyNode>;

/// 의존성 그래프 수집기
pub struct DependencyGraphCollector {
    client: Arc<PackageRegistryClient>,
    host: Arc<HostLibraries>,
    target: String,
    allow_prerelease: bool,
    conflict_policy: HostConflictPolicy,
}

impl DependencyGraphCollector {
    pub fn new(
        client: Arc<PackageRegistryClient>,
        host: Arc<HostLibraries>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            client,
            host,
            target: target.into(),
            allow_prerelease: false,
            conflict_policy: HostConflictPolicy::default(),
        }
    }

    pub fn with_prerelease(mut self, allow: bool) -> Self {
        self.allow_prerelease = allow;
        self
    }

    pub fn with_conflict_policy(mut self, policy: HostConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// 루트부터 전이 의존성 수집
    pub async fn collect(
        &self,
        root: &ResolvedIdentity,
        cancel: &CancellationToken,
    ) -> Result<NodeSet> {
        let mut nodes = NodeSet::new();
        // 이름은 대소문자 무시
        let mut seen: HashSet<(String, Version)> = HashSet::new();
        let mut listings: HashMap<String, Option<(usize, Vec<Version>)>> = HashMap::new();

        seen.insert((root.identity.key(), root.identity.version.clone()));
        let mut frontier = vec![(root.identity.clone(), root.source)];
        let mut level = 0usize;

        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            debug!(
                "Collecting level {} of {} ({} packages)",
                level,
                root.identity,
                frontier.len()
            );

            let fetches = frontier.iter().map(|(identity, source)| async move {
                let result = self.client.metadata(*source, identity).await;
                (identity, *source, result)
            });
            let fetched = futures::future::join_all(fetches).await;

            let mut next = Vec::new();
            for (identity, source, result) in fetched {
                let metadata = match result {
                    Ok(Some(metadata)) => metadata,
                    Ok(None) if identity == &root.identity => {
                        return Err(Error::NotFound(format!("metadata for {}", identity)));
                    }
                    Ok(None) => {
                        debug!("No metadata for candidate {}, dropping it", identity);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let mut node = DependencyNode::new(identity.clone(), source);
                node.listed = metadata.listed;

                for dependency in metadata.dependencies_for(&self.target) {
                    match self.host.supplies(&dependency) {
                        HostSupply::Supplied => {
                            debug!("{} supplied by host, pruned from {}", dependency, identity);
                            continue;
                        }
                        HostSupply::Conflict(host_version) => match self.conflict_policy {
                            HostConflictPolicy::Reject => {
                                let reason = format!(
                                    "{} requires {} {} but host provides {}",
                                    identity, dependency.name, dependency.range, host_version
                                );
                                debug!("Candidate {} rejected: {}", identity, reason);
                                node.host_conflict = Some(reason);
                                break;
                            }
                            HostConflictPolicy::Private => {
                                debug!(
                                    "{} conflicts with host {}, installing private copy",
                                    dependency, host_version
                                );
                            }
                        },
                        HostSupply::Absent => {}
                    }

                    if let Some((dep_source, versions)) =
                        self.listing(&dependency.name, &mut listings).await
                    {
                        for version in versions
                            .iter()
                            .filter(|v| dependency.range.matches(v, self.allow_prerelease))
                        {
                            let candidate = PackageIdentity::new(&dependency.name, version.clone());
                            if seen.insert((candidate.key(), version.clone())) {
                                next.push((candidate, dep_source));
                            }
                        }
                    } else {
                        debug!("No feed lists {}", dependency.name);
                    }

                    node.dependencies.push(dependency);
                }

                nodes.insert(identity.clone(), node);
            }

            frontier = next;
            level += 1;
        }

        debug!("Collected {} nodes for {}", nodes.len(), root.identity);
        Ok(nodes)
    }

    /// 패키지를 나열하는 첫 번째 피드의 버전 목록 (호출 단위 캐시)
    async fn listing(
        &self,
        name: &str,
        cache: &mut HashMap<String, Option<(usize, Vec<Version>)>>,
    ) -> Option<(usize, Vec<Version>)> {
        let key = normalize_name(name);
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let mut found = None;
        for (source, feed) in self.client.feeds().iter().enumerate() {
            match feed.list_versions(name).await {
                Ok(versions) if !versions.is_empty() => {
                    found = Some((source, versions));
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!("Feed {} failed listing {}: {}", feed.name(), name, e),
            }
        }

        cache.insert(key, found.clone());
        found
    }
}
