//! Constraint Resolver - 패키지 이름마다 하나의 버전 선택
//!
//! 후보를 (공개 목록 우선, 높은 버전 우선) 순으로 시도하는 백트래킹 탐색입니다.
//! 호스트 충돌로 표시된 후보는 건너뛰며, 다른 선택지가 없을 때만 그 충돌이 에러가 됩니다.
//! 입력이 같으면 결과도 같습니다.

use super::graph::NodeSet;
use crate::package::{normalize_name, DependencyNode};
use kiln_foundation::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// 탐색 단계 상한
const MAX_SEARCH_STEPS: usize = 100_000;

/// 백트래킹 제약 해석기
#[derive(Debug, Default)]
pub struct ConstraintResolver;

struct Search<'a> {
    candidates: BTreeMap<String, Vec<&'a DependencyNode>>,
    steps: usize,
    failed_on: Option<String>,

    /// 처음 건너뛴 호스트 충돌 후보 (패키지, 사유)
    host_conflict: Option<(String, String)>,
}

impl ConstraintResolver {
    pub fn new() -> Self {
        Self
    }

    /// 루트 이름들에서 도달 가능한 모든 패키지에 대해 일관된 버전 집합 선택
    pub fn resolve(&self, root_names: &[String], available: &NodeSet) -> Result<Vec<DependencyNode>> {
        let mut candidates: BTreeMap<String, Vec<&DependencyNode>> = BTreeMap::new();
        for node in available.values() {
            candidates.entry(node.key()).or_default().push(node);
        }
        for list in candidates.values_mut() {
            list.sort_by(|a, b| {
                b.listed
                    .cmp(&a.listed)
                    .then_with(|| b.identity.version.cmp(&a.identity.version))
            });
        }

        let mut search = Search {
            candidates,
            steps: 0,
            failed_on: None,
            host_conflict: None,
        };

        let pending: VecDeque<String> = root_names.iter().map(|n| normalize_name(n)).collect();

        match search.solve(BTreeMap::new(), pending) {
            Some(assignment) => {
                debug!(
                    "Resolved {} packages in {} steps",
                    assignment.len(),
                    search.steps
                );
                Ok(assignment.into_values().cloned().collect())
            }
            None if search.steps > MAX_SEARCH_STEPS => Err(Error::conflict(
                root_names.join(", "),
                "search limit exceeded",
            )),
            None => {
                if let Some((package, reason)) = search.host_conflict {
                    return Err(Error::conflict(package, reason));
                }
                let package = search
                    .failed_on
                    .unwrap_or_else(|| root_names.join(", "));
                Err(Error::conflict(
                    package,
                    "no version satisfies all constraints",
                ))
            }
        }
    }
}

impl<'a> Search<'a> {
    fn solve(
        &mut self,
        assignment: BTreeMap<String, &'a DependencyNode>,
        mut pending: VecDeque<String>,
    ) -> Option<BTreeMap<String, &'a DependencyNode>> {
        let name = loop {
            match pending.pop_front() {
                None => return Some(assignment),
                Some(name) if assignment.contains_key(&name) => continue,
                Some(name) => break name,
            }
        };

        let options = self.candidates.get(&name).cloned().unwrap_or_default();

        for node in options {
            if let Some(reason) = &node.host_conflict {
                self.host_conflict
                    .get_or_insert_with(|| (node.identity.name.clone(), reason.clone()));
                continue;
            }
            if !incoming_satisfied(&assignment, &name, node) || !outgoing_consistent(&assignment, node) {
                continue;
            }

            self.steps += 1;
            if self.steps > MAX_SEARCH_STEPS {
                return None;
            }

            let mut next_assignment = assignment.clone();
            next_assignment.insert(name.clone(), node);

            let mut next_pending = pending.clone();
            next_pending.extend(node.dependencies.iter().map(|d| d.key()));

            if let Some(done) = self.solve(next_assignment, next_pending) {
                return Some(done);
            }
        }

        self.failed_on.get_or_insert_with(|| name.clone());
        None
    }
}

/// 이미 선택된 노드들이 `name`에 거는 제약을 후보가 만족하는지
fn incoming_satisfied(
    assignment: &BTreeMap<String, &DependencyNode>,
    name: &str,
    candidate: &DependencyNode,
) -> bool {
    assignment.values().all(|chosen| {
        chosen
            .dependencies
            .iter()
            .filter(|d| d.key() == name)
            .all(|d| d.range.matches(&candidate.identity.version, true))
    })
}

/// 후보의 의존성이 이미 선택된 버전과 충돌하지 않는지
fn outgoing_consistent(assignment: &BTreeMap<String, &DependencyNode>, candidate: &DependencyNode) -> bool {
    candidate.dependencies.iter().all(|d| match assignment.get(&d.key()) {
        Some(chosen) => d.range.matches(&chosen.identity.version, true),
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageDependency, PackageIdentity, VersionRange};
    use semver::Version;

    fn node(name: &str, version: &str, deps: &[(&str, &str)]) -> DependencyNode {
        let mut node = DependencyNode::new(
            PackageIdentity::new(name, Version::parse(version).unwrap()),
            0,
        );
        for (dep, range) in deps {
            node = node.with_dependency(PackageDependency::new(
                *dep,
                VersionRange::parse(range).unwrap(),
            ));
        }
        node
    }

    fn set(nodes: Vec<DependencyNode>) -> NodeSet {
        nodes.into_iter().map(|n| (n.identity.clone(), n)).collect()
    }

    fn chosen(resolved: &[DependencyNode], name: &str) -> String {
        resolved
            .iter()
            .find(|n| n.identity.name == name)
            .map(|n| n.identity.version.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_highest_version_satisfying_all_edges() {
        let available = set(vec![
            node("P", "1.0.0", &[("X", ">=2.0"), ("Y", "*")]),
            node("Y", "1.0.0", &[("X", ">=1.0")]),
            node("X", "1.0.0", &[]),
            node("X", "1.5.0", &[]),
            node("X", "2.0.0", &[]),
            node("X", "2.1.0", &[]),
        ]);

        let resolved = ConstraintResolver::new()
            .resolve(&["P".into()], &available)
            .unwrap();

        assert_eq!(resolved.len(), 3);
        assert_eq!(chosen(&resolved, "X"), "2.1.0");
    }

    #[test]
    fn test_backtracks_over_dead_end() {
        let available = set(vec![
            node("R", "1.0.0", &[("A", "*")]),
            node("A", "2.0.0", &[("B", "[1.0]")]),
            node("A", "1.0.0", &[]),
            node("B", "1.0.0", &[("C", ">=5.0")]),
        ]);

        let resolved = ConstraintResolver::new()
            .resolve(&["R".into()], &available)
            .unwrap();

        assert_eq!(chosen(&resolved, "A"), "1.0.0");
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_narrowing_later_edge() {
        // A 2.0 이 먼저 선택되지만 B가 A <2.0 을 요구 → A 1.0 으로 되돌아감
        let available = set(vec![
            node("R", "1.0.0", &[("A", "*"), ("B", "*")]),
            node("A", "2.0.0", &[]),
            node("A", "1.0.0", &[]),
            node("B", "1.0.0", &[("A", "[1.0,2.0)")]),
        ]);

        let resolved = ConstraintResolver::new()
            .resolve(&["R".into()], &available)
            .unwrap();
        assert_eq!(chosen(&resolved, "A"), "1.0.0");
    }

    #[test]
    fn test_listed_preferred() {
        let mut unlisted = node("X", "2.0.0", &[]);
        unlisted.listed = false;
        let available = set(vec![node("P", "1.0.0", &[("X", "*")]), unlisted, node("X", "1.0.0", &[])]);

        let resolved = ConstraintResolver::new()
            .resolve(&["P".into()], &available)
            .unwrap();
        assert_eq!(chosen(&resolved, "X"), "1.0.0");
    }

    #[test]
    fn test_conflict() {
        let available = set(vec![
            node("P", "1.0.0", &[("X", ">=2.0"), ("Y", "*")]),
            node("Y", "1.0.0", &[("X", "[1.0,2.0)")]),
            node("X", "1.0.0", &[]),
            node("X", "2.0.0", &[]),
        ]);

        let err = ConstraintResolver::new()
            .resolve(&["P".into()], &available)
            .unwrap_err();
        assert!(matches!(err, Error::ResolutionConflict { .. }));
    }

    #[test]
    fn test_host_conflict_candidate_skipped() {
        let available = set(vec![
            node("P", "1.0.0", &[("X", "*")]),
            node("X", "2.0.0", &[]).with_host_conflict("X@2.0.0 requires Json >=14.0 but host provides 13.0.0"),
            node("X", "1.0.0", &[]),
        ]);

        let resolved = ConstraintResolver::new()
            .resolve(&["P".into()], &available)
            .unwrap();
        assert_eq!(chosen(&resolved, "X"), "1.0.0");
    }

    #[test]
    fn test_host_conflict_reported_when_no_alternative() {
        let available = set(vec![
            node("P", "1.0.0", &[("X", ">=2.0")]),
            node("X", "2.0.0", &[]).with_host_conflict("X@2.0.0 requires Json >=14.0 but host provides 13.0.0"),
            node("X", "1.0.0", &[]),
        ]);

        let err = ConstraintResolver::new()
            .resolve(&["P".into()], &available)
            .unwrap_err();
        match err {
            Error::ResolutionConflict { package, detail } => {
                assert_eq!(package, "X");
                assert!(detail.contains("host provides 13.0.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deterministic() {
        let available = set(vec![
            node("P", "1.0.0", &[("A", "*"), ("B", "*")]),
            node("A", "1.0.0", &[]),
            node("A", "1.1.0", &[]),
            node("B", "3.0.0", &[]),
        ]);

        let first = ConstraintResolver::new().resolve(&["P".into()], &available).unwrap();
        let second = ConstraintResolver::new().resolve(&["P".into()], &available).unwrap();
        assert_eq!(first, second);
    }
}
