//! # Resolver
//!
//! 플러그인 이름 → 설치 가능한 패키지 집합
//!
//! ```text
//! IdentityResolver ──▶ DependencyGraphCollector ──▶ ConstraintResolver
//!  (name, range?)        (전이 노드, 호스트 제거)       (이름당 한 버전)
//! ```

mod constraint;
mod graph;
mod host;
mod identity;

pub use constraint::ConstraintResolver;
pub use graph::{DependencyGraphCollector, NodeSet};
pub use host::{library_file_names, HostLibraries, HostSupply, CONTRACT_LIBRARY, HOST_LIBRARIES_FILE};
pub use identity::{select_version, IdentityResolver, ResolvedIdentity};
