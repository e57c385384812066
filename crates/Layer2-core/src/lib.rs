//! kiln-core: Core Runtime for Kiln
//!
//! Layer2 - 패키지 해석, 아티팩트 설치, 플러그인 로드
//!
//! # 주요 모듈
//!
//! - `package`: 패키지 아이덴티티, 메타데이터, 버전 범위
//! - `feed`: 패키지 피드 (HTTP / 로컬 디렉토리) + 아티팩트 캐시
//! - `resolver`: 아이덴티티 해석, 의존성 그래프 수집, 제약 해석, 호스트 라이브러리
//! - `installer`: 플러그인 디렉토리로 압축 해제
//! - `loader`: 동적 모듈 로드와 탐색
//! - `plugin`: 플러그인 트레이트, 레지스트리, 라이프사이클, 이벤트
//! - `host`: 시작/리로드 패스 오케스트레이터
//!
//! # 사용 예시
//!
//! ```ignore
//! use kiln_core::{PluginHost, PluginsConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PluginsConfig::load()?;
//! let host = PluginHost::builder(config).build()?;
//!
//! let report = host.start(&CancellationToken::new()).await?;
//! for manifest in host.registry().snapshots().await {
//!     println!("{} {} ({})", manifest.manifest.id, manifest.manifest.version, manifest.state);
//! }
//! ```

pub mod feed;
pub mod host;
pub mod installer;
pub mod loader;
pub mod package;
pub mod plugin;
pub mod resolver;

// Re-exports: Foundation
pub use kiln_foundation::{Error, HostConflictPolicy, PluginsConfig, Result};

// Re-exports: Package & Feed
pub use feed::{
    ArtifactCache, FeedSource, HttpFeed, LocalFeed, PackageFeed, PackageRegistryClient,
};
pub use package::{
    DependencyNode, PackageDependency, PackageIdentity, PackageMetadata, VersionRange,
};

// Re-exports: Resolver
pub use resolver::{
    ConstraintResolver, DependencyGraphCollector, HostLibraries, IdentityResolver,
    ResolvedIdentity,
};

// Re-exports: Installer & Loader
pub use installer::{ArtifactInstaller, InstallReport};
pub use loader::{
    LoadError, LoadedModule, ModuleDiscoveryScanner, ModuleLoader, NativeModuleLoader,
    PluginRegistrar,
};

// Re-exports: Plugin
pub use plugin::{
    EventBus, EventKind, HostInfo, Plugin, PluginContext, PluginEvent, PluginEventHandler, PluginManager,
    PluginManifest, PluginProvides, PluginRegistry, PluginSnapshot, PluginState,
    ServiceContainer, ServiceExtension,
};

// Re-exports: Host
pub use host::{HostPhase, PassReport, PluginHost, PluginHostBuilder, SkippedPlugin};
