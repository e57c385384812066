//! # Plugin Host
//!
//! 시작/리로드 패스 오케스트레이터
//!
//! ```text
//! PluginsConfig ─▶ IdentityResolver ─▶ DependencyGraphCollector ─▶ ConstraintResolver
//!                                                                        │
//!   PluginManager ◀─ PluginRegistry ◀─ ModuleDiscoveryScanner ◀─ ArtifactInstaller
//! ```
//!
//! 플러그인별 해석/설치는 `maxConcurrentInstalls`개까지 동시에 진행되고,
//! 모듈 로드 이후 단계는 패스를 구동하는 태스크에서 순서대로 실행됩니다.

mod phase;

pub use phase::{HostPhase, PhaseController, ReloadGuard};

use crate::feed::{ArtifactCache, PackageFeed, PackageRegistryClient};
use crate::installer::{ArtifactInstaller, InstallReport};
use crate::loader::{default_target, ModuleDiscoveryScanner, ModuleLoader, NativeModuleLoader};
use crate::package::VersionRange;
use crate::plugin::{
    EventBus, HostBuiltin, Plugin, PluginManager, PluginRegistry, ServiceContainer,
};
use crate::resolver::{ConstraintResolver, DependencyGraphCollector, HostLibraries, IdentityResolver};
use futures::stream::{self, StreamExt};
use kiln_foundation::{Error, PluginsConfig, Result, ENV_PLUGINS_ROOT};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// PassReport
// ============================================================================

/// 설치하지 못한 플러그인
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPlugin {
    pub name: String,
    pub reason: String,

    /// 다음 리로드에서 다시 시도할 가치가 있는지
    pub retryable: bool,
}

/// 시작/리로드 패스 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    /// 플러그인 이름 → 설치 결과
    pub installed: BTreeMap<String, InstallReport>,

    pub skipped: Vec<SkippedPlugin>,

    /// 로드하지 못한 모듈 파일 수
    pub module_failures: usize,

    /// 이번 패스에서 로드된 플러그인 ID
    pub loaded: Vec<String>,

    /// 취소되어 중단됨 (에러 아님)
    pub cancelled: bool,
}

// ============================================================================
// PluginHost
// ============================================================================

/// 플러그인 호스트
pub struct PluginHost {
    config: PluginsConfig,
    target: String,
    client: Arc<PackageRegistryClient>,
    host_libraries: Arc<HostLibraries>,
    identity: IdentityResolver,
    installer: ArtifactInstaller,
    scanner: ModuleDiscoveryScanner,
    manager: PluginManager,
    builtin: Arc<dyn Plugin>,
    phase: PhaseController,
}

impl PluginHost {
    pub fn builder(config: PluginsConfig) -> PluginHostBuilder {
        PluginHostBuilder::new(config)
    }

    // ========================================================================
    // 패스
    // ========================================================================

    /// 최초 시작 패스 (`Starting`에서 한 번만)
    ///
    /// 내장 플러그인을 먼저 로드해 `HostInfo` 같은 호스트 서비스가
    /// 플러그인 팩토리 호출 전에 컨테이너에 있도록 합니다.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<PassReport> {
        self.phase.begin_start()?;

        let mut builtin_loaded = Vec::new();
        if !self.registry().contains(&self.builtin.manifest().id).await {
            self.manager.register_builtin(Arc::clone(&self.builtin)).await?;
            builtin_loaded = self.manager.load_all().await;
        }

        let mut report = self.run_pass(cancel).await;
        builtin_loaded.append(&mut report.loaded);
        report.loaded = builtin_loaded;

        self.phase.mark_running()?;
        Ok(report)
    }

    /// 리로드: 내장 플러그인을 제외하고 언로드한 뒤 새 패스 실행
    pub async fn reload(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let _guard = self.phase.begin_reload()?;
        info!("Reloading plugins");

        self.manager.unload_all().await;
        Ok(self.run_pass(cancel).await)
    }

    /// 종료: 내장 플러그인까지 모두 언로드
    pub async fn shutdown(&self) -> Vec<String> {
        self.phase.begin_stop();
        info!("Shutting down plugin host");
        self.manager.shutdown().await
    }

    /// 해석 → 설치 → 탐색 → 로드
    async fn run_pass(&self, cancel: &CancellationToken) -> PassReport {
        let mut report = PassReport::default();
        let plugins_root = self.installer.plugins_root().to_path_buf();

        if let Err(e) = tokio::fs::create_dir_all(&plugins_root).await {
            warn!("Failed to create plugins root {}: {}", plugins_root.display(), e);
        }

        for name in &self.config.disabled_plugins {
            debug!("Plugin {} is disabled, skipping resolution", name);
        }

        let active = self.config.active_plugins();
        info!(
            "Provisioning {} plugins into {}",
            active.len(),
            plugins_root.display()
        );

        let outcomes: Vec<_> = stream::iter(active)
            .map(|(name, constraint)| async move {
                let outcome = self.provision(&name, constraint.as_deref(), cancel).await;
                (name, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_installs())
            .collect()
            .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(installed) => {
                    report.installed.insert(name, installed);
                }
                Err(Error::Cancelled) => report.cancelled = true,
                Err(e) => {
                    warn!("Skipping plugin {}: {}", name, e);
                    report.skipped.push(SkippedPlugin {
                        name,
                        retryable: e.is_retryable(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.skipped.sort_by(|a, b| a.name.cmp(&b.name));

        if report.cancelled || cancel.is_cancelled() {
            info!("Plugin pass cancelled before loading");
            report.cancelled = true;
            return report;
        }

        // 이번 패스에서 설치된 플러그인 디렉토리만 탐색
        let plugin_dirs: Vec<_> = report
            .installed
            .values()
            .map(|installed| installed.plugin_dir.clone())
            .collect();
        let scan = self.scanner.scan_dirs(&plugin_dirs);
        report.module_failures = scan.skipped.iter().filter(|s| !s.benign).count();

        self.registry()
            .register_all(
                &scan.modules,
                self.manager.services(),
                &self.config.disabled_plugins,
            )
            .await;
        report.loaded = self.manager.load_all().await;

        info!(
            "Plugin pass complete: {} installed, {} skipped, {} loaded",
            report.installed.len(),
            report.skipped.len(),
            report.loaded.len()
        );
        report
    }

    /// 플러그인 하나의 해석과 설치
    async fn provision(
        &self,
        name: &str,
        constraint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let range = constraint.map(VersionRange::parse).transpose()?;
        let allow_prerelease = self.config.allow_prerelease()
            || range.as_ref().is_some_and(VersionRange::mentions_prerelease);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let root = self
            .identity
            .resolve(name, range.as_ref(), allow_prerelease)
            .await?;

        let collector = DependencyGraphCollector::new(
            Arc::clone(&self.client),
            Arc::clone(&self.host_libraries),
            self.target.clone(),
        )
        .with_prerelease(allow_prerelease)
        .with_conflict_policy(self.config.conflict_policy());

        let nodes = collector.collect(&root, cancel).await?;
        let resolved = ConstraintResolver::new().resolve(&[root.identity.name.clone()], &nodes)?;
        debug!(
            "{} resolved to {} packages (prerelease {}: config {}, constraint {:?})",
            root.identity,
            resolved.len(),
            if allow_prerelease { "allowed" } else { "excluded" },
            self.config.allow_prerelease(),
            constraint
        );

        self.installer.install(&resolved, name, cancel).await
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn config(&self) -> &PluginsConfig {
        &self.config
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn phase(&self) -> HostPhase {
        self.phase.current()
    }

    /// 명령 디스패치 가능 여부 (리로드 중에는 false)
    pub fn accepts_commands(&self) -> bool {
        self.phase.accepts_commands()
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        self.manager.registry()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.manager.event_bus()
    }

    pub fn services(&self) -> &Arc<ServiceContainer> {
        self.manager.services()
    }

    pub fn client(&self) -> &Arc<PackageRegistryClient> {
        &self.client
    }

    pub fn scanner(&self) -> &ModuleDiscoveryScanner {
        &self.scanner
    }
}

// ============================================================================
// Builder
// ============================================================================

/// 플러그인 호스트 빌더
pub struct PluginHostBuilder {
    config: PluginsConfig,
    feeds: Option<Vec<Arc<dyn PackageFeed>>>,
    loader: Option<Arc<dyn ModuleLoader>>,
    host_libraries: Option<Arc<HostLibraries>>,
    builtin: Option<Arc<dyn Plugin>>,
    services: Option<Arc<ServiceContainer>>,
    event_bus: Option<Arc<EventBus>>,
}

impl PluginHostBuilder {
    pub fn new(config: PluginsConfig) -> Self {
        Self {
            config,
            feeds: None,
            loader: None,
            host_libraries: None,
            builtin: None,
            services: None,
            event_bus: None,
        }
    }

    /// 설정의 `feeds` 대신 사용할 피드
    pub fn with_feeds(mut self, feeds: Vec<Arc<dyn PackageFeed>>) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn with_module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_host_libraries(mut self, host: Arc<HostLibraries>) -> Self {
        self.host_libraries = Some(host);
        self
    }

    pub fn with_builtin(mut self, builtin: Arc<dyn Plugin>) -> Self {
        self.builtin = Some(builtin);
        self
    }

    pub fn with_services(mut self, services: Arc<ServiceContainer>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<PluginHost> {
        self.config.validate()?;

        let plugins_root = self.config.plugins_root();
        if std::env::var_os(ENV_PLUGINS_ROOT).as_deref() != Some(plugins_root.as_os_str()) {
            std::env::set_var(ENV_PLUGINS_ROOT, &plugins_root);
        }

        let cache_dir = self.config.cache_dir();
        let client = Arc::new(match self.feeds {
            Some(feeds) => PackageRegistryClient::new(feeds, ArtifactCache::new(cache_dir)),
            None => PackageRegistryClient::from_sources(&self.config.feeds, cache_dir),
        });
        if client.feeds().is_empty() {
            warn!("No package feeds configured");
        }

        let target = self.config.target.clone().unwrap_or_else(default_target);
        let host_libraries = self.host_libraries.unwrap_or_else(HostLibraries::process);
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(NativeModuleLoader::new()));

        let manager = PluginManager::new(
            self.services.unwrap_or_default(),
            self.event_bus.unwrap_or_default(),
        );

        debug!(
            "Plugin host: target {}, {} host libraries",
            target,
            host_libraries.len()
        );

        Ok(PluginHost {
            identity: IdentityResolver::new(Arc::clone(&client)),
            installer: ArtifactInstaller::new(Arc::clone(&client), plugins_root.clone()),
            scanner: ModuleDiscoveryScanner::new(loader),
            builtin: self
                .builtin
                .unwrap_or_else(|| Arc::new(HostBuiltin::new().with_plugins_root(plugins_root))),
            phase: PhaseController::new(),
            config: self.config,
            target,
            client,
            host_libraries,
            manager,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{HostInfo, PluginState, BUILTIN_PLUGIN_ID};
    use tempfile::TempDir;

    fn empty_host(temp: &TempDir) -> PluginHost {
        let config = PluginsConfig::new()
            .with_plugins_root(temp.path().join("plugins"))
            .with_cache_dir(temp.path().join("cache"));

        PluginHost::builder(config)
            .with_feeds(Vec::new())
            .with_host_libraries(Arc::new(HostLibraries::empty()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_loads_builtin() {
        let temp = TempDir::new().unwrap();
        let host = empty_host(&temp);
        assert_eq!(host.phase(), HostPhase::Starting);
        assert_eq!(host.target(), default_target());

        let report = host.start(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.loaded, vec![BUILTIN_PLUGIN_ID]);
        assert!(temp.path().join("plugins").is_dir());
        assert!(host.accepts_commands());

        assert!(matches!(
            host.start(&CancellationToken::new()).await,
            Err(Error::Busy(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_keeps_builtin() {
        let temp = TempDir::new().unwrap();
        let host = empty_host(&temp);
        host.start(&CancellationToken::new()).await.unwrap();

        let report = host.reload(&CancellationToken::new()).await.unwrap();
        assert!(report.loaded.is_empty());
        assert_eq!(host.phase(), HostPhase::Running);
        assert_eq!(
            host.registry().state(BUILTIN_PLUGIN_ID).await,
            Some(PluginState::Loaded)
        );

        let stopped = host.shutdown().await;
        assert_eq!(stopped, vec![BUILTIN_PLUGIN_ID]);
        assert_eq!(host.phase(), HostPhase::Stopping);
        assert!(host.reload(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_pass_skips_loading() {
        let temp = TempDir::new().unwrap();
        let host = empty_host(&temp);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = host.start(&cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.loaded, vec![BUILTIN_PLUGIN_ID]);
        assert_eq!(host.scanner().cached(), 0);
    }

    #[tokio::test]
    async fn test_host_info_available_before_pass() {
        let temp = TempDir::new().unwrap();
        let host = empty_host(&temp);
        host.start(&CancellationToken::new()).await.unwrap();

        let info = host.services().require::<HostInfo>().unwrap();
        assert_eq!(info.plugins_root.as_deref(), Some(temp.path().join("plugins").as_path()));
        assert!(std::env::var_os(ENV_PLUGINS_ROOT).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_start_rejected_immediately() {
        let temp = TempDir::new().unwrap();
        let host = empty_host(&temp);
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(host.start(&cancel), host.start(&cancel));
        let (ok, busy) = if a.is_ok() { (a, b) } else { (b, a) };

        assert_eq!(ok.unwrap().loaded, vec![BUILTIN_PLUGIN_ID]);
        assert!(matches!(busy, Err(Error::Busy(_))));
        assert_eq!(host.phase(), HostPhase::Running);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PluginsConfig::new();
        config.max_concurrent_installs = Some(0);
        assert!(PluginHost::builder(config).build().is_err());
    }
}
