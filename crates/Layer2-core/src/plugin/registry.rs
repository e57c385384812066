//! Plugin Registry - 플러그인 매니페스트 저장소
//!
//! 로드된 모듈의 익스포트를 인스턴스화해 아이덴티티별로 색인합니다.
//! 모듈 → 플러그인 색인도 함께 유지합니다.

use super::manifest::PluginManifest;
use super::services::ServiceContainer;
use super::traits::{Plugin, PluginState};
use crate::loader::{panic_message, LoadedModule};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 플러그인 정보
pub struct PluginInfo {
    /// 플러그인 인스턴스
    pub plugin: Arc<dyn Plugin>,

    /// 등록 시점의 매니페스트
    pub manifest: PluginManifest,

    /// 현재 상태
    pub state: PluginState,

    /// 플러그인을 내보낸 모듈 (내장 플러그인은 None)
    pub module: Option<Arc<LoadedModule>>,

    /// 로드 순서
    pub load_order: usize,
}

impl PluginInfo {
    pub fn snapshot(&self) -> PluginSnapshot {
        PluginSnapshot {
            manifest: self.manifest.clone(),
            state: self.state,
            module: self.module.as_ref().map(|m| m.file_name().to_string()),
        }
    }
}

/// 읽기 전용 플러그인 스냅샷 (이벤트, 조회용)
#[derive(Debug, Clone, Serialize)]
pub struct PluginSnapshot {
    pub manifest: PluginManifest,
    pub state: PluginState,
    pub module: Option<String>,
}

/// 플러그인 레지스트리 - 모든 매니페스트 관리
pub struct PluginRegistry {
    /// 플러그인 저장소 (ID -> PluginInfo)
    plugins: RwLock<HashMap<String, PluginInfo>>,

    /// 모듈 파일 이름 -> 플러그인 ID
    module_index: RwLock<BTreeMap<String, Vec<String>>>,

    /// 로드 카운터
    load_counter: AtomicUsize,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            module_index: RwLock::new(BTreeMap::new()),
            load_counter: AtomicUsize::new(0),
        }
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 플러그인 등록 (중복이면 false)
    pub async fn register(&self, plugin: Arc<dyn Plugin>, module: Option<Arc<LoadedModule>>) -> bool {
        let manifest = plugin.manifest();
        let id = manifest.id.clone();

        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&id) {
            warn!("Plugin {} is already registered, skipping duplicate", id);
            return false;
        }

        if let Some(module) = &module {
            self.module_index
                .write()
                .await
                .entry(module.file_name().to_string())
                .or_default()
                .push(id.clone());
        }

        let load_order = self.load_counter.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Registered plugin: {} (v{})", id, manifest.version);

        plugins.insert(
            id,
            PluginInfo {
                plugin,
                manifest,
                state: PluginState::Unloaded,
                module,
                load_order,
            },
        );
        true
    }

    /// 로드된 모듈들의 익스포트를 인스턴스화하고 등록
    ///
    /// 모듈마다 서비스 확장을 먼저 적용한 뒤 플러그인 팩토리를 호출합니다.
    /// 실패나 panic은 익스포트 단위로 격리됩니다.
    pub async fn register_all(
        &self,
        modules: &[Arc<LoadedModule>],
        services: &ServiceContainer,
        disabled: &[String],
    ) -> Vec<PluginSnapshot> {
        let mut registered = Vec::new();

        for module in modules {
            let exports = module.exports();

            for extension in &exports.extensions {
                match panic::catch_unwind(AssertUnwindSafe(|| extension.register(services))) {
                    Ok(Ok(())) => debug!(
                        "Applied service extension {} from {}",
                        extension.name(),
                        module.file_name()
                    ),
                    Ok(Err(e)) => error!(
                        "Service extension {} in {} failed: {}",
                        extension.name(),
                        module.file_name(),
                        e
                    ),
                    Err(payload) => error!(
                        "Service extension {} in {} panicked: {}",
                        extension.name(),
                        module.file_name(),
                        panic_message(payload.as_ref())
                    ),
                }
            }

            for export in &exports.plugins {
                if is_disabled(disabled, &export.type_name) {
                    info!("Plugin {} is disabled, not instantiating", export.type_name);
                    continue;
                }

                let created = panic::catch_unwind(AssertUnwindSafe(|| (export.factory)(services)));
                let plugin = match created {
                    Ok(Ok(plugin)) => plugin,
                    Ok(Err(e)) => {
                        error!(
                            "Failed to instantiate {} from {}: {}",
                            export.type_name,
                            module.file_name(),
                            e
                        );
                        continue;
                    }
                    Err(payload) => {
                        error!(
                            "Instantiating {} from {} panicked: {}",
                            export.type_name,
                            module.file_name(),
                            panic_message(payload.as_ref())
                        );
                        continue;
                    }
                };

                let id = plugin.manifest().id;
                if is_disabled(disabled, &id) {
                    info!("Plugin {} is disabled, not registering", id);
                    continue;
                }

                if self.register(plugin, Some(Arc::clone(module))).await {
                    if let Some(snapshot) = self.snapshot(&id).await {
                        registered.push(snapshot);
                    }
                }
            }
        }

        registered
    }

    /// 플러그인 등록 해제
    pub async fn unregister(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        let info = self.plugins.write().await.remove(id)?;

        if let Some(module) = &info.module {
            let mut index = self.module_index.write().await;
            if let Some(ids) = index.get_mut(module.file_name()) {
                ids.retain(|i| i != id);
                if ids.is_empty() {
                    index.remove(module.file_name());
                }
            }
        }

        debug!("Unregistered plugin: {}", id);
        Some(info.plugin)
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        let plugins = self.plugins.read().await;
        plugins.get(id).map(|info| Arc::clone(&info.plugin))
    }

    pub async fn manifest(&self, id: &str) -> Option<PluginManifest> {
        let plugins = self.plugins.read().await;
        plugins.get(id).map(|info| info.manifest.clone())
    }

    pub async fn state(&self, id: &str) -> Option<PluginState> {
        let plugins = self.plugins.read().await;
        plugins.get(id).map(|info| info.state)
    }

    /// 상태 설정
    pub async fn set_state(&self, id: &str, state: PluginState) -> bool {
        let mut plugins = self.plugins.write().await;
        if let Some(info) = plugins.get_mut(id) {
            debug!("Plugin {}: {} -> {}", id, info.state, state);
            info.state = state;
            true
        } else {
            false
        }
    }

    /// 플러그인을 내보낸 모듈 파일 경로
    pub async fn module_path(&self, id: &str) -> Option<PathBuf> {
        let plugins = self.plugins.read().await;
        plugins
            .get(id)
            .and_then(|info| info.module.as_ref())
            .map(|m| m.path().to_path_buf())
    }

    pub async fn snapshot(&self, id: &str) -> Option<PluginSnapshot> {
        let plugins = self.plugins.read().await;
        plugins.get(id).map(PluginInfo::snapshot)
    }

    /// 모든 스냅샷 (로드 순서대로)
    pub async fn snapshots(&self) -> Vec<PluginSnapshot> {
        let plugins = self.plugins.read().await;
        let mut infos: Vec<_> = plugins.values().collect();
        infos.sort_by_key(|info| info.load_order);
        infos.into_iter().map(PluginInfo::snapshot).collect()
    }

    /// 특정 상태의 매니페스트
    pub async fn manifests_in(&self, state: PluginState) -> Vec<PluginManifest> {
        self.snapshots()
            .await
            .into_iter()
            .filter(|s| s.state == state)
            .map(|s| s.manifest)
            .collect()
    }

    /// 모듈 → 플러그인 색인
    pub async fn module_index(&self) -> BTreeMap<String, Vec<String>> {
        self.module_index.read().await.clone()
    }

    /// 모듈이 내보낸 플러그인 ID
    pub async fn plugins_in_module(&self, file_name: &str) -> Vec<String> {
        self.module_index
            .read()
            .await
            .get(file_name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.plugins.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }

    /// 로드 순서에 따라 정렬된 플러그인 ID 목록
    pub async fn load_order(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        let mut ordered: Vec<_> = plugins.iter().collect();
        ordered.sort_by_key(|(_, info)| info.load_order);
        ordered.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

fn is_disabled(disabled: &[String], id: &str) -> bool {
    disabled.iter().any(|d| d.eq_ignore_ascii_case(id))
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{ModuleExports, PluginRegistrar};
    use crate::plugin::services::ServiceExtension;
    use crate::plugin::traits::PluginContext;
    use async_trait::async_trait;
    use kiln_foundation::{Error, Result};
    use std::any::Any;

    struct TestPlugin {
        id: String,
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new(&self.id, "Test")
        }

        async fn on_load(&self, _ctx: &PluginContext) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Prefix(String);

    struct PrefixExtension;

    impl ServiceExtension for PrefixExtension {
        fn name(&self) -> &str {
            "prefix"
        }

        fn register(&self, services: &ServiceContainer) -> Result<()> {
            services.register(Arc::new(Prefix("ext".into())));
            Ok(())
        }
    }

    fn module(name: &str, build: impl FnOnce(&mut PluginRegistrar)) -> Arc<LoadedModule> {
        let mut registrar = PluginRegistrar::new();
        build(&mut registrar);
        Arc::new(LoadedModule::new(format!("/plugins/{}", name), registrar.into_exports()))
    }

    fn test_plugin(id: &'static str) -> impl Fn(&ServiceContainer) -> Result<Arc<dyn Plugin>> {
        move |_| Ok(Arc::new(TestPlugin { id: id.into() }) as Arc<dyn Plugin>)
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let registry = PluginRegistry::new();
        let a = Arc::new(TestPlugin { id: "test.plugin".into() });
        let b = Arc::new(TestPlugin { id: "test.plugin".into() });

        assert!(registry.register(a, None).await);
        assert!(!registry.register(b, None).await);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.state("test.plugin").await, Some(PluginState::Unloaded));
    }

    #[tokio::test]
    async fn test_extensions_applied_before_factories() {
        let registry = PluginRegistry::new();
        let services = ServiceContainer::new();

        let m = module("injected.so", |r| {
            r.register_extension(Arc::new(PrefixExtension));
            r.register_plugin("Injected", |services| {
                let prefix = services.require::<Prefix>()?;
                Ok(Arc::new(TestPlugin {
                    id: format!("{}.plugin", prefix.0),
                }) as Arc<dyn Plugin>)
            });
        });

        let registered = registry.register_all(&[m], &services, &[]).await;
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].manifest.id, "ext.plugin");
        assert_eq!(registered[0].module.as_deref(), Some("injected.so"));
    }

    #[tokio::test]
    async fn test_failures_isolated_per_export() {
        let registry = PluginRegistry::new();
        let services = ServiceContainer::new();

        let m = module("mixed.so", |r| {
            r.register_plugin("Failing", |_| Err(Error::instantiation("Failing", "boom")));
            r.register_plugin("Panicking", |_| panic!("constructor panicked"));
            r.register_plugin("Good", test_plugin("good"));
        });

        let registered = registry.register_all(&[m], &services, &[]).await;
        assert_eq!(registered.len(), 1);
        assert!(registry.contains("good").await);
    }

    #[tokio::test]
    async fn test_disabled_and_duplicates_skipped() {
        let registry = PluginRegistry::new();
        let services = ServiceContainer::new();

        let first = module("first.so", |r| {
            r.register_plugin("A", test_plugin("A"));
            r.register_plugin("B", test_plugin("B"));
        });
        let second = module("second.so", |r| r.register_plugin("A", test_plugin("A")));

        let registered = registry
            .register_all(&[first, second], &services, &["b".to_string()])
            .await;

        assert_eq!(registered.len(), 1);
        assert!(!registry.contains("B").await);

        let index = registry.module_index().await;
        assert_eq!(index.get("first.so"), Some(&vec!["A".to_string()]));
        assert!(!index.contains_key("second.so"));

        registry.unregister("A").await;
        assert!(registry.module_index().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_export_never_instantiated() {
        let registry = PluginRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let m = module("sample.so", move |r| {
            r.register_plugin("SamplePlugin", move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(TestPlugin { id: "SamplePlugin".into() }) as Arc<dyn Plugin>)
            });
        });

        let registered = registry
            .register_all(&[m], &ServiceContainer::new(), &["sampleplugin".to_string()])
            .await;

        assert!(registered.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_module() {
        let registry = PluginRegistry::new();
        let m = Arc::new(LoadedModule::new("/plugins/empty.so", ModuleExports::default()));
        let registered = registry.register_all(&[m], &ServiceContainer::new(), &[]).await;
        assert!(registered.is_empty());
        assert!(registry.is_empty().await);
    }
}
