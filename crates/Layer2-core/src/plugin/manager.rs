//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! 매니페스트별 상태 머신 `Unloaded → Loading → Loaded → Unloading → Unloaded`을
//! 구동하고 로드/언로드 이벤트를 발행합니다.
//!
//! 내장 플러그인(`BUILTIN_PLUGIN_ID`)은 `unload_all` 대상이 아니며 `shutdown`에서만 내려갑니다.

use super::events::{EventBus, PluginEvent};
use super::registry::PluginRegistry;
use super::services::ServiceContainer;
use super::traits::{Plugin, PluginContext, PluginState};
use crate::installer::DEPENDENCY_DIR;
use crate::loader::panic_message;
use futures::FutureExt;
use kiln_foundation::{Error, Result};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 호스트 내장 기능 매니페스트 ID
pub const BUILTIN_PLUGIN_ID: &str = "kiln.builtin";

/// 플러그인 매니저 - 로드 순서와 이벤트 관리
pub struct PluginManager {
    /// 플러그인 레지스트리
    registry: Arc<PluginRegistry>,

    /// 이벤트 버스
    event_bus: Arc<EventBus>,

    /// 호스트 서비스 컨테이너
    services: Arc<ServiceContainer>,
}

impl PluginManager {
    pub fn new(services: Arc<ServiceContainer>, event_bus: Arc<EventBus>) -> Self {
        Self {
            registry: Arc::new(PluginRegistry::new()),
            event_bus,
            services,
        }
    }

    /// 내장 플러그인 등록
    pub async fn register_builtin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let id = plugin.manifest().id;
        if id != BUILTIN_PLUGIN_ID {
            return Err(Error::InvalidInput(format!(
                "Built-in plugin must use id {}, got {}",
                BUILTIN_PLUGIN_ID, id
            )));
        }

        if !self.registry.register(plugin, None).await {
            return Err(Error::Plugin(format!("{} is already registered", id)));
        }
        Ok(())
    }

    // ========================================================================
    // 로드/언로드
    // ========================================================================

    /// `Unloaded` 상태인 모든 플러그인을 등록 순서대로 로드
    ///
    /// 로드된 플러그인 ID를 반환합니다. 실패한 훅은 해당 플러그인만 `Unloaded`로 남깁니다.
    pub async fn load_all(&self) -> Vec<String> {
        let mut loaded = Vec::new();

        for id in self.registry.load_order().await {
            if self.registry.state(&id).await != Some(PluginState::Unloaded) {
                continue;
            }
            if self.load(&id).await {
                loaded.push(id);
            }
        }

        info!("Loaded {} plugins", loaded.len());
        loaded
    }

    async fn load(&self, id: &str) -> bool {
        let Some(plugin) = self.registry.get(id).await else {
            return false;
        };

        self.registry.set_state(id, PluginState::Loading).await;
        let ctx = self.context(id).await;

        let outcome = AssertUnwindSafe(plugin.on_load(&ctx)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => {
                self.registry.set_state(id, PluginState::Loaded).await;
                if let Some(snapshot) = self.registry.snapshot(id).await {
                    info!("Plugin {} (v{}) loaded", id, snapshot.manifest.version);
                    self.event_bus.publish(PluginEvent::loaded(snapshot)).await;
                }
                true
            }
            Ok(Err(e)) => {
                error!("Plugin {} failed to load: {}", id, e);
                self.registry.set_state(id, PluginState::Unloaded).await;
                false
            }
            Err(payload) => {
                error!(
                    "Plugin {} panicked while loading: {}",
                    id,
                    panic_message(payload.as_ref())
                );
                self.registry.set_state(id, PluginState::Unloaded).await;
                false
            }
        }
    }

    /// 내장 플러그인을 제외한 모든 플러그인을 역순으로 언로드하고 레지스트리에서 제거
    pub async fn unload_all(&self) -> Vec<String> {
        self.unload_where(|id| id != BUILTIN_PLUGIN_ID).await
    }

    /// 내장 플러그인을 포함해 모두 언로드
    pub async fn shutdown(&self) -> Vec<String> {
        self.unload_where(|_| true).await
    }

    async fn unload_where(&self, include: impl Fn(&str) -> bool) -> Vec<String> {
        let mut order = self.registry.load_order().await;
        order.reverse();

        let mut unloaded = Vec::new();
        for id in order.into_iter().filter(|id| include(id)) {
            if self.registry.state(&id).await == Some(PluginState::Loaded) {
                self.unload(&id).await;
                unloaded.push(id.clone());
            }
            self.registry.unregister(&id).await;
        }

        if !unloaded.is_empty() {
            info!("Unloaded {} plugins", unloaded.len());
        }
        unloaded
    }

    async fn unload(&self, id: &str) {
        let Some(plugin) = self.registry.get(id).await else {
            return;
        };

        self.registry.set_state(id, PluginState::Unloading).await;
        let ctx = self.context(id).await;

        match AssertUnwindSafe(plugin.on_unload(&ctx)).catch_unwind().await {
            Ok(Ok(())) => debug!("Plugin {} unload hook completed", id),
            Ok(Err(e)) => warn!("Plugin {} on_unload failed: {}", id, e),
            Err(payload) => warn!(
                "Plugin {} panicked while unloading: {}",
                id,
                panic_message(payload.as_ref())
            ),
        }

        self.registry.set_state(id, PluginState::Unloaded).await;
        if let Some(snapshot) = self.registry.snapshot(id).await {
            self.event_bus.publish(PluginEvent::unloaded(snapshot)).await;
        }
    }

    async fn context(&self, id: &str) -> PluginContext {
        let ctx = PluginContext::new(id, Arc::clone(&self.services), Arc::clone(&self.event_bus));
        match self.registry.module_path(id).await {
            Some(path) => ctx.with_plugin_dir(plugin_dir_of(&path)),
            None => ctx,
        }
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }
}

/// 모듈 경로 → 플러그인 디렉토리 (`dl/` 안의 모듈은 상위 디렉토리)
fn plugin_dir_of(module_path: &Path) -> PathBuf {
    let parent = module_path.parent().unwrap_or(module_path);
    match parent.file_name() {
        Some(name) if name == DEPENDENCY_DIR => parent.parent().unwrap_or(parent).to_path_buf(),
        _ => parent.to_path_buf(),
    }
}
