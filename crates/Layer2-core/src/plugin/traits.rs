//! Plugin traits - 핵심 플러그인 인터페이스

use super::events::EventBus;
use super::manifest::PluginManifest;
use super::services::ServiceContainer;
use async_trait::async_trait;
use kiln_foundation::Result;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 플러그인 팩토리 - 컨테이너에서 의존성을 꺼내 인스턴스 생성
pub type PluginFactory =
    Arc<dyn Fn(&ServiceContainer) -> Result<Arc<dyn Plugin>> + Send + Sync>;

// ============================================================================
// PluginState - 라이프사이클 상태
// ============================================================================

/// 매니페스트별 상태
///
/// `Unloaded → Loading → Loaded → Unloading → Unloaded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loading => write!(f, "loading"),
            Self::Loaded => write!(f, "loaded"),
            Self::Unloading => write!(f, "unloading"),
        }
    }
}

// ============================================================================
// PluginContext - 훅에 전달되는 컨텍스트
// ============================================================================

/// 플러그인 컨텍스트 - 플러그인이 호스트와 상호작용하는 인터페이스
pub struct PluginContext {
    plugin_id: String,

    /// 호스트 서비스 컨테이너
    services: Arc<ServiceContainer>,

    /// 이벤트 버스
    event_bus: Arc<EventBus>,

    /// 플러그인 설치 디렉토리 (내장 플러그인은 None)
    plugin_dir: Option<PathBuf>,
}

impl PluginContext {
    pub fn new(
        plugin_id: impl Into<String>,
        services: Arc<ServiceContainer>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            services,
            event_bus,
            plugin_dir: None,
        }
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn plugin_dir(&self) -> Option<&Path> {
        self.plugin_dir.as_deref()
    }
}

// ============================================================================
// Plugin Trait
// ============================================================================

/// 플러그인 트레이트
///
/// 모듈은 `export_plugin!`으로 이 트레이트의 구현을 팩토리와 함께 내보냅니다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 플러그인 매니페스트 반환
    fn manifest(&self) -> PluginManifest;

    /// 로드 훅
    async fn on_load(&self, ctx: &PluginContext) -> Result<()>;

    /// 언로드 훅
    async fn on_unload(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// 타입 캐스팅을 위한 헬퍼 (다운캐스팅 지원)
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::PluginProvides;

    struct TestPlugin;

    #[async_trait]
    impl Plugin for TestPlugin {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new("test.plugin", "Test Plugin")
                .with_provides(PluginProvides::new().with_command("ping"))
        }

        async fn on_load(&self, ctx: &PluginContext) -> Result<()> {
            assert_eq!(ctx.plugin_id(), "test.plugin");
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_plugin_hooks() {
        let plugin = TestPlugin;
        let ctx = PluginContext::new(
            "test.plugin",
            Arc::new(ServiceContainer::new()),
            Arc::new(EventBus::new()),
        )
        .with_plugin_dir("/tmp/plugins/test.plugin");

        plugin.on_load(&ctx).await.unwrap();
        plugin.on_unload(&ctx).await.unwrap();

        assert!(plugin.manifest().provides.commands.contains(&"ping".to_string()));
        assert!(plugin.as_any().downcast_ref::<TestPlugin>().is_some());
        assert_eq!(ctx.plugin_dir(), Some(Path::new("/tmp/plugins/test.plugin")));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PluginState::Loading.to_string(), "loading");
        assert_eq!(
            serde_json::to_string(&PluginState::Loaded).unwrap(),
            "\"loaded\""
        );
    }
}
