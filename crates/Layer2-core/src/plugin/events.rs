//! Plugin Events - 라이프사이클 이벤트 시스템
//!
//! 명령 등록기, 웹 API 등록기 같은 하위 시스템은 `PluginEventHandler`를 구현해
//! 플러그인 로드/언로드에 반응합니다.

use super::registry::PluginSnapshot;
use crate::loader::panic_message;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error};

// ============================================================================
// PluginEvent - 라이프사이클 이벤트
// ============================================================================

/// 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PluginLoaded,
    PluginUnloaded,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PluginLoaded => write!(f, "plugin_loaded"),
            Self::PluginUnloaded => write!(f, "plugin_unloaded"),
        }
    }
}

/// 로드/언로드 알림
#[derive(Debug, Clone, Serialize)]
pub struct PluginEvent {
    pub kind: EventKind,

    /// 이벤트 시점의 플러그인 스냅샷
    pub plugin: PluginSnapshot,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PluginEvent {
    pub fn new(kind: EventKind, plugin: PluginSnapshot) -> Self {
        Self {
            kind,
            plugin,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn loaded(plugin: PluginSnapshot) -> Self {
        Self::new(EventKind::PluginLoaded, plugin)
    }

    pub fn unloaded(plugin: PluginSnapshot) -> Self {
        Self::new(EventKind::PluginUnloaded, plugin)
    }
}

// ============================================================================
// PluginEventHandler
// ============================================================================

/// 로드/언로드에 반응하는 하위 시스템 (명령 등록기, 웹 API 등록기 등)
#[async_trait]
pub trait PluginEventHandler: Send + Sync {
    /// 교체/해제에 쓰는 고유 이름
    fn name(&self) -> &str;

    /// 받을 이벤트 종류 (기본: 전부)
    fn interested_events(&self) -> Vec<EventKind> {
        vec![EventKind::PluginLoaded, EventKind::PluginUnloaded]
    }

    async fn handle(&self, event: &PluginEvent);
}

// ============================================================================
// EventBus
// ============================================================================

/// 라이프사이클 이벤트 전달
///
/// 등록된 핸들러는 등록 순서대로 `publish` 안에서 await되고,
/// `subscribe` 수신자는 broadcast 채널로 받습니다. 최근 이벤트는 제한된 크기로 보관합니다.
pub struct EventBus {
    channel: broadcast::Sender<PluginEvent>,
    handlers: RwLock<Vec<Arc<dyn PluginEventHandler>>>,
    recent: RwLock<VecDeque<PluginEvent>>,
    retain: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256, 100)
    }

    /// 채널 버퍼 크기와 보관할 최근 이벤트 수 지정
    pub fn with_capacity(channel_capacity: usize, retain: usize) -> Self {
        let (channel, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            channel,
            handlers: RwLock::new(Vec::new()),
            recent: RwLock::new(VecDeque::with_capacity(retain)),
            retain,
        }
    }

    /// 핸들러 등록 (같은 이름이면 자리를 유지한 채 교체)
    pub async fn register_handler(&self, handler: Arc<dyn PluginEventHandler>) {
        let mut handlers = self.handlers.write().await;
        match handlers.iter_mut().find(|h| h.name() == handler.name()) {
            Some(existing) => *existing = handler,
            None => handlers.push(handler),
        }
    }

    pub async fn unregister_handler(&self, name: &str) {
        self.handlers.write().await.retain(|h| h.name() != name);
    }

    pub async fn publish(&self, event: PluginEvent) {
        debug!("Publishing {} for {}", event.kind, event.plugin.manifest.id);

        if self.retain > 0 {
            let mut recent = self.recent.write().await;
            while recent.len() >= self.retain {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        // 수신자가 없으면 send는 실패하지만 정상
        let _ = self.channel.send(event.clone());

        let handlers = self.handlers.read().await.clone();
        for handler in handlers
            .iter()
            .filter(|h| h.interested_events().contains(&event.kind))
        {
            if let Err(payload) = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                error!(
                    "Event handler {} panicked on {} for {}: {}",
                    handler.name(),
                    event.kind,
                    event.plugin.manifest.id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.channel.subscribe()
    }

    /// 보관 중인 최근 이벤트 (오래된 것부터)
    pub async fn history(&self) -> Vec<PluginEvent> {
        self.recent.read().await.iter().cloned().collect()
    }

    pub async fn history_by_kind(&self, kind: EventKind) -> Vec<PluginEvent> {
        self.recent
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.recent.write().await.clear();
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
