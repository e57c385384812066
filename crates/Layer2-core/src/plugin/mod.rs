//! # Plugin System
//!
//! 로드된 모듈의 익스포트 → 살아있는 플러그인 인스턴스
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                   PluginRegistry                       │ │
//! │  │  ┌────────────┬────────────┬────────────────────┐    │ │
//! │  │  │ builtin    │ Plugin A   │ Plugin B           │    │ │
//! │  │  │ (always)   │ (a.so)     │ (b.so)             │    │ │
//! │  │  └────────────┴────────────┴────────────────────┘    │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │                          │                                  │
//! │  ┌───────────────────────┼───────────────────────────────┐ │
//! │  │     PluginContext     │                               │ │
//! │  │  - ServiceContainer   │                               │ │
//! │  │  - EventBus           │                               │ │
//! │  │  - plugin dir         │                               │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct SamplePlugin { info: Arc<HostInfo> }
//!
//! #[async_trait]
//! impl Plugin for SamplePlugin {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest::new("SamplePlugin", "Sample")
//!             .with_provides(PluginProvides::new().with_command("roll"))
//!     }
//!     async fn on_load(&self, ctx: &PluginContext) -> Result<()> { Ok(()) }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! fn register(registrar: &mut PluginRegistrar) {
//!     registrar.register_plugin("SamplePlugin", |services| {
//!         Ok(Arc::new(SamplePlugin { info: services.require()? }))
//!     });
//! }
//!
//! kiln_core::export_plugin!(register);
//! ```

mod builtin;
mod events;
mod manager;
mod manifest;
mod registry;
mod services;
mod traits;

pub use builtin::{HostBuiltin, HostInfo};
pub use events::{EventBus, EventKind, PluginEvent, PluginEventHandler};
pub use manager::{PluginManager, BUILTIN_PLUGIN_ID};
pub use manifest::{PluginManifest, PluginProvides};
pub use registry::{PluginInfo, PluginRegistry, PluginSnapshot};
pub use services::{ServiceContainer, ServiceExtension};
pub use traits::{Plugin, PluginContext, PluginFactory, PluginState};
