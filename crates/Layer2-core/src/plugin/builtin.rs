//! Built-in plugin - 호스트의 상시 기능 집합
//!
//! 리로드 사이클에서 언로드되지 않으며, 로드 시 `HostInfo` 서비스를 컨테이너에 등록합니다.

use super::manager::BUILTIN_PLUGIN_ID;
use super::manifest::{PluginManifest, PluginProvides};
use super::traits::{Plugin, PluginContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_foundation::Result;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 내장 명령
const BUILTIN_COMMANDS: &[&str] = &["plugins", "reload"];

/// 플러그인이 주입받을 수 있는 호스트 정보
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub version: String,
    pub started_at: DateTime<Utc>,

    /// 확정된 플러그인 루트
    pub plugins_root: Option<PathBuf>,
}

/// 내장 플러그인
pub struct HostBuiltin {
    version: semver::Version,
    plugins_root: Option<PathBuf>,
}

impl HostBuiltin {
    pub fn new() -> Self {
        Self {
            version: semver::Version::parse(env!("CARGO_PKG_VERSION"))
                .unwrap_or_else(|_| semver::Version::new(0, 0, 0)),
            plugins_root: None,
        }
    }

    pub fn with_plugins_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.plugins_root = Some(root.into());
        self
    }
}

impl Default for HostBuiltin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for HostBuiltin {
    fn manifest(&self) -> PluginManifest {
        let provides = BUILTIN_COMMANDS
            .iter()
            .fold(PluginProvides::new(), |p, c| p.with_command(*c));

        PluginManifest::new(BUILTIN_PLUGIN_ID, "Kiln")
            .with_version(self.version.clone())
            .with_description("Host built-in features")
            .with_provides(provides)
            .stealth()
    }

    async fn on_load(&self, ctx: &PluginContext) -> Result<()> {
        if !ctx.services().contains::<HostInfo>() {
            ctx.services().register(Arc::new(HostInfo {
                version: self.version.to_string(),
                started_at: Utc::now(),
                plugins_root: self.plugins_root.clone(),
            }));
        }
        debug!("Built-in features ready");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
