//! Config - 플러그인 시스템 설정
//!
//! - `plugins.rs` - PluginsConfig (활성 플러그인, 피드, 설치 경로)

mod plugins;

pub use plugins::{
    HostConflictPolicy, PluginsConfig, ENV_FEEDS, ENV_PLUGINS_ROOT, PLUGINS_CONFIG_FILE,
};
