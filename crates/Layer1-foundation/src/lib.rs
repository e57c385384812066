//! # kiln-foundation
//!
//! Foundation layer for Kiln:
//! - Error: 파이프라인 공통 에러 타입
//! - Config: 플러그인 설정 (PluginsConfig)
//! - Storage: JsonStore (글로벌 + 프로젝트 설정 파일)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    HostConflictPolicy, PluginsConfig, ENV_FEEDS, ENV_PLUGINS_ROOT, PLUGINS_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
