//! # Module Loader
//!
//! 설치된 파일 → 살아있는 모듈
//!
//! - `module.rs` - LoadedModule, ModuleLoader, NativeModuleLoader, `export_plugin!`
//! - `scanner.rs` - ModuleDiscoveryScanner (디렉토리 순회 + 모듈 캐시)

mod module;
mod scanner;

pub use module::{
    default_target, LoadError, LoadedModule, ModuleExports, ModuleLoader, NativeModuleLoader,
    PluginExport, PluginRegistrar, ABI_VERSION_SYMBOL, PLUGIN_ABI_VERSION, REGISTER_SYMBOL,
};
pub(crate) use module::panic_message;
pub use scanner::{ModuleDiscoveryScanner, ScanReport, SkippedModule, DEBUG_DIR};
