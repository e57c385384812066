//! Loaded Module - 동적 라이브러리와 그 익스포트
//!
//! 플러그인 모듈은 두 심볼을 내보냅니다:
//! - `kiln_plugin_abi_version: u32`
//! - `kiln_plugin_register(&mut PluginRegistrar)`
//!
//! 둘 다 `export_plugin!` 매크로가 생성합니다.

use crate::plugin::{Plugin, PluginFactory, ServiceContainer, ServiceExtension};
use kiln_foundation::{Error, Result};
use libloading::{Library, Symbol};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::debug;

/// 호스트가 이해하는 플러그인 ABI 버전
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// ABI 버전 심볼
pub const ABI_VERSION_SYMBOL: &[u8] = b"kiln_plugin_abi_version\0";

/// 등록 함수 심볼
pub const REGISTER_SYMBOL: &[u8] = b"kiln_plugin_register\0";

/// 기본 런타임 타겟 디스크립터
pub fn default_target() -> String {
    format!("kiln-abi{}", PLUGIN_ABI_VERSION)
}

type RegisterFn = unsafe extern "Rust" fn(&mut PluginRegistrar);

// ============================================================================
// PluginRegistrar - 모듈 익스포트 수집
// ============================================================================

/// 플러그인 익스포트 (타입 이름 + 팩토리)
#[derive(Clone)]
pub struct PluginExport {
    pub type_name: String,
    pub factory: PluginFactory,
}

impl std::fmt::Debug for PluginExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginExport")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 모듈의 익스포트 목록
#[derive(Clone, Default)]
pub struct ModuleExports {
    pub plugins: Vec<PluginExport>,
    pub extensions: Vec<Arc<dyn ServiceExtension>>,
}

impl ModuleExports {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.extensions.is_empty()
    }
}

/// 등록 함수에 전달되는 수집기
#[derive(Default)]
pub struct PluginRegistrar {
    exports: ModuleExports,
}

impl PluginRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 플러그인 팩토리 등록
    pub fn register_plugin<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&ServiceContainer) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.exports.plugins.push(PluginExport {
            type_name: type_name.into(),
            factory: Arc::new(factory),
        });
    }

    /// 서비스 확장 등록
    pub fn register_extension(&mut self, extension: Arc<dyn ServiceExtension>) {
        self.exports.extensions.push(extension);
    }

    pub fn into_exports(self) -> ModuleExports {
        self.exports
    }
}

/// 모듈에서 플러그인 심볼을 내보내는 매크로
///
/// ```ignore
/// fn register(registrar: &mut kiln_core::loader::PluginRegistrar) {
///     registrar.register_plugin("SamplePlugin", |services| {
///         Ok(std::sync::Arc::new(SamplePlugin::new(services.require()?)))
///     });
/// }
///
/// kiln_core::export_plugin!(register);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($register:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static kiln_plugin_abi_version: u32 = $crate::loader::PLUGIN_ABI_VERSION;

        #[no_mangle]
        pub extern "Rust" fn kiln_plugin_register(registrar: &mut $crate::loader::PluginRegistrar) {
            $register(registrar);
        }
    };
}

// ============================================================================
// LoadedModule
// ============================================================================

/// 로드된 모듈
///
/// 라이브러리 핸들은 모듈과 함께 살아 있으며, 모듈은 모듈 캐시에 의해 프로세스 종료까지 유지됩니다.
pub struct LoadedModule {
    path: PathBuf,
    file_name: String,
    exports: ModuleExports,
    _library: Option<Library>,
}

impl LoadedModule {
    /// 라이브러리 없이 생성 (정적 링크 플러그인, 테스트)
    pub fn new(path: impl Into<PathBuf>, exports: ModuleExports) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            path,
            file_name,
            exports,
            _library: None,
        }
    }

    fn with_library(path: &Path, exports: ModuleExports, library: Library) -> Self {
        Self {
            _library: Some(library),
            ..Self::new(path, exports)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn exports(&self) -> &ModuleExports {
        &self.exports
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("plugins", &self.exports.plugins.len())
            .field("extensions", &self.exports.extensions.len())
            .finish()
    }
}

// ============================================================================
// LoadError
// ============================================================================

/// 모듈 로드 실패
#[derive(Debug, ThisError)]
pub enum LoadError {
    /// 모듈이 의존하는 바이너리가 없음
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// 유효한 모듈 파일이 아님
    #[error("not a loadable module: {0}")]
    Invalid(String),

    /// 등록 함수가 없는 라이브러리 (의존성 전용)
    #[error("no registration entry point")]
    NoEntryPoint,

    #[error("plugin ABI {found} does not match host ABI {expected}")]
    AbiMismatch { found: u32, expected: u32 },

    #[error("registration panicked: {0}")]
    Panicked(String),
}

impl LoadError {
    /// debug 레벨로 조용히 건너뛸 실패인지 확인
    pub fn is_benign(&self) -> bool {
        matches!(self, LoadError::MissingDependency(_) | LoadError::NoEntryPoint)
    }

    /// 파이프라인 에러로 변환
    pub fn into_error(self, path: &Path) -> Error {
        Error::Load {
            path: path.display().to_string(),
            message: self.to_string(),
        }
    }

    /// 동적 로더 에러 메시지 분류
    fn classify(message: String) -> Self {
        const MISSING_DEPENDENCY_HINTS: &[&str] = &[
            "cannot open shared object file",
            "Library not loaded",
            "The specified module could not be found",
            "os error 126",
        ];

        if MISSING_DEPENDENCY_HINTS.iter().any(|hint| message.contains(hint)) {
            LoadError::MissingDependency(message)
        } else {
            LoadError::Invalid(message)
        }
    }
}

/// panic 페이로드에서 메시지 추출
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// ModuleLoader
// ============================================================================

/// 모듈 로더 인터페이스
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> std::result::Result<LoadedModule, LoadError>;
}

/// libloading 기반 네이티브 모듈 로더
#[derive(Debug, Default)]
pub struct NativeModuleLoader;

impl NativeModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for NativeModuleLoader {
    fn load(&self, path: &Path) -> std::result::Result<LoadedModule, LoadError> {
        debug!("Loading module {}", path.display());

        // SAFETY: 플러그인 모듈은 호스트 권한으로 실행되는 신뢰된 코드입니다.
        let library =
            unsafe { Library::new(path) }.map_err(|e| LoadError::classify(e.to_string()))?;

        let found = {
            let abi: Symbol<*const u32> =
                unsafe { library.get(ABI_VERSION_SYMBOL) }.map_err(|_| LoadError::NoEntryPoint)?;
            unsafe { **abi }
        };
        if found != PLUGIN_ABI_VERSION {
            return Err(LoadError::AbiMismatch {
                found,
                expected: PLUGIN_ABI_VERSION,
            });
        }

        let mut registrar = PluginRegistrar::new();
        {
            let register: Symbol<RegisterFn> =
                unsafe { library.get(REGISTER_SYMBOL) }.map_err(|_| LoadError::NoEntryPoint)?;

            panic::catch_unwind(AssertUnwindSafe(|| unsafe { register(&mut registrar) }))
                .map_err(|payload| LoadError::Panicked(panic_message(payload.as_ref())))?;
        }

        Ok(LoadedModule::with_library(
            path,
            registrar.into_exports(),
            library,
        ))
    }
}
