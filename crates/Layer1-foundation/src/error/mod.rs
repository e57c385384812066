//! Error types for Kiln
//!
//! 파이프라인 전체의 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Kiln 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 패키지 해석 관련
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resolution conflict for {package}: {detail}")]
    ResolutionConflict { package: String, detail: String },

    #[error("Download failed for {package}: {message}")]
    Download { package: String, message: String },

    // ========================================================================
    // 모듈/플러그인 관련
    // ========================================================================
    #[error("Failed to load module {path}: {message}")]
    Load { path: String, message: String },

    #[error("Failed to instantiate {type_name}: {message}")]
    Instantiation { type_name: String, message: String },

    #[error("Plugin error: {0}")]
    Plugin(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Host is busy: {0}")]
    Busy(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 다음 reload 시 재시도할 가치가 있는 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Download { .. } | Error::Http(_) | Error::Io(_))
    }

    /// 해당 플러그인만 건너뛰고 배치를 계속 진행할 수 있는 에러인지 확인
    pub fn is_skippable(&self) -> bool {
        !matches!(self, Error::Cancelled | Error::Busy(_))
    }

    /// 해석 충돌 에러 생성 헬퍼
    pub fn conflict(package: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::ResolutionConflict {
            package: package.into(),
            detail: detail.into(),
        }
    }

    /// 다운로드 실패 에러 생성 헬퍼
    pub fn download(package: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Download {
            package: package.into(),
            message: message.into(),
        }
    }

    /// 인스턴스화 실패 에러 생성 헬퍼
    pub fn instantiation(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Instantiation {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
