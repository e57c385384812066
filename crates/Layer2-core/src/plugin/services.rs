//! Service Container - 호스트 서비스 주입
//!
//! 플러그인 팩토리는 컨테이너에서 자신이 필요한 서비스를 꺼내 생성자에 주입합니다.
//! 모듈은 `ServiceExtension`으로 컨테이너에 서비스를 추가할 수 있습니다.

use kiln_foundation::{Error, Result};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type ServiceEntry = (&'static str, Arc<dyn Any + Send + Sync>);

/// 타입 기반 서비스 컨테이너
#[derive(Default)]
pub struct ServiceContainer {
    services: RwLock<HashMap<TypeId, ServiceEntry>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 서비스 등록 (같은 타입이 있으면 교체하고 true 반환)
    pub fn register<T: Any + Send + Sync>(&self, service: Arc<T>) -> bool {
        let name = std::any::type_name::<T>();
        debug!("Registering service {}", name);
        self.services
            .write()
            .insert(TypeId::of::<T>(), (name, service))
            .is_some()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let services = self.services.read();
        let (_, service) = services.get(&TypeId::of::<T>())?;
        Arc::clone(service).downcast::<T>().ok()
    }

    /// 필수 서비스 조회 (없으면 Instantiation 에러)
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get::<T>().ok_or_else(|| {
            Error::instantiation(
                std::any::type_name::<T>(),
                "service is not registered in the host container",
            )
        })
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    /// 등록된 서비스 타입 이름 (정렬)
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.read().values().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

// ============================================================================
// ServiceExtension
// ============================================================================

/// 모듈이 내보내는 서비스 등록 확장
///
/// 같은 모듈의 플러그인이 인스턴스화되기 전에 적용됩니다.
pub trait ServiceExtension: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, services: &ServiceContainer) -> Result<()>;
}
