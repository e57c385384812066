//! Module Discovery Scanner - 플러그인 디렉토리에서 모듈 찾기
//!
//! - 플랫폼 동적 라이브러리 확장자만 대상
//! - `debug` 디렉토리 제외 (대소문자 무시)
//! - 파일 이름 기준 중복 제거 (정렬된 순회 순서에서 먼저 나온 것)
//! - 플러그인 계약 라이브러리 제외
//!
//! 한 파일의 실패가 스캔 전체를 멈추지 않습니다.
//! 모듈 캐시는 경로와 파일 스탬프(수정 시각, 크기)로 구분하므로 같은 경로에
//! 다시 설치된 모듈은 새로 로드됩니다.

use super::module::{LoadedModule, ModuleLoader};
use crate::resolver::{library_file_names, CONTRACT_LIBRARY};
use ignore::WalkBuilder;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// 제외하는 디버그 전용 디렉토리 이름
pub const DEBUG_DIR: &str = "debug";

/// 건너뛴 파일
#[derive(Debug, Clone)]
pub struct SkippedModule {
    pub path: PathBuf,
    pub reason: String,

    /// 의존성 누락 / 의존성 전용 라이브러리
    pub benign: bool,
}

/// 스캔 결과
#[derive(Debug, Default)]
pub struct ScanReport {
    pub modules: Vec<Arc<LoadedModule>>,
    pub skipped: Vec<SkippedModule>,
}

/// 파일 내용이 바뀌었는지 판단하는 스탬프
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

/// 모듈 탐색기
pub struct ModuleDiscoveryScanner {
    loader: Arc<dyn ModuleLoader>,

    /// 경로별 모듈 캐시 (프로세스 수명)
    cache: Mutex<HashMap<PathBuf, (Option<FileStamp>, Arc<LoadedModule>)>>,

    excluded_files: HashSet<String>,
}

impl ModuleDiscoveryScanner {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        let excluded_files = library_file_names(CONTRACT_LIBRARY)
            .into_iter()
            .map(|n| n.to_ascii_lowercase())
            .collect();

        Self {
            loader,
            cache: Mutex::new(HashMap::new()),
            excluded_files,
        }
    }

    /// 캐시된 모듈 수
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// 루트 아래의 모듈 파일 목록 (로드하지 않음)
    pub fn candidates(&self, root: &Path) -> Vec<PathBuf> {
        self.candidates_in(&[root.to_path_buf()])
    }

    /// 여러 루트의 모듈 파일 목록 (루트 순서대로, 파일 이름 중복은 전체에서 제거)
    pub fn candidates_in(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen_names = HashSet::new();
        let mut files = Vec::new();

        for root in roots {
            self.walk(root, &mut seen_names, &mut files);
        }
        files
    }

    fn walk(&self, root: &Path, seen_names: &mut HashSet<String>, files: &mut Vec<PathBuf>) {
        if !root.is_dir() {
            debug!("Plugin root {} does not exist", root.display());
            return;
        }

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(true)
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir && entry.depth() > 0 && entry.file_name().eq_ignore_ascii_case(DEBUG_DIR))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to walk plugin directory: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) || !is_module_file(entry.path()) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if self.excluded_files.contains(&name) {
                debug!("Skipping contract library {}", entry.path().display());
                continue;
            }
            if !seen_names.insert(name) {
                debug!("Skipping duplicate module {}", entry.path().display());
                continue;
            }

            files.push(entry.into_path());
        }
    }

    /// 모듈 파일을 찾아 로드
    pub fn scan(&self, root: &Path) -> ScanReport {
        self.scan_dirs(&[root.to_path_buf()])
    }

    /// 주어진 플러그인 디렉토리들만 탐색해 로드
    pub fn scan_dirs(&self, roots: &[PathBuf]) -> ScanReport {
        let mut report = ScanReport::default();

        for path in self.candidates_in(roots) {
            let stamp = FileStamp::of(&path);
            let cached = self
                .cache
                .lock()
                .get(&path)
                .filter(|(cached_stamp, _)| *cached_stamp == stamp)
                .map(|(_, module)| Arc::clone(module));

            if let Some(module) = cached {
                debug!("Reusing loaded module {}", path.display());
                if !module.exports().is_empty() {
                    report.modules.push(module);
                }
                continue;
            }

            match self.loader.load(&path) {
                Ok(module) => {
                    let module = Arc::new(module);
                    if self
                        .cache
                        .lock()
                        .insert(path.clone(), (stamp, module.clone()))
                        .is_some()
                    {
                        info!("Module {} changed on disk, loaded new copy", path.display());
                    }

                    if module.exports().is_empty() {
                        debug!("Module {} has no plugin exports", path.display());
                        continue;
                    }

                    debug!(
                        "Loaded module {} ({} plugins, {} extensions)",
                        module.file_name(),
                        module.exports().plugins.len(),
                        module.exports().extensions.len()
                    );
                    report.modules.push(module);
                }
                Err(e) => {
                    if e.is_benign() {
                        debug!("Skipping {}: {}", path.display(), e);
                    } else {
                        warn!("Failed to load module {}: {}", path.display(), e);
                    }
                    report.skipped.push(SkippedModule {
                        benign: e.is_benign(),
                        reason: e.to_string(),
                        path,
                    });
                }
            }
        }

        info!(
            "Module scan of {} plugin directories: {} loaded, {} skipped",
            roots.len(),
            report.modules.len(),
            report.skipped.len()
        );
        report
    }
}

fn is_module_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(std::env::consts::DLL_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::module::{LoadError, ModuleExports, PluginRegistrar};
    use crate::plugin::{Plugin, PluginContext, PluginManifest};
    use async_trait::async_trait;
    use kiln_foundation::Result;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Dummy;

    #[async_trait]
    impl Plugin for Dummy {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new("Dummy", "Dummy")
        }

        async fn on_load(&self, _ctx: &PluginContext) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// "good"으로 시작하는 파일만 로드되는 로더
    #[derive(Default)]
    struct FakeLoader {
        calls: AtomicUsize,
    }

    impl ModuleLoader for FakeLoader {
        fn load(&self, path: &Path) -> std::result::Result<LoadedModule, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = path.file_name().unwrap().to_string_lossy().to_string();

            if name.starts_with("good") {
                let mut registrar = PluginRegistrar::new();
                registrar.register_plugin("Dummy", |_| Ok(Arc::new(Dummy) as Arc<dyn Plugin>));
                Ok(LoadedModule::new(path, registrar.into_exports()))
            } else if name.starts_with("helper") {
                Ok(LoadedModule::new(path, ModuleExports::default()))
            } else if name.starts_with("needs") {
                Err(LoadError::MissingDependency("libzstd.so".into()))
            } else {
                Err(LoadError::Invalid("invalid ELF header".into()))
            }
        }
    }

    fn module_name(stem: &str) -> String {
        format!("{}.{}", stem, std::env::consts::DLL_EXTENSION)
    }

    fn touch(path: PathBuf) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_one_valid_one_corrupt() {
        let temp = TempDir::new().unwrap();
        touch(temp.path().join("SamplePlugin").join(module_name("good")));
        touch(temp.path().join("SamplePlugin").join(module_name("corrupt")));

        let scanner = ModuleDiscoveryScanner::new(Arc::new(FakeLoader::default()));
        let report = scanner.scan(temp.path());

        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(!report.skipped[0].benign);
    }

    #[test]
    fn test_filters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(root.join("a").join(module_name("good")));
        touch(root.join("b").join(module_name("good")));
        touch(root.join("a").join("Debug").join(module_name("good_debug")));
        touch(root.join("a").join("dl").join(module_name("needs_native")));
        touch(root.join("a").join("dl").join(module_name("helper")));
        touch(root.join("a").join("readme.txt"));
        touch(root.join("a").join(&library_file_names(CONTRACT_LIBRARY)[1]));

        let loader = Arc::new(FakeLoader::default());
        let scanner = ModuleDiscoveryScanner::new(loader.clone());

        let candidates = scanner.candidates(root);
        assert_eq!(candidates.len(), 3);
        assert!(candidates[0].starts_with(root.join("a")));

        let report = scanner.scan(root);
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].benign);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cache_reused_across_scans() {
        let temp = TempDir::new().unwrap();
        touch(temp.path().join("p").join(module_name("good")));

        let loader = Arc::new(FakeLoader::default());
        let scanner = ModuleDiscoveryScanner::new(loader.clone());

        let first = scanner.scan(temp.path());
        let second = scanner.scan(temp.path());

        assert!(Arc::ptr_eq(&first.modules[0], &second.modules[0]));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scanner.cached(), 1);
    }

    #[test]
    fn test_changed_module_reloaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p").join(module_name("good"));
        touch(path.clone());

        let loader = Arc::new(FakeLoader::default());
        let scanner = ModuleDiscoveryScanner::new(loader.clone());
        let first = scanner.scan(temp.path());

        std::fs::write(&path, b"upgraded module").unwrap();
        let second = scanner.scan(temp.path());

        assert!(!Arc::ptr_eq(&first.modules[0], &second.modules[0]));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scanner.cached(), 1);
    }

    #[test]
    fn test_scan_dirs_only_walks_given_plugins() {
        let temp = TempDir::new().unwrap();
        touch(temp.path().join("active").join(module_name("good")));
        touch(temp.path().join("stale").join(module_name("good_stale")));
        touch(temp.path().join("other").join(module_name("good")));

        let loader = Arc::new(FakeLoader::default());
        let scanner = ModuleDiscoveryScanner::new(loader.clone());
        let report = scanner.scan_dirs(&[temp.path().join("active"), temp.path().join("other")]);

        assert_eq!(report.modules.len(), 1);
        assert!(report.modules[0].path().starts_with(temp.path().join("active")));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_root() {
        let scanner = ModuleDiscoveryScanner::new(Arc::new(FakeLoader::default()));
        let report = scanner.scan(Path::new("/definitely/not/here"));
        assert!(report.modules.is_empty());
    }
}
