//! 설정 디렉토리의 JSON 파일
//!
//! 글로벌(`{config_dir}/kiln/`)과 프로젝트(`./.kiln/`) 두 위치를 같은 방식으로 다룹니다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// 프로젝트 설정 디렉토리 이름
pub const PROJECT_DIR_NAME: &str = ".kiln";

/// 애플리케이션 디렉토리 이름
const APP_DIR_NAME: &str = "kiln";

/// 디렉토리 하나에 묶인 JSON 파일 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 사용자 전역 저장소
    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR_NAME)))
            .ok_or_else(|| Error::Config("no user configuration directory on this platform".into()))
    }

    /// 프로젝트 루트 아래 `.kiln/`
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(PROJECT_DIR_NAME))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("working directory unavailable: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// 파일이 없으면 None, 있는데 읽거나 파싱할 수 없으면 `Error::Config`
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.path_of(filename);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!("{}: {}", path.display(), e)));
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// 임시 파일에 쓴 뒤 교체
    pub fn save<T: Serialize>(&self, filename: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Storage(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.path_of(filename);
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(value)?;

        std::fs::write(&staging, content)
            .and_then(|_| std::fs::rename(&staging, &path))
            .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Feeds {
        feeds: Vec<String>,
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("nested"));
        let feeds = Feeds {
            feeds: vec!["https://feed.example.com".into()],
        };

        store.save("feeds.json", &feeds).unwrap();

        assert!(!store.path_of("feeds.json.tmp").exists());
        assert_eq!(store.load_optional::<Feeds>("feeds.json").unwrap(), Some(feeds));
    }

    #[test]
    fn test_missing_and_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path());
        assert_eq!(store.load_optional::<Feeds>("missing.json").unwrap(), None);

        std::fs::write(store.path_of("broken.json"), "{ not json").unwrap();
        let err = store.load_optional::<Feeds>("broken.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_project_dir() {
        let store = JsonStore::project("/work");
        assert_eq!(store.base_dir(), Path::new("/work/.kiln"));
    }
}
