//! HTTP 피드

use super::{PackageFeed, VersionIndex, VERSION_INDEX_FILE};
use crate::package::{PackageIdentity, PackageMetadata, PACKAGE_METADATA_FILE};
use async_trait::async_trait;
use kiln_foundation::{Error, Result};
use reqwest::StatusCode;
use semver::Version;
use tracing::debug;

/// reqwest 기반 HTTP(S) 피드
pub struct HttpFeed {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// 커넥션 풀을 공유하는 클라이언트로 생성
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    fn index_url(&self, package: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            crate::package::normalize_name(package),
            VERSION_INDEX_FILE
        )
    }

    fn version_url(&self, identity: &PackageIdentity, file: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            identity.key(),
            identity.version,
            file
        )
    }

    /// GET 요청, 404는 None
    async fn get(&self, url: &str) -> Result<Option<reqwest::Response>> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Error::Http(format!("{}: HTTP {}", url, response.status())));
        }

        Ok(Some(response))
    }
}

#[async_trait]
impl PackageFeed for HttpFeed {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<Version>> {
        let Some(response) = self.get(&self.index_url(package)).await? else {
            return Ok(Vec::new());
        };

        let index: VersionIndex = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("invalid version index for {}: {}", package, e)))?;

        Ok(index.parsed())
    }

    async fn metadata(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>> {
        let url = self.version_url(identity, PACKAGE_METADATA_FILE);
        let Some(response) = self.get(&url).await? else {
            return Ok(None);
        };

        let metadata = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("invalid metadata for {}: {}", identity, e)))?;

        Ok(Some(metadata))
    }

    async fn download(&self, identity: &PackageIdentity) -> Result<Vec<u8>> {
        let url = self.version_url(identity, &identity.archive_name());

        let response = self
            .get(&url)
            .await
            .map_err(|e| Error::download(identity.to_string(), e.to_string()))?
            .ok_or_else(|| Error::download(identity.to_string(), "artifact not found on feed"))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::download(identity.to_string(), e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
