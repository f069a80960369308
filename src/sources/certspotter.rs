// src/sources/certspotter.rs
use crate::session::Session;
use crate::sources::Source;
use crate::types::{ReconMapError, SourceInfo};
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.certspotter.com";

#[derive(Debug, Deserialize)]
struct Issuance {
    #[serde(default)]
    dns_names: Vec<String>,
}

/// CertSpotter issuance API, consulted when crt.sh comes back thin
#[derive(Debug, Clone)]
pub struct CertSpotterSource {
    name: String,
    base_url: String,
}

impl Default for CertSpotterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CertSpotterSource {
    pub fn new() -> Self {
        Self {
            name: "certspotter".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Source for CertSpotterSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name().to_string(),
            description: "CertSpotter issuances (secondary, best-effort)".to_string(),
        }
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ReconMapError> {
        let url = format!(
            "{}/v1/issuances?domain={}&include_subdomains=true&expand=dns_names",
            self.base_url,
            urlencoding::encode(domain)
        );
        let text = session.get_text(&self.name, &url).await?;

        let issuances: Vec<Issuance> = serde_json::from_str(&text).map_err(|e| ReconMapError::SourceError {
            source_name: self.name.to_string(),
            message: format!("Failed to parse JSON: {}", e),
        })?;

        Ok(issuances.into_iter().flat_map(|issuance| issuance.dns_names).collect())
    }
}
