// src/sources/crtsh.rs
use crate::session::Session;
use crate::sources::Source;
use crate::types::{ReconMapError, SourceInfo};
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://crt.sh";

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    #[serde(default)]
    name_value: String,
}

/// crt.sh certificate transparency logs source
#[derive(Debug, Clone)]
pub struct CrtShSource {
    name: String,
    base_url: String,
}

impl Default for CrtShSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CrtShSource {
    pub fn new() -> Self {
        Self {
            name: "crtsh".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Source for CrtShSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name().to_string(),
            description: "Certificate transparency search (primary, retried)".to_string(),
        }
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ReconMapError> {
        let url = format!("{}/?q={}&output=json", self.base_url, urlencoding::encode(domain));
        let text = session.get_text(&self.name, &url).await?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<CrtShEntry> = serde_json::from_str(&text).map_err(|e| ReconMapError::SourceError {
            source_name: self.name.to_string(),
            message: format!("Failed to parse JSON: {}", e),
        })?;

        // name_value can contain multiple names separated by newlines
        Ok(entries
            .iter()
            .flat_map(|entry| entry.name_value.lines())
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}
