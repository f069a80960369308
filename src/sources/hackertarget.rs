// src/sources/hackertarget.rs
use crate::session::Session;
use crate::sources::Source;
use crate::types::{ReconMapError, SourceInfo};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.hackertarget.com";

/// HackerTarget API source
#[derive(Debug, Clone)]
pub struct HackerTargetSource {
    name: String,
    base_url: String,
}

impl Default for HackerTargetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HackerTargetSource {
    pub fn new() -> Self {
        Self {
            name: "hackertarget".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Source for HackerTargetSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name().to_string(),
            description: "HackerTarget host search (tertiary, best-effort)".to_string(),
        }
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ReconMapError> {
        let url = format!("{}/hostsearch/?q={}", self.base_url, urlencoding::encode(domain));
        let text = session.get_text(&self.name, &url).await?;

        // plaintext, one "subdomain,ip" per line
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| line.contains(',') && !line.to_lowercase().contains("error"))
            .filter_map(|line| line.split(',').next())
            .map(|subdomain| subdomain.trim().to_string())
            .filter(|subdomain| !subdomain.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_parses_csv_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/hostsearch/")
            .match_query(Matcher::UrlEncoded("q".into(), "example.com".into()))
            .with_status(200)
            .with_body("mail.example.com,198.51.100.7\nvpn.example.com,198.51.100.8\n")
            .create_async()
            .await;

        let session = Session::new(&Config::default()).unwrap();
        let source = HackerTargetSource::new().with_base_url(server.url());
        let names = source.enumerate("example.com", &session).await.unwrap();

        assert_eq!(names, vec!["mail.example.com", "vpn.example.com"]);
    }

    #[tokio::test]
    async fn test_skips_error_and_quota_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/hostsearch/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("API count exceeded - Increase Quota with Membership\nerror check your search parameter,x\n")
            .create_async()
            .await;

        let session = Session::new(&Config::default()).unwrap();
        let source = HackerTargetSource::new().with_base_url(server.url());
        assert!(source.enumerate("example.com", &session).await.unwrap().is_empty());
    }
}
