// src/sources/mod.rs
use crate::session::Session;
use crate::types::{ReconMapError, SourceInfo};
use async_trait::async_trait;

mod certspotter;
mod crtsh;
mod hackertarget;

pub use certspotter::CertSpotterSource;
pub use crtsh::CrtShSource;
pub use hackertarget::HackerTargetSource;

/// A public subdomain-discovery provider.
///
/// Implementations return raw names exactly as the provider lists them;
/// normalization and validation happen in the enumerator.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;
    fn info(&self) -> SourceInfo;
    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ReconMapError>;
}

pub fn create_source(name: &str) -> Option<Box<dyn Source>> {
    match name.to_lowercase().as_str() {
        "crtsh" => Some(Box::new(CrtShSource::new())),
        "certspotter" => Some(Box::new(CertSpotterSource::new())),
        "hackertarget" => Some(Box::new(HackerTargetSource::new())),
        _ => None,
    }
}

pub fn get_all_sources() -> Vec<Box<dyn Source>> {
    ["crtsh", "certspotter", "hackertarget"]
        .into_iter()
        .filter_map(create_source)
        .collect()
}
