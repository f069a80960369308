// src/types.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

use crate::utils;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub timeout: Duration,
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Requests per minute, keyed by provider name. `None` disables limiting.
    pub rate_limits: HashMap<String, Option<u32>>,
    pub output: OutputConfig,
    pub enumeration: EnumerationConfig,
    pub resolver: ResolverConfig,
    pub geolocation: GeolocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        rate_limits.insert("crtsh".to_string(), None);
        rate_limits.insert("certspotter".to_string(), None);
        rate_limits.insert("hackertarget".to_string(), None);
        rate_limits.insert("ip-api".to_string(), Some(45));

        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            proxy: None,
            rate_limits,
            output: OutputConfig::default(),
            enumeration: EnumerationConfig::default(),
            resolver: ResolverConfig::default(),
            geolocation: GeolocationConfig::default(),
        }
    }
}

/// Where the report goes besides the stdout summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// HTML map path. `None` skips the map.
    pub map_file: Option<String>,
    pub theme: MapTheme,
    pub csv_file: Option<String>,
    pub json_file: Option<String>,
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            map_file: Some("attack_surface.html".to_string()),
            theme: MapTheme::Dark,
            csv_file: None,
            json_file: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MapTheme {
    Dark,
    Light,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationConfig {
    /// Providers in fallback order: primary, secondary, tertiary.
    pub sources: Vec<String>,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    /// The secondary provider is consulted when the primary accepted fewer names than this.
    pub secondary_threshold: usize,
    /// The tertiary provider is consulted when the combined set is still smaller than this.
    pub tertiary_threshold: usize,
    /// Resolve the target apex alongside the discovered names.
    pub include_apex: bool,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                "crtsh".to_string(),
                "certspotter".to_string(),
                "hackertarget".to_string(),
            ],
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            secondary_threshold: 10,
            tertiary_threshold: 5,
            include_apex: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub concurrency: usize,
    pub timeout: Duration,
    pub nameservers: Vec<String>,
    pub use_system_resolver: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            timeout: Duration::from_secs(3),
            nameservers: vec![
                "1.1.1.1:53".to_string(),
                "8.8.8.8:53".to_string(),
                "9.9.9.9:53".to_string(),
            ],
            use_system_resolver: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    pub endpoint: String,
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub timeout: Duration,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://ip-api.com".to_string(),
            batch_size: 100,
            inter_batch_delay: Duration::from_millis(1500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// A lower-cased subdomain that passed validation against its target domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateName(String);

impl CandidateName {
    /// Normalizes a raw provider entry, returning `None` when it is not a
    /// proper subdomain of `domain`.
    pub fn parse(raw: &str, domain: &str) -> Option<Self> {
        utils::normalize_candidate(raw, domain).map(Self)
    }

    /// The target domain itself, used when the apex is resolved alongside its subdomains.
    pub fn apex(domain: &str) -> Self {
        Self(domain.trim().trim_end_matches('.').to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for CandidateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionErrorKind {
    NotFound,
    NoAnswer,
    Timeout,
    Other,
}

impl fmt::Display for ResolutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionErrorKind::NotFound => "NXDOMAIN",
            ResolutionErrorKind::NoAnswer => "NoAnswer",
            ResolutionErrorKind::Timeout => "Timeout",
            ResolutionErrorKind::Other => "Other",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub name: CandidateName,
    pub address: Option<Ipv4Addr>,
    pub alive: bool,
    pub alias: Option<String>,
    pub error_kind: Option<ResolutionErrorKind>,
    pub error_message: Option<String>,
}

impl ResolutionRecord {
    pub fn alive(name: CandidateName, address: Ipv4Addr, alias: Option<String>) -> Self {
        Self {
            name,
            address: Some(address),
            alive: true,
            alias,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(name: CandidateName, kind: ResolutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            name,
            address: None,
            alive: false,
            alias: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub address: Ipv4Addr,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub isp: Option<String>,
    pub organization: Option<String>,
    pub autonomous_system: Option<String>,
    pub success: bool,
}

impl GeoRecord {
    /// A record for an address the provider could not locate.
    pub fn failed(address: Ipv4Addr) -> Self {
        Self {
            address,
            country: None,
            country_code: None,
            region: None,
            city: None,
            latitude: None,
            longitude: None,
            isp: None,
            organization: None,
            autonomous_system: None,
            success: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Safe,
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Safe => "SAFE",
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfrastructureKind {
    Cloud,
    Cdn,
    Vps,
    Isp,
    Unknown,
}

impl fmt::Display for InfrastructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InfrastructureKind::Cloud => "cloud",
            InfrastructureKind::Cdn => "cdn",
            InfrastructureKind::Vps => "vps",
            InfrastructureKind::Isp => "isp",
            InfrastructureKind::Unknown => "unknown",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub name: CandidateName,
    pub address: Ipv4Addr,
    pub alias: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub isp: Option<String>,
    pub organization: Option<String>,
    pub autonomous_system: Option<String>,
    pub geo_success: bool,
    pub infrastructure: InfrastructureKind,
    pub risk_tier: RiskTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconStats {
    pub candidates: usize,
    /// Names whose lookup finished, alive or not.
    pub looked_up: usize,
    pub alive: usize,
    pub unique_addresses: usize,
    pub geolocated: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconReport {
    pub domain: String,
    pub records: Vec<AggregatedRecord>,
    pub stats: ReconStats,
    pub timestamp: String,
    /// Set when cancellation cut resolution or geolocation short.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoCandidates,
    NoLiveHosts,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoCandidates => {
                f.write_str("no subdomains found, target may have limited CT log presence")
            }
            EmptyReason::NoLiveHosts => {
                f.write_str("no live hosts found, all subdomains appear to be defunct")
            }
        }
    }
}

#[derive(Debug)]
pub enum ReconOutcome {
    Report(ReconReport),
    Empty(EmptyReason),
    /// Cancelled before any name was resolved, so there is nothing to report.
    Cancelled,
}

pub struct SourceInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum ReconMapError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source {source_name} temporarily unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Source error in {source_name}: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Resolution error: {0}")]
    ResolutionError(String),

    #[error("Geolocation error: {0}")]
    GeolocationError(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl ReconMapError {
    /// Whether a retry policy may try the same call again.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconMapError::SourceUnavailable { .. } | ReconMapError::TimeoutError(_) => true,
            ReconMapError::HttpError(e) => e.is_timeout(),
            _ => false,
        }
    }
}
