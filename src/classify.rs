// src/classify.rs
//! Joins resolution and geolocation output and assigns each live host a risk tier.
//!
//! Tiers are decided by case-insensitive substring matching on the
//! organization and ISP labels. Categories are checked in a fixed order and
//! the first match wins, so a label that names both a cloud provider and a
//! residential ISP is treated as cloud.

use crate::types::{AggregatedRecord, CandidateName, GeoRecord, InfrastructureKind, ResolutionRecord, RiskTier};
use std::collections::HashMap;
use std::net::Ipv4Addr;

const CLOUD_FRAGMENTS: &[&str] = &[
    "amazon",
    "aws",
    "ec2",
    "amazonaws",
    "google",
    "gcp",
    "cloud platform",
    "microsoft",
    "azure",
];

const CDN_FRAGMENTS: &[&str] = &["cloudflare", "akamai", "fastly", "cdn", "edgecast", "incapsula"];

const VPS_FRAGMENTS: &[&str] = &["digitalocean", "linode", "vultr", "ovh", "hetzner", "contabo"];

const ISP_FRAGMENTS: &[&str] = &[
    // Brazil
    "vivo",
    "claro",
    "tim",
    "oi ",
    "net virtua",
    "gvt",
    // United States
    "comcast",
    "verizon",
    "at&t",
    "spectrum",
    "cox",
];

const PRECEDENCE: &[(&[&str], InfrastructureKind)] = &[
    (CLOUD_FRAGMENTS, InfrastructureKind::Cloud),
    (CDN_FRAGMENTS, InfrastructureKind::Cdn),
    (VPS_FRAGMENTS, InfrastructureKind::Vps),
    (ISP_FRAGMENTS, InfrastructureKind::Isp),
];

impl InfrastructureKind {
    pub fn risk_tier(self) -> RiskTier {
        match self {
            InfrastructureKind::Cloud => RiskTier::Safe,
            InfrastructureKind::Cdn => RiskTier::Low,
            InfrastructureKind::Vps => RiskTier::Medium,
            InfrastructureKind::Isp | InfrastructureKind::Unknown => RiskTier::High,
        }
    }
}

/// Identify the kind of infrastructure behind an organization/ISP pair.
pub fn categorize(organization: &str, isp: &str) -> InfrastructureKind {
    let label = format!("{} {}", organization, isp).to_lowercase();

    PRECEDENCE
        .iter()
        .find(|(fragments, _)| fragments.iter().any(|fragment| label.contains(fragment)))
        .map(|(_, kind)| *kind)
        .unwrap_or(InfrastructureKind::Unknown)
}

pub fn classify(organization: &str, isp: &str) -> RiskTier {
    categorize(organization, isp).risk_tier()
}

/// One record per alive resolution, joined with its address's geolocation.
/// A missing geo entry is treated as an unsuccessful lookup. Sorted by name.
pub fn aggregate(
    resolutions: &HashMap<CandidateName, ResolutionRecord>,
    geos: &HashMap<Ipv4Addr, GeoRecord>,
) -> Vec<AggregatedRecord> {
    let mut records: Vec<AggregatedRecord> = resolutions
        .values()
        .filter(|resolution| resolution.alive)
        .filter_map(|resolution| {
            let address = resolution.address?;
            let geo = geos.get(&address).cloned().unwrap_or_else(|| GeoRecord::failed(address));
            let infrastructure = categorize(
                geo.organization.as_deref().unwrap_or_default(),
                geo.isp.as_deref().unwrap_or_default(),
            );

            Some(AggregatedRecord {
                name: resolution.name.clone(),
                address,
                alias: resolution.alias.clone(),
                country: geo.country,
                country_code: geo.country_code,
                region: geo.region,
                city: geo.city,
                latitude: geo.latitude,
                longitude: geo.longitude,
                isp: geo.isp,
                organization: geo.organization,
                autonomous_system: geo.autonomous_system,
                geo_success: geo.success,
                infrastructure,
                risk_tier: infrastructure.risk_tier(),
            })
        })
        .collect();

    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}
