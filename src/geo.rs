// src/geo.rs
use crate::cancel::CancelSignal;
use crate::progress::{ReportEvent, Reporter, Stage};
use crate::session::Session;
use crate::types::{GeoRecord, GeolocationConfig, ReconMapError};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "ip-api";

/// The geolocation boundary: one bulk query per batch, or a single lookup.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn locate_batch(&self, addresses: &[Ipv4Addr]) -> Result<Vec<GeoRecord>, ReconMapError>;
    async fn locate_one(&self, address: Ipv4Addr) -> Result<GeoRecord, ReconMapError>;
}

#[derive(Debug, Serialize)]
struct BatchQuery {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiEntry {
    #[serde(default)]
    status: String,
    #[serde(default)]
    query: String,
    country: Option<String>,
    country_code: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
    org: Option<String>,
    #[serde(rename = "as")]
    as_number: Option<String>,
}

impl IpApiEntry {
    fn into_record(self, address: Ipv4Addr) -> GeoRecord {
        if self.status != "success" {
            return GeoRecord::failed(address);
        }

        GeoRecord {
            address,
            country: self.country,
            country_code: self.country_code,
            region: self.region_name,
            city: self.city,
            latitude: self.lat,
            longitude: self.lon,
            isp: self.isp,
            organization: self.org,
            autonomous_system: self.as_number,
            success: true,
        }
    }
}

/// ip-api.com client (free tier: batch endpoint plus a rate-limited single endpoint).
pub struct IpApiProvider {
    session: Session,
    base_url: String,
}

impl IpApiProvider {
    pub fn new(session: Session, base_url: impl Into<String>) -> Self {
        Self {
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    async fn locate_batch(&self, addresses: &[Ipv4Addr]) -> Result<Vec<GeoRecord>, ReconMapError> {
        let payload: Vec<BatchQuery> = addresses
            .iter()
            .map(|ip| BatchQuery { query: ip.to_string() })
            .collect();

        let entries: Vec<IpApiEntry> = self
            .session
            .post_json(PROVIDER, &format!("{}/batch", self.base_url), &payload)
            .await?;

        // entries the provider echoes back with an unparseable query are dropped;
        // the geolocator fills the gap with a failed record
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let address = entry.query.parse::<Ipv4Addr>().ok()?;
                Some(entry.into_record(address))
            })
            .collect())
    }

    async fn locate_one(&self, address: Ipv4Addr) -> Result<GeoRecord, ReconMapError> {
        let url = format!("{}/json/{}", self.base_url, address);
        let text = self.session.get_text(PROVIDER, &url).await?;
        let entry: IpApiEntry = serde_json::from_str(&text)
            .map_err(|e| ReconMapError::GeolocationError(format!("Invalid JSON for {}: {}", address, e)))?;
        Ok(entry.into_record(address))
    }
}

/// Geolocation results. `complete` is false when cancellation prevented a batch from starting.
#[derive(Debug, Clone)]
pub struct GeoOutcome {
    pub records: HashMap<Ipv4Addr, GeoRecord>,
    pub complete: bool,
}

/// Splits distinct addresses into fixed-size batches and submits them one
/// after another, sleeping between consecutive submissions.
pub struct BatchGeolocator {
    provider: Arc<dyn GeoProvider>,
    batch_size: usize,
    inter_batch_delay: Duration,
    reporter: Arc<dyn Reporter>,
}

impl BatchGeolocator {
    pub fn new(
        provider: Arc<dyn GeoProvider>,
        batch_size: usize,
        inter_batch_delay: Duration,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            inter_batch_delay,
            reporter,
        }
    }

    pub fn from_config(
        config: &GeolocationConfig,
        session: Session,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let provider = IpApiProvider::new(session, config.endpoint.clone());
        Self::new(Arc::new(provider), config.batch_size, config.inter_batch_delay, reporter)
    }

    pub async fn locate<I>(&self, addresses: I, cancel: &CancelSignal) -> GeoOutcome
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let unique: Vec<Ipv4Addr> = addresses.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        self.reporter.report(ReportEvent::StageStarted {
            stage: Stage::Geolocation,
            total: unique.len(),
        });

        let mut records = HashMap::with_capacity(unique.len());
        let mut complete = true;

        for (index, batch) in unique.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.inter_batch_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                complete = false;
                break;
            }

            self.run_batch(index, batch, &mut records).await;
        }

        if complete {
            let located = records.values().filter(|r| r.success).count();
            let countries: BTreeSet<&str> = records.values().filter_map(|r| r.country.as_deref()).collect();
            self.reporter.report(ReportEvent::StageFinished {
                stage: Stage::Geolocation,
                summary: format!("{} located across {} countries", located, countries.len()),
            });
        } else {
            self.reporter.report(ReportEvent::Cancelled {
                stage: Stage::Geolocation,
            });
        }

        GeoOutcome { records, complete }
    }

    async fn run_batch(&self, index: usize, batch: &[Ipv4Addr], records: &mut HashMap<Ipv4Addr, GeoRecord>) {
        debug!("Submitting geolocation batch {} ({} addresses)", index + 1, batch.len());

        match self.provider.locate_batch(batch).await {
            Ok(located) => {
                let mut by_address: HashMap<Ipv4Addr, GeoRecord> =
                    located.into_iter().map(|record| (record.address, record)).collect();
                for address in batch {
                    let record = by_address
                        .remove(address)
                        .unwrap_or_else(|| GeoRecord::failed(*address));
                    records.insert(*address, record);
                }
            }
            Err(e) => {
                self.reporter.report(ReportEvent::BatchFailed {
                    index,
                    size: batch.len(),
                    error: e.to_string(),
                });
                for address in batch {
                    records.insert(*address, GeoRecord::failed(*address));
                }
            }
        }

        self.reporter.report(ReportEvent::Advanced {
            stage: Stage::Geolocation,
            count: batch.len(),
        });
    }

    /// One lookup without batching; failures come back as `success = false`.
    pub async fn locate_single(&self, address: Ipv4Addr) -> GeoRecord {
        match self.provider.locate_one(address).await {
            Ok(record) => record,
            Err(e) => {
                self.reporter.report(ReportEvent::SourceFailed {
                    source: PROVIDER.to_string(),
                    error: format!("Geo lookup failed for {}: {}", address, e),
                });
                GeoRecord::failed(address)
            }
        }
    }
}
