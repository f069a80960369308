// src/engine.rs
use crate::cancel::CancelSignal;
use crate::classify::aggregate;
use crate::enumerator::SourceEnumerator;
use crate::geo::{BatchGeolocator, GeoOutcome};
use crate::progress::{ReportEvent, Reporter, Stage};
use crate::resolver::ConcurrentResolver;
use crate::session::Session;
use crate::types::{CandidateName, Config, EmptyReason, ReconMapError, ReconOutcome, ReconReport, ReconStats};
use crate::utils;
use log::info;
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

/// Runs enumerate -> resolve -> geolocate -> classify for one target.
pub struct ReconEngine {
    enumerator: SourceEnumerator,
    resolver: ConcurrentResolver,
    geolocator: BatchGeolocator,
    reporter: Arc<dyn Reporter>,
    include_apex: bool,
}

impl ReconEngine {
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Result<Self, ReconMapError> {
        let session = Session::new(config)?;
        let geo_session = Session::with_timeout(config, config.geolocation.timeout)?;

        let enumerator = SourceEnumerator::from_config(&config.enumeration, session, reporter.clone())?;
        let resolver = ConcurrentResolver::from_config(&config.resolver, reporter.clone())?;
        let geolocator = BatchGeolocator::from_config(&config.geolocation, geo_session, reporter.clone());

        Ok(Self::from_parts(enumerator, resolver, geolocator, reporter)
            .with_apex(config.enumeration.include_apex))
    }

    pub fn from_parts(
        enumerator: SourceEnumerator,
        resolver: ConcurrentResolver,
        geolocator: BatchGeolocator,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            enumerator,
            resolver,
            geolocator,
            reporter,
            include_apex: true,
        }
    }

    pub fn with_apex(mut self, include_apex: bool) -> Self {
        self.include_apex = include_apex;
        self
    }

    pub async fn run(&self, target: &str, cancel: &CancelSignal) -> Result<ReconOutcome, ReconMapError> {
        let domain = target.trim().trim_end_matches('.').to_lowercase();
        if !utils::is_valid_domain(&domain) {
            return Err(ReconMapError::InvalidDomain(target.to_string()));
        }

        info!("Target acquired: {}", domain);
        let start_time = Instant::now();

        let subdomains = self.enumerator.enumerate(&domain, cancel).await;
        if cancel.is_cancelled() {
            return Ok(ReconOutcome::Cancelled);
        }
        if subdomains.is_empty() {
            return Ok(ReconOutcome::Empty(EmptyReason::NoCandidates));
        }

        let mut names: BTreeSet<CandidateName> = subdomains.into_iter().collect();
        if self.include_apex {
            names.insert(CandidateName::apex(&domain));
        }
        let candidates = names.len();

        let resolution = self.resolver.resolve(names, cancel).await;
        let alive: HashMap<CandidateName, _> = resolution
            .records
            .iter()
            .filter(|(_, record)| record.alive && record.address.is_some())
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();

        if alive.is_empty() && resolution.complete {
            return Ok(ReconOutcome::Empty(EmptyReason::NoLiveHosts));
        }

        let unique_addresses: BTreeSet<Ipv4Addr> = alive.values().filter_map(|record| record.address).collect();

        let geo = if resolution.complete {
            self.geolocator.locate(unique_addresses.iter().copied(), cancel).await
        } else {
            // cancelled mid-resolution: keep what resolved, skip geolocation
            GeoOutcome {
                records: HashMap::new(),
                complete: false,
            }
        };

        self.reporter.report(ReportEvent::StageStarted {
            stage: Stage::Aggregation,
            total: alive.len(),
        });
        let records = aggregate(&alive, &geo.records);
        self.reporter.report(ReportEvent::StageFinished {
            stage: Stage::Aggregation,
            summary: format!("{} live hosts on {} addresses", records.len(), unique_addresses.len()),
        });

        let stats = ReconStats {
            candidates,
            looked_up: resolution.records.len(),
            alive: alive.len(),
            unique_addresses: unique_addresses.len(),
            geolocated: geo.records.values().filter(|r| r.success).count(),
            duration: start_time.elapsed(),
        };

        Ok(ReconOutcome::Report(ReconReport {
            domain,
            records,
            stats,
            timestamp: chrono::Utc::now().to_rfc3339(),
            partial: !(resolution.complete && geo.complete),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::enumerator::testing::{Behavior, FakeSource};
    use crate::geo::testing::FakeGeo;
    use crate::progress::testing::RecordingReporter;
    use crate::progress::NullReporter;
    use crate::resolver::testing::{Answer, FakeDns};
    use crate::retry::RetryPolicy;
    use crate::types::{ResolutionErrorKind, RiskTier};
    use std::time::Duration;

    fn engine(source: FakeSource, dns: FakeDns, geo: Arc<FakeGeo>, reporter: Arc<dyn Reporter>) -> ReconEngine {
        let session = Session::new(&Config::default()).unwrap();
        let enumerator = SourceEnumerator::new(session, Box::new(source), reporter.clone())
            .with_policy(RetryPolicy::new(3, Duration::ZERO));
        let resolver = ConcurrentResolver::new(Arc::new(dns), 10, Duration::from_secs(1), reporter.clone());
        let geolocator = BatchGeolocator::new(geo, 100, Duration::ZERO, reporter.clone());
        ReconEngine::from_parts(enumerator, resolver, geolocator, reporter)
    }

    #[tokio::test]
    async fn test_end_to_end_single_live_host() {
        let source = FakeSource::new(
            "crtsh",
            Behavior::Names(vec!["api.example.com", "*.example.com", "old.example.com"]),
        );
        let dns = FakeDns::with(&[
            ("api.example.com", Answer::Address(Ipv4Addr::new(203, 0, 113, 5))),
            ("old.example.com", Answer::Fail(ResolutionErrorKind::NotFound)),
        ]);
        let geo = Arc::new(FakeGeo::default());

        let outcome = engine(source, dns, geo.clone(), Arc::new(NullReporter))
            .with_apex(false)
            .run("example.com", &CancelSignal::never())
            .await
            .unwrap();

        let ReconOutcome::Report(report) = outcome else {
            panic!("expected a report");
        };
        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.name.as_str(), "api.example.com");
        assert_eq!(record.address, Ipv4Addr::new(203, 0, 113, 5));
        assert!(record.geo_success);
        assert_eq!(record.risk_tier, RiskTier::Safe);

        assert_eq!(report.stats.candidates, 2);
        assert_eq!(report.stats.looked_up, 2);
        assert_eq!(report.stats.alive, 1);
        assert!(!report.partial);
        assert_eq!(geo.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apex_is_resolved_when_enabled() {
        let source = FakeSource::new("crtsh", Behavior::Names(vec!["api.example.com"]));
        let dns = FakeDns::with(&[
            ("api.example.com", Answer::Address(Ipv4Addr::new(203, 0, 113, 5))),
            ("example.com", Answer::Address(Ipv4Addr::new(203, 0, 113, 5))),
        ]);

        let outcome = engine(source, dns, Arc::new(FakeGeo::default()), Arc::new(NullReporter))
            .run("Example.com", &CancelSignal::never())
            .await
            .unwrap();

        let ReconOutcome::Report(report) = outcome else {
            panic!("expected a report");
        };
        assert_eq!(report.domain, "example.com");
        assert_eq!(report.records.len(), 2);
        // two names, one shared address
        assert_eq!(report.stats.unique_addresses, 1);
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_outcome() {
        let source = FakeSource::new("crtsh", Behavior::Hard);
        let geo = Arc::new(FakeGeo::default());

        let outcome = engine(source, FakeDns::default(), geo.clone(), Arc::new(NullReporter))
            .run("example.com", &CancelSignal::never())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconOutcome::Empty(EmptyReason::NoCandidates)));
        assert!(geo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_live_hosts_skips_geolocation() {
        let source = FakeSource::new("crtsh", Behavior::Names(vec!["old.example.com", "gone.example.com"]));
        let geo = Arc::new(FakeGeo::default());

        let outcome = engine(source, FakeDns::default(), geo.clone(), Arc::new(NullReporter))
            .run("example.com", &CancelSignal::never())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconOutcome::Empty(EmptyReason::NoLiveHosts)));
        assert!(geo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_target_is_error() {
        let source = FakeSource::new("crtsh", Behavior::Names(vec![]));
        let result = engine(source, FakeDns::default(), Arc::new(FakeGeo::default()), Arc::new(NullReporter))
            .run("not a domain", &CancelSignal::never())
            .await;
        assert!(matches!(result, Err(ReconMapError::InvalidDomain(_))));
    }

    #[tokio::test]
    async fn test_cancel_during_enumeration_returns_promptly() {
        let source = FakeSource::new("crtsh", Behavior::Hang);
        let geo = Arc::new(FakeGeo::default());
        let dns = Arc::new(FakeDns::default());

        let handle = CancelHandle::new();
        handle.cancel();
        let signal = handle.signal();

        let session = Session::new(&Config::default()).unwrap();
        let reporter: Arc<dyn Reporter> = Arc::new(NullReporter);
        let enumerator = SourceEnumerator::new(session, Box::new(source), reporter.clone());
        let resolver = ConcurrentResolver::new(dns.clone(), 10, Duration::from_secs(1), reporter.clone());
        let geolocator = BatchGeolocator::new(geo.clone(), 100, Duration::ZERO, reporter.clone());
        let engine = ReconEngine::from_parts(enumerator, resolver, geolocator, reporter);

        let outcome = tokio::time::timeout(Duration::from_secs(2), engine.run("example.com", &signal))
            .await
            .expect("an already-fired cancel should stop enumeration")
            .unwrap();

        assert!(matches!(outcome, ReconOutcome::Cancelled));
        assert_eq!(dns.peak.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(geo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_partial() {
        let source = FakeSource::new("crtsh", Behavior::Names(vec!["api.example.com", "slow.example.com"]));
        let dns = FakeDns::with(&[
            ("api.example.com", Answer::Address(Ipv4Addr::new(203, 0, 113, 5))),
            ("slow.example.com", Answer::Hang),
        ]);
        let geo = Arc::new(FakeGeo::default());
        let reporter = Arc::new(RecordingReporter::default());

        let handle = CancelHandle::new();
        let signal = handle.signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let engine = engine(source, dns, geo.clone(), reporter.clone()).with_apex(false);
        let outcome = tokio::time::timeout(Duration::from_secs(5), engine.run("example.com", &signal))
            .await
            .expect("cancelled run should return promptly")
            .unwrap();

        let ReconOutcome::Report(report) = outcome else {
            panic!("expected a partial report");
        };
        assert!(report.partial);
        assert_eq!(report.records.len(), 1);
        assert!(!report.records[0].geo_success);
        assert!(geo.calls.lock().unwrap().is_empty());
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, ReportEvent::Cancelled { stage: Stage::Resolution })));
    }
}
