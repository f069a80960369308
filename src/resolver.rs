// src/resolver.rs
use crate::cancel::CancelSignal;
use crate::progress::{ReportEvent, Reporter, Stage};
use crate::types::{CandidateName, ReconMapError, ResolutionErrorKind, ResolutionRecord, ResolverConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use trust_dns_resolver::config::{LookupIpStrategy, NameServerConfig, Protocol, ResolverConfig as DnsResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::TokioAsyncResolver;

/// Why a single address lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFailure {
    pub kind: ResolutionErrorKind,
    pub message: String,
}

impl LookupFailure {
    pub fn new(kind: ResolutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The DNS boundary. Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn lookup_ipv4(&self, name: &str) -> Result<Ipv4Addr, LookupFailure>;

    /// Best-effort CNAME lookup; `None` on any failure.
    async fn lookup_alias(&self, name: &str) -> Option<String>;
}

/// `DnsLookup` backed by a trust-dns resolver over UDP.
pub struct TrustDnsLookup {
    resolver: TokioAsyncResolver,
}

impl TrustDnsLookup {
    pub fn new(config: &ResolverConfig) -> Result<Self, ReconMapError> {
        let resolver = if config.use_system_resolver {
            TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| ReconMapError::ResolutionError(format!("Failed to create system resolver: {}", e)))?
        } else {
            let mut resolver_config = DnsResolverConfig::new();

            for ns in &config.nameservers {
                let socket_addr = SocketAddr::from_str(ns)
                    .map_err(|e| ReconMapError::ConfigError(format!("Invalid nameserver address {}: {}", ns, e)))?;
                resolver_config.add_name_server(NameServerConfig {
                    socket_addr,
                    protocol: Protocol::Udp,
                    tls_dns_name: None,
                    trust_negative_responses: true,
                    bind_addr: None,
                });
            }

            let mut opts = ResolverOpts::default();
            opts.timeout = config.timeout;
            // single attempt per name, no retries at this layer
            opts.attempts = 1;
            opts.ip_strategy = LookupIpStrategy::Ipv4Only;

            TokioAsyncResolver::tokio(resolver_config, opts)
        };

        Ok(Self { resolver })
    }

    fn fqdn(name: &str) -> String {
        if name.ends_with('.') {
            name.to_string()
        } else {
            format!("{}.", name)
        }
    }
}

fn classify_resolve_error(error: &ResolveError) -> ResolutionErrorKind {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } if *response_code == ResponseCode::NXDomain => {
            ResolutionErrorKind::NotFound
        }
        ResolveErrorKind::NoRecordsFound { .. } => ResolutionErrorKind::NoAnswer,
        ResolveErrorKind::Timeout => ResolutionErrorKind::Timeout,
        _ => ResolutionErrorKind::Other,
    }
}

#[async_trait]
impl DnsLookup for TrustDnsLookup {
    async fn lookup_ipv4(&self, name: &str) -> Result<Ipv4Addr, LookupFailure> {
        let lookup = self
            .resolver
            .lookup_ip(Self::fqdn(name))
            .await
            .map_err(|e| LookupFailure::new(classify_resolve_error(&e), e.to_string()))?;

        lookup
            .iter()
            .find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| LookupFailure::new(ResolutionErrorKind::NoAnswer, "no A record in answer"))
    }

    async fn lookup_alias(&self, name: &str) -> Option<String> {
        let lookup = self.resolver.lookup(Self::fqdn(name), RecordType::CNAME).await.ok()?;

        lookup
            .record_iter()
            .filter(|record| record.record_type() == RecordType::CNAME)
            .find_map(|record| record.data().map(|data| data.to_string()))
            .map(|target| target.trim_end_matches('.').to_string())
    }
}

/// Per-name resolution results. `complete` is false when cancellation cut
/// the run short; the names that never finished are listed in `pending`.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub records: HashMap<CandidateName, ResolutionRecord>,
    pub pending: Vec<CandidateName>,
    pub complete: bool,
}

/// Resolves names on a bounded pool of tokio tasks, one task per name.
pub struct ConcurrentResolver {
    lookup: Arc<dyn DnsLookup>,
    concurrency: usize,
    timeout: Duration,
    reporter: Arc<dyn Reporter>,
}

impl ConcurrentResolver {
    pub fn new(lookup: Arc<dyn DnsLookup>, concurrency: usize, timeout: Duration, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            lookup,
            concurrency: concurrency.max(1),
            timeout,
            reporter,
        }
    }

    pub fn from_config(config: &ResolverConfig, reporter: Arc<dyn Reporter>) -> Result<Self, ReconMapError> {
        let lookup = TrustDnsLookup::new(config)?;
        Ok(Self::new(Arc::new(lookup), config.concurrency, config.timeout, reporter))
    }

    pub async fn resolve<I>(&self, names: I, cancel: &CancelSignal) -> ResolutionOutcome
    where
        I: IntoIterator<Item = CandidateName>,
    {
        let names: Vec<CandidateName> = names.into_iter().collect();
        self.reporter.report(ReportEvent::StageStarted {
            stage: Stage::Resolution,
            total: names.len(),
        });

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let records: Arc<DashMap<CandidateName, ResolutionRecord>> = Arc::new(DashMap::with_capacity(names.len()));
        let mut tasks = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(names.len());
        let mut dispatched = 0;
        let mut cancelled = false;

        for name in &names {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let lookup = self.lookup.clone();
            let records = records.clone();
            let reporter = self.reporter.clone();
            let timeout = self.timeout;
            let task_name = name.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let record = resolve_one(lookup.as_ref(), task_name.clone(), timeout).await;
                records.insert(task_name, record);
                reporter.report(ReportEvent::Advanced {
                    stage: Stage::Resolution,
                    count: 1,
                });
            });
            abort_handles.push(handle.abort_handle());

            let joined_name = name.clone();
            tasks.push(async move { (joined_name, handle.await) });
            dispatched += 1;
        }

        if cancelled {
            abort_handles.iter().for_each(|handle| handle.abort());
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    abort_handles.iter().for_each(|handle| handle.abort());
                    continue;
                }
                next = tasks.next() => next,
            };

            let Some((name, joined)) = next else { break };
            if let Err(join_error) = joined {
                if join_error.is_panic() && !records.contains_key(&name) {
                    records.insert(
                        name.clone(),
                        ResolutionRecord::failed(
                            name,
                            ResolutionErrorKind::Other,
                            format!("resolution worker panicked: {}", join_error),
                        ),
                    );
                    self.reporter.report(ReportEvent::Advanced {
                        stage: Stage::Resolution,
                        count: 1,
                    });
                }
            }
        }

        let records: HashMap<CandidateName, ResolutionRecord> = Arc::try_unwrap(records)
            .map(|map| map.into_iter().collect())
            .unwrap_or_else(|shared| shared.iter().map(|e| (e.key().clone(), e.value().clone())).collect());

        let pending: Vec<CandidateName> = names.into_iter().filter(|name| !records.contains_key(name)).collect();
        let complete = pending.is_empty();

        if complete {
            let alive = records.values().filter(|r| r.alive).count();
            self.reporter.report(ReportEvent::StageFinished {
                stage: Stage::Resolution,
                summary: format!("{} alive, {} dead", alive, records.len() - alive),
            });
        } else {
            debug!(
                "Resolution stopped after dispatching {} lookups, {} names unresolved",
                dispatched,
                pending.len()
            );
            self.reporter.report(ReportEvent::Cancelled {
                stage: Stage::Resolution,
            });
        }

        ResolutionOutcome {
            records,
            pending,
            complete,
        }
    }
}

async fn resolve_one(lookup: &dyn DnsLookup, name: CandidateName, timeout: Duration) -> ResolutionRecord {
    let address = match tokio::time::timeout(timeout, lookup.lookup_ipv4(name.as_str())).await {
        Ok(Ok(address)) => address,
        Ok(Err(failure)) => return ResolutionRecord::failed(name, failure.kind, failure.message),
        Err(_) => {
            return ResolutionRecord::failed(
                name,
                ResolutionErrorKind::Timeout,
                format!("lookup exceeded {:?}", timeout),
            )
        }
    };

    let alias = tokio::time::timeout(timeout, lookup.lookup_alias(name.as_str()))
        .await
        .ok()
        .flatten();

    ResolutionRecord::alive(name, address, alias)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    pub enum Answer {
        Address(Ipv4Addr),
        Fail(ResolutionErrorKind),
        Hang,
        Panic,
    }

    /// Table-driven DNS. Unknown names get NXDOMAIN.
    #[derive(Default)]
    pub struct FakeDns {
        pub answers: HashMap<String, Answer>,
        pub aliases: HashMap<String, String>,
        pub in_flight: AtomicUsize,
        pub peak: AtomicUsize,
        pub delay: Duration,
    }

    impl FakeDns {
        pub fn with(answers: &[(&str, Answer)]) -> Self {
            Self {
                answers: answers.iter().map(|(n, a)| (n.to_string(), a.clone())).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DnsLookup for FakeDns {
        async fn lookup_ipv4(&self, name: &str) -> Result<Ipv4Addr, LookupFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.answers.get(name) {
                Some(Answer::Address(ip)) => Ok(*ip),
                Some(Answer::Fail(kind)) => Err(LookupFailure::new(*kind, format!("{} for {}", kind, name))),
                Some(Answer::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(LookupFailure::new(ResolutionErrorKind::Timeout, "hung"))
                }
                Some(Answer::Panic) => panic!("resolver blew up on {}", name),
                None => Err(LookupFailure::new(ResolutionErrorKind::NotFound, "NXDOMAIN")),
            }
        }

        async fn lookup_alias(&self, name: &str) -> Option<String> {
            self.aliases.get(name).cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Answer, FakeDns};
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::progress::NullReporter;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn name(n: &str) -> CandidateName {
        CandidateName::parse(n, "example.com").unwrap()
    }

    fn resolver(dns: FakeDns, concurrency: usize, timeout: Duration) -> ConcurrentResolver {
        ConcurrentResolver::new(Arc::new(dns), concurrency, timeout, Arc::new(NullReporter))
    }

    #[tokio::test]
    async fn test_error_kinds_recorded_per_name() {
        let mut dns = FakeDns::with(&[
            ("api.example.com", Answer::Address(Ipv4Addr::new(203, 0, 113, 5))),
            ("empty.example.com", Answer::Fail(ResolutionErrorKind::NoAnswer)),
            ("broken.example.com", Answer::Fail(ResolutionErrorKind::Other)),
        ]);
        dns.aliases.insert("api.example.com".to_string(), "edge.cdn.net".to_string());

        let names = vec![
            name("api.example.com"),
            name("old.example.com"),
            name("empty.example.com"),
            name("broken.example.com"),
        ];
        let outcome = resolver(dns, 4, Duration::from_secs(1))
            .resolve(names, &CancelSignal::never())
            .await;

        assert!(outcome.complete);
        let api = &outcome.records[&name("api.example.com")];
        assert!(api.alive);
        assert_eq!(api.address, Some(Ipv4Addr::new(203, 0, 113, 5)));
        assert_eq!(api.alias.as_deref(), Some("edge.cdn.net"));
        assert_eq!(api.error_kind, None);

        let old = &outcome.records[&name("old.example.com")];
        assert!(!old.alive);
        assert_eq!(old.error_kind, Some(ResolutionErrorKind::NotFound));
        assert_eq!(
            outcome.records[&name("empty.example.com")].error_kind,
            Some(ResolutionErrorKind::NoAnswer)
        );
        let broken = &outcome.records[&name("broken.example.com")];
        assert_eq!(broken.error_kind, Some(ResolutionErrorKind::Other));
        assert!(broken.error_message.is_some());
    }

    #[tokio::test]
    async fn test_key_set_is_total_when_everything_fails() {
        let names: Vec<CandidateName> = (0..40).map(|i| name(&format!("h{}.example.com", i))).collect();

        for concurrency in [1, 3, 50] {
            let outcome = resolver(FakeDns::default(), concurrency, Duration::from_secs(1))
                .resolve(names.clone(), &CancelSignal::never())
                .await;

            let keys: HashSet<_> = outcome.records.keys().cloned().collect();
            let expected: HashSet<_> = names.iter().cloned().collect();
            assert_eq!(keys, expected);
            assert!(outcome.records.values().all(|r| !r.alive));
            assert!(outcome.complete);
            assert!(outcome.pending.is_empty());
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut dns = FakeDns::default();
        dns.delay = Duration::from_millis(10);
        let dns = Arc::new(dns);

        let names: Vec<CandidateName> = (0..20).map(|i| name(&format!("h{}.example.com", i))).collect();
        let resolver = ConcurrentResolver::new(dns.clone(), 3, Duration::from_secs(1), Arc::new(NullReporter));
        let outcome = resolver.resolve(names, &CancelSignal::never()).await;

        assert_eq!(outcome.records.len(), 20);
        assert!(dns.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_slow_lookup_becomes_timeout() {
        let dns = FakeDns::with(&[("slow.example.com", Answer::Hang)]);
        let outcome = resolver(dns, 2, Duration::from_millis(20))
            .resolve(vec![name("slow.example.com")], &CancelSignal::never())
            .await;

        let slow = &outcome.records[&name("slow.example.com")];
        assert!(!slow.alive);
        assert_eq!(slow.error_kind, Some(ResolutionErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_worker_panic_is_contained() {
        let dns = FakeDns::with(&[
            ("boom.example.com", Answer::Panic),
            ("api.example.com", Answer::Address(Ipv4Addr::new(203, 0, 113, 5))),
        ]);
        let outcome = resolver(dns, 2, Duration::from_secs(1))
            .resolve(vec![name("boom.example.com"), name("api.example.com")], &CancelSignal::never())
            .await;

        assert!(outcome.complete);
        assert_eq!(
            outcome.records[&name("boom.example.com")].error_kind,
            Some(ResolutionErrorKind::Other)
        );
        assert!(outcome.records[&name("api.example.com")].alive);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_outcome() {
        let mut answers = vec![("fast.example.com", Answer::Address(Ipv4Addr::new(198, 51, 100, 1)))];
        let hung: Vec<String> = (0..10).map(|i| format!("hang{}.example.com", i)).collect();
        for h in &hung {
            answers.push((h.as_str(), Answer::Hang));
        }
        let dns = FakeDns::with(&answers);

        let mut names = vec![name("fast.example.com")];
        names.extend(hung.iter().map(|h| name(h)));

        let handle = CancelHandle::new();
        let signal = handle.signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            resolver(dns, 2, Duration::from_secs(3600)).resolve(names.clone(), &signal),
        )
        .await
        .expect("cancelled resolution should return promptly");

        assert!(!outcome.complete);
        assert!(outcome.records[&name("fast.example.com")].alive);
        assert_eq!(outcome.records.len() + outcome.pending.len(), names.len());
        assert!(outcome.pending.iter().all(|p| p.as_str().starts_with("hang")));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = resolver(FakeDns::default(), 5, Duration::from_secs(1))
            .resolve(Vec::new(), &CancelSignal::never())
            .await;
        assert!(outcome.records.is_empty());
        assert!(outcome.complete);
    }

    #[test]
    fn test_trust_dns_rejects_bad_nameserver() {
        let config = ResolverConfig {
            nameservers: vec!["not-an-address".to_string()],
            ..ResolverConfig::default()
        };
        assert!(matches!(TrustDnsLookup::new(&config), Err(ReconMapError::ConfigError(_))));
    }
}
