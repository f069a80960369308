// src/enumerator.rs
use crate::cancel::CancelSignal;
use crate::progress::{ReportEvent, Reporter, Stage};
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::sources::{create_source, Source};
use crate::types::{CandidateName, EnumerationConfig, ReconMapError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Result-count thresholds below which the fallback providers are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackThresholds {
    pub secondary: usize,
    pub tertiary: usize,
}

impl Default for FallbackThresholds {
    fn default() -> Self {
        Self {
            secondary: 10,
            tertiary: 5,
        }
    }
}

/// Queries the primary provider with retries, then the secondary and
/// tertiary once each while the result set is still thin.
pub struct SourceEnumerator {
    session: Session,
    primary: Box<dyn Source>,
    secondary: Option<Box<dyn Source>>,
    tertiary: Option<Box<dyn Source>>,
    policy: RetryPolicy,
    thresholds: FallbackThresholds,
    reporter: Arc<dyn Reporter>,
}

impl SourceEnumerator {
    pub fn new(session: Session, primary: Box<dyn Source>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            session,
            primary,
            secondary: None,
            tertiary: None,
            policy: RetryPolicy::default(),
            thresholds: FallbackThresholds::default(),
            reporter,
        }
    }

    /// Builds the provider chain named in `config.sources`.
    pub fn from_config(
        config: &EnumerationConfig,
        session: Session,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, ReconMapError> {
        let mut chain = Vec::new();
        for name in &config.sources {
            let source = create_source(name)
                .ok_or_else(|| ReconMapError::ConfigError(format!("Unknown source: {}", name)))?;
            chain.push(source);
        }

        let mut chain = chain.into_iter();
        let primary = chain
            .next()
            .ok_or_else(|| ReconMapError::ConfigError("No valid sources configured".to_string()))?;

        let mut enumerator = Self::new(session, primary, reporter)
            .with_policy(RetryPolicy::new(config.max_attempts, config.retry_base_delay))
            .with_thresholds(FallbackThresholds {
                secondary: config.secondary_threshold,
                tertiary: config.tertiary_threshold,
            });
        enumerator.secondary = chain.next();
        enumerator.tertiary = chain.next();

        Ok(enumerator)
    }

    pub fn with_secondary(mut self, source: Box<dyn Source>) -> Self {
        self.secondary = Some(source);
        self
    }

    pub fn with_tertiary(mut self, source: Box<dyn Source>) -> Self {
        self.tertiary = Some(source);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_thresholds(mut self, thresholds: FallbackThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Never fails: provider errors are reported and absorbed, and an empty
    /// set is a valid answer.
    ///
    /// A fired `cancel` abandons the provider call or backoff in progress and
    /// skips the remaining fallbacks; whatever was accepted so far is returned.
    pub async fn enumerate(&self, domain: &str, cancel: &CancelSignal) -> HashSet<CandidateName> {
        self.reporter.report(ReportEvent::StageStarted {
            stage: Stage::Enumeration,
            total: 1,
        });
        let start = Instant::now();

        let mut names = HashSet::new();
        self.query_primary(domain, cancel, &mut names).await;

        if names.len() < self.thresholds.secondary && !cancel.is_cancelled() {
            if let Some(source) = &self.secondary {
                self.query_once(source.as_ref(), domain, cancel, &mut names).await;
            }
        }

        if names.len() < self.thresholds.tertiary && !cancel.is_cancelled() {
            if let Some(source) = &self.tertiary {
                self.query_once(source.as_ref(), domain, cancel, &mut names).await;
            }
        }

        if cancel.is_cancelled() {
            self.reporter.report(ReportEvent::Cancelled {
                stage: Stage::Enumeration,
            });
            return names;
        }

        self.reporter.report(ReportEvent::StageFinished {
            stage: Stage::Enumeration,
            summary: format!("{} unique subdomains in {:.2?}", names.len(), start.elapsed()),
        });

        names
    }

    async fn query_primary(&self, domain: &str, cancel: &CancelSignal, names: &mut HashSet<CandidateName>) {
        let source = self.primary.as_ref();
        let attempts = self.policy.run(
            |_| source.enumerate(domain, &self.session),
            |attempt, _, delay| {
                self.reporter.report(ReportEvent::Retrying {
                    source: source.name().to_string(),
                    attempt,
                    max_attempts: self.policy.max_attempts,
                    delay,
                })
            },
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = attempts => result,
        };

        self.absorb(source, domain, result, names);
    }

    async fn query_once(
        &self,
        source: &dyn Source,
        domain: &str,
        cancel: &CancelSignal,
        names: &mut HashSet<CandidateName>,
    ) {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = source.enumerate(domain, &self.session) => result,
        };
        self.absorb(source, domain, result, names);
    }

    fn absorb(
        &self,
        source: &dyn Source,
        domain: &str,
        result: Result<Vec<String>, ReconMapError>,
        names: &mut HashSet<CandidateName>,
    ) {
        match result {
            Ok(raw) => {
                let accepted: HashSet<CandidateName> = raw
                    .iter()
                    .filter_map(|name| CandidateName::parse(name, domain))
                    .collect();
                self.reporter.report(ReportEvent::SourceQueried {
                    source: source.name().to_string(),
                    found: accepted.len(),
                });
                names.extend(accepted);
            }
            Err(e) => self.reporter.report(ReportEvent::SourceFailed {
                source: source.name().to_string(),
                error: e.to_string(),
            }),
        }
    }
}
