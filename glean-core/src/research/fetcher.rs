//! Fault-tolerant concurrent fetch stage.
//!
//! One task is spawned per registered provider, each under its own timeout.
//! Tasks are joined at a barrier that tolerates individual failures: a
//! timeout, an error, or a panicking task yields an empty slot plus a
//! recorded error for that provider only. Each task writes nothing but its
//! own result; aggregation happens after the join.

use super::progress::{ProgressSink, ResearchEvent};
use super::source::{Provenance, Source};
use crate::config::FetchConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Client for one external data provider.
///
/// Implementations should honor the caller-supplied timeout and prefer
/// returning partial or empty results over erroring. The fetcher enforces
/// the timeout regardless.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name used in logs, events, and error maps (e.g. `"pubmed"`).
    fn name(&self) -> &str;

    /// Provenance type of every source this provider returns.
    fn provenance(&self) -> Provenance;

    /// Search for up to `count` sources matching `query`.
    async fn search(
        &self,
        query: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Source>, ProviderError>;
}

/// A provider plus its per-call timeout and share of the round target.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub client: Arc<dyn ProviderClient>,
    pub timeout: Duration,
    pub share: f64,
}

/// Outcome of one provider call within a round.
#[derive(Debug, Clone)]
pub struct ProviderFetch {
    pub provider: String,
    pub provenance: Provenance,
    pub requested: usize,
    pub sources: Vec<Source>,
    pub error: Option<ProviderError>,
    pub duration_ms: u64,
}

/// Joined result of a round's fetch, one slot per registered provider.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub slots: Vec<ProviderFetch>,
}

impl FetchOutcome {
    /// Sources keyed by provider name.
    pub fn results_by_provider(&self) -> BTreeMap<String, Vec<Source>> {
        self.slots
            .iter()
            .map(|s| (s.provider.clone(), s.sources.clone()))
            .collect()
    }

    /// Error messages keyed by provider name, for providers that failed.
    pub fn errors_by_provider(&self) -> BTreeMap<String, String> {
        self.slots
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| (s.provider.clone(), e.to_string())))
            .collect()
    }

    /// Call durations in milliseconds keyed by provider name.
    pub fn timings_by_provider(&self) -> BTreeMap<String, u64> {
        self.slots
            .iter()
            .map(|s| (s.provider.clone(), s.duration_ms))
            .collect()
    }

    /// Count of sources per provenance type.
    pub fn counts_by_provenance(&self) -> BTreeMap<Provenance, usize> {
        let mut counts = BTreeMap::new();
        for slot in &self.slots {
            *counts.entry(slot.provenance).or_insert(0) += slot.sources.len();
        }
        counts
    }

    pub fn total_sources(&self) -> usize {
        self.slots.iter().map(|s| s.sources.len()).sum()
    }

    pub fn error_count(&self) -> usize {
        self.slots.iter().filter(|s| s.error.is_some()).count()
    }

    /// All sources in fetch order: provider registration order, then
    /// provider result order.
    pub fn into_sources(self) -> Vec<Source> {
        self.slots.into_iter().flat_map(|s| s.sources).collect()
    }
}

/// Runs one concurrent, independently timed call per provider.
#[derive(Clone, Default)]
pub struct ParallelFetcher {
    providers: Vec<RegisteredProvider>,
    progress: ProgressSink,
}

impl ParallelFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register clients using the per-provenance timeouts and shares in `config`.
    pub fn from_config(clients: Vec<Arc<dyn ProviderClient>>, config: &FetchConfig) -> Self {
        let mut fetcher = Self::new();
        for client in clients {
            let settings = config.settings(client.provenance());
            let timeout = Duration::from_millis(settings.timeout_ms);
            let share = settings.share;
            fetcher.register(client, timeout, share);
        }
        fetcher
    }

    pub fn register(&mut self, client: Arc<dyn ProviderClient>, timeout: Duration, share: f64) {
        debug!(
            provider = client.name(),
            provenance = %client.provenance(),
            timeout_ms = timeout.as_millis() as u64,
            share,
            "Registered provider"
        );
        self.providers.push(RegisteredProvider {
            client,
            timeout,
            share,
        });
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub(crate) fn set_progress(&mut self, progress: ProgressSink) {
        self.progress = progress;
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn providers(&self) -> &[RegisteredProvider] {
        &self.providers
    }

    /// Split a round target into per-provider counts by share.
    pub fn allocate(&self, target: usize) -> Vec<usize> {
        let shares: Vec<f64> = self.providers.iter().map(|p| p.share).collect();
        allocate_counts(target, &shares)
    }

    /// Fetch a round with counts derived from `target`.
    pub async fn fetch_target(&self, round: u32, query: &str, target: usize) -> FetchOutcome {
        let counts = self.allocate(target);
        self.fetch_round(round, query, &counts).await
    }

    /// Launch every provider with a positive count concurrently and join.
    ///
    /// `counts[i]` applies to the i-th registered provider; missing entries
    /// mean zero. Never fails: provider failures are recorded per slot.
    pub async fn fetch_round(&self, round: u32, query: &str, counts: &[usize]) -> FetchOutcome {
        let started = Instant::now();
        let mut launched = Vec::with_capacity(self.providers.len());
        let mut handles = Vec::with_capacity(self.providers.len());

        for (idx, provider) in self.providers.iter().enumerate() {
            let count = counts.get(idx).copied().unwrap_or(0);
            let name = provider.client.name().to_string();
            if count == 0 {
                debug!(round, provider = %name, "Skipping provider with zero allocation");
                continue;
            }

            self.progress.emit(ResearchEvent::ApiStarted {
                round,
                provider: name.clone(),
                count,
            });

            let client = Arc::clone(&provider.client);
            let timeout = provider.timeout;
            let query = query.to_string();
            let progress = self.progress.clone();
            let task_name = name.clone();

            let handle = tokio::spawn(async move {
                let call_start = Instant::now();
                let result =
                    match tokio::time::timeout(timeout, client.search(&query, count, timeout))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout {
                            provider: task_name.clone(),
                            timeout_ms: timeout.as_millis() as u64,
                        }),
                    };
                let duration_ms = call_start.elapsed().as_millis() as u64;

                let (sources_found, error) = match &result {
                    Ok(sources) => (sources.len().min(count), None),
                    Err(e) => (0, Some(e.to_string())),
                };
                progress.emit(ResearchEvent::ApiCompleted {
                    round,
                    provider: task_name,
                    sources: sources_found,
                    duration_ms,
                    error,
                });

                (result, duration_ms)
            });

            launched.push((name, provider.client.provenance(), count));
            handles.push(handle);
        }

        let joined = futures::future::join_all(handles).await;

        let mut outcome = FetchOutcome::default();
        for ((name, provenance, requested), joined) in launched.into_iter().zip(joined) {
            let (result, duration_ms) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    self.progress.emit(ResearchEvent::ApiCompleted {
                        round,
                        provider: name.clone(),
                        sources: 0,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    (
                        Err(ProviderError::Aborted {
                            provider: name.clone(),
                            message: e.to_string(),
                        }),
                        duration_ms,
                    )
                }
            };

            let slot = match result {
                Ok(mut sources) => {
                    sources.truncate(requested);
                    debug!(
                        round,
                        provider = %name,
                        sources = sources.len(),
                        duration_ms,
                        "Provider completed"
                    );
                    ProviderFetch {
                        provider: name,
                        provenance,
                        requested,
                        sources,
                        error: None,
                        duration_ms,
                    }
                }
                Err(error) => {
                    warn!(
                        round,
                        provider = %name,
                        error = %error,
                        duration_ms,
                        "Provider failed, continuing without its sources"
                    );
                    ProviderFetch {
                        provider: name,
                        provenance,
                        requested,
                        sources: Vec::new(),
                        error: Some(error),
                        duration_ms,
                    }
                }
            };
            outcome.slots.push(slot);
        }

        info!(
            round,
            providers = outcome.slots.len(),
            sources = outcome.total_sources(),
            errors = outcome.error_count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetch round joined"
        );

        outcome
    }
}

/// Apportion `target` across providers proportionally to `shares` using
/// the largest-remainder method. Every provider receives at least one slot,
/// so the sum can exceed `target` when there are more providers than slots.
pub fn allocate_counts(target: usize, shares: &[f64]) -> Vec<usize> {
    if shares.is_empty() {
        return Vec::new();
    }

    let positive: Vec<f64> = shares.iter().map(|s| s.max(0.0)).collect();
    let total: f64 = positive.iter().sum();
    let weights: Vec<f64> = if total > 0.0 {
        positive.iter().map(|s| s / total).collect()
    } else {
        vec![1.0 / shares.len() as f64; shares.len()]
    };

    let raw: Vec<f64> = weights.iter().map(|w| w * target as f64).collect();
    let mut counts: Vec<usize> = raw.iter().map(|r| r.floor() as usize).collect();
    let assigned: usize = counts.iter().sum();
    let mut remainder = target.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = raw[a] - raw[a].floor();
        let fb = raw[b] - raw[b].floor();
        fb.partial_cmp(&fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    for idx in order {
        if remainder == 0 {
            break;
        }
        counts[idx] += 1;
        remainder -= 1;
    }

    for count in &mut counts {
        if *count == 0 {
            *count = 1;
        }
    }
    counts
}
