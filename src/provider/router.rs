//! Health-aware provider selection with ordered failover

use super::{Provider, ProviderKind, ProviderResponse, QueryCategory, QueryContext};
use crate::error::{ProviderError, RouterError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Category -> ordered provider ids, fixed at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: BTreeMap<QueryCategory, Vec<String>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
            .with_route(QueryCategory::Analysis, &["claude", "chatgpt", "gemini"])
            .with_route(QueryCategory::Reasoning, &["claude", "chatgpt", "local"])
            .with_route(QueryCategory::Creative, &["chatgpt", "gemini", "claude"])
            .with_route(QueryCategory::Technical, &["claude", "chatgpt", "local"])
            .with_route(QueryCategory::Investigation, &["claude", "chatgpt", "gemini"])
            .with_route(QueryCategory::Generation, &["chatgpt", "gemini", "local"])
    }
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self {
            routes: BTreeMap::new(),
        }
    }

    pub fn with_route(mut self, category: QueryCategory, providers: &[&str]) -> Self {
        self.set(category, providers.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn set(&mut self, category: QueryCategory, providers: Vec<String>) {
        self.routes.insert(category, providers);
    }

    pub fn candidates(&self, category: QueryCategory) -> &[String] {
        self.routes.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Overlay another table's categories onto this one
    pub fn merge(&mut self, other: RoutingTable) {
        self.routes.extend(other.routes);
    }
}

/// Rolling performance counters for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub total_queries: u64,
    pub total_time_secs: f64,
    pub total_cost: f64,
    pub average_confidence: f64,
}

impl ProviderMetrics {
    /// Fold one completed query into the counters (incremental mean for confidence)
    pub fn record(&mut self, response: &ProviderResponse) {
        self.total_queries += 1;
        self.total_time_secs += response.processing_time_secs;
        self.total_cost += response.cost;
        let n = self.total_queries as f64;
        self.average_confidence += (response.confidence - self.average_confidence) / n;
    }

    pub fn average_processing_time(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.total_time_secs / self.total_queries as f64
        }
    }
}

/// Status row reported per provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub kind: ProviderKind,
    pub healthy: bool,
    pub total_queries: u64,
    pub total_cost: f64,
    pub avg_processing_time: f64,
    pub avg_confidence: f64,
}

struct Registered {
    provider: Arc<dyn Provider>,
    metrics: Mutex<ProviderMetrics>,
}

/// Picks providers by category and health, failing over in table order.
///
/// Health is cached: it only changes through [`ProviderRouter::health_check_all`]
/// or [`ProviderRouter::set_health`], never during routing.
pub struct ProviderRouter {
    providers: HashMap<String, Registered>,
    routes: RoutingTable,
    health: RwLock<HashMap<String, bool>>,
}

impl ProviderRouter {
    pub fn new(routes: RoutingTable) -> Self {
        Self {
            providers: HashMap::new(),
            routes,
            health: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider. It is considered unhealthy until the first sweep.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        self.health.write().insert(id.clone(), false);
        self.providers.insert(
            id,
            Registered {
                provider,
                metrics: Mutex::new(ProviderMetrics::default()),
            },
        );
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Registered provider ids, sorted
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn is_healthy(&self, id: &str) -> bool {
        self.health.read().get(id).copied().unwrap_or(false)
    }

    /// Override the cached health of a registered provider
    pub fn set_health(&self, id: &str, healthy: bool) {
        if self.providers.contains_key(id) {
            self.health.write().insert(id.to_string(), healthy);
        }
    }

    fn is_available(&self, id: &str) -> bool {
        self.providers.contains_key(id) && self.is_healthy(id)
    }

    /// Route one query, trying the preferred provider first and then the
    /// category's candidates in order.
    pub async fn route_query(
        &self,
        prompt: &str,
        ctx: &QueryContext,
        system_prompt: Option<&str>,
        fallback: bool,
    ) -> Result<ProviderResponse, RouterError> {
        let mut attempts = 0usize;
        let mut last_error: Option<ProviderError> = None;

        let preferred = ctx
            .preferred_provider
            .as_deref()
            .filter(|id| self.is_available(id));

        if let Some(id) = preferred {
            attempts += 1;
            match self.attempt(id, prompt, ctx, system_prompt).await {
                Ok(response) => return Ok(response),
                Err(e) if !fallback => {
                    return Err(RouterError::Provider {
                        provider: id.to_string(),
                        source: e,
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %id,
                        error = %e,
                        "preferred provider failed, falling back"
                    );
                    last_error = Some(e);
                }
            }
        }

        let candidates: Vec<&str> = self
            .routes
            .candidates(ctx.category)
            .iter()
            .map(String::as_str)
            .filter(|id| self.is_available(id))
            .collect();

        if candidates.is_empty() {
            return Err(RouterError::NoHealthyProvider);
        }

        for id in candidates {
            attempts += 1;
            match self.attempt(id, prompt, ctx, system_prompt).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        provider = %id,
                        category = %ctx.category,
                        error = %e,
                        "provider failed, trying next candidate"
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| ProviderError::Other("no provider attempted".to_string()));
        tracing::error!(attempts, error = %last, "all providers failed");
        Err(RouterError::AllProvidersFailed { attempts, last })
    }

    async fn attempt(
        &self,
        id: &str,
        prompt: &str,
        ctx: &QueryContext,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let registered = self
            .providers
            .get(id)
            .ok_or_else(|| ProviderError::Other(format!("provider {} is not registered", id)))?;
        let response = registered.provider.query(prompt, ctx, system_prompt).await?;
        registered.metrics.lock().record(&response);
        tracing::debug!(
            provider = %id,
            agent = %ctx.agent_name,
            confidence = response.confidence,
            "query routed"
        );
        Ok(response)
    }

    /// Probe every provider concurrently and replace the cached health
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let checks = self.providers.iter().map(|(id, registered)| async move {
            (id.clone(), registered.provider.health_check().await)
        });
        let results: BTreeMap<String, bool> =
            futures::future::join_all(checks).await.into_iter().collect();

        let mut health = self.health.write();
        for (id, healthy) in &results {
            health.insert(id.clone(), *healthy);
        }
        drop(health);

        tracing::info!(
            healthy = results.values().filter(|h| **h).count(),
            total = results.len(),
            "provider health sweep complete"
        );
        results
    }

    /// Run a health sweep immediately and then every `interval` until cancelled
    pub fn spawn_health_monitor(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        router.health_check_all().await;
                    }
                }
            }
        })
    }

    /// Snapshot of one provider's metrics
    pub fn metrics(&self, id: &str) -> Option<ProviderMetrics> {
        self.providers.get(id).map(|r| r.metrics.lock().clone())
    }

    pub fn provider_status(&self) -> BTreeMap<String, ProviderStatus> {
        self.providers
            .iter()
            .map(|(id, registered)| {
                let metrics = registered.metrics.lock().clone();
                let status = ProviderStatus {
                    name: registered.provider.display_name().to_string(),
                    kind: registered.provider.kind(),
                    healthy: self.is_healthy(id),
                    total_queries: metrics.total_queries,
                    total_cost: metrics.total_cost,
                    avg_processing_time: metrics.average_processing_time(),
                    avg_confidence: metrics.average_confidence,
                };
                (id.clone(), status)
            })
            .collect()
    }
}
