//! Council directory and assembly
//!
//! [`CouncilDirectory`] is the explicit, shared codename -> agent map every agent
//! uses to address its peers. [`Council`] wires a directory together with the
//! provider router and shared store from a [`CouncilConfig`].

use crate::agent::{Agent, SpecialistDeps, SpecialistRegistry};
use crate::auth::AuthConfig;
use crate::config::{CouncilConfig, RuntimeConfig};
use crate::error::{CouncilError, ProviderError, Result};
use crate::message::Message;
use crate::provider::{build_provider, ProviderConfig, ProviderRouter, RoutingTable};
use crate::store::SharedStore;
use crate::task::Task;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Codename -> live agent. Agents hold only weak references back to it.
pub struct CouncilDirectory {
    agents: HashMap<String, Arc<Agent>>,
}

impl CouncilDirectory {
    /// Build the directory and register every agent with it
    pub fn assemble(agents: impl IntoIterator<Item = Arc<Agent>>) -> Arc<Self> {
        let agents: HashMap<String, Arc<Agent>> = agents
            .into_iter()
            .map(|agent| (agent.codename().to_string(), agent))
            .collect();
        let directory = Arc::new(Self { agents });
        for agent in directory.agents.values() {
            agent.register_with_council(Arc::downgrade(&directory));
        }
        directory
    }

    pub fn get(&self, codename: &str) -> Option<&Arc<Agent>> {
        self.agents.get(codename)
    }

    /// Codenames, sorted
    pub fn codenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Route a message to its recipient's mailbox.
    ///
    /// An unknown recipient is not an error: the message is logged and dropped.
    pub fn deliver(&self, message: Message) -> bool {
        let Some(agent) = self.agents.get(&message.recipient) else {
            warn!(
                sender = %message.sender,
                recipient = %message.recipient,
                message_type = %message.message_type,
                "recipient not in council, message dropped"
            );
            return false;
        };
        if agent.post(message) {
            true
        } else {
            warn!(recipient = %agent.codename(), "mailbox closed, message dropped");
            false
        }
    }

    /// Agents whose capabilities include `task_type`, by codename
    pub fn capable_of(&self, task_type: &str) -> Vec<&Arc<Agent>> {
        let mut capable: Vec<&Arc<Agent>> = self
            .agents
            .values()
            .filter(|agent| agent.capabilities().supports(task_type))
            .collect();
        capable.sort_by(|a, b| a.codename().cmp(b.codename()));
        capable
    }

    /// Hand a task to the first capable agent that accepts it
    pub fn dispatch(&self, task: Task) -> Option<String> {
        for agent in self.capable_of(&task.task_type) {
            if agent.assign_task(task.clone()) {
                return Some(agent.codename().to_string());
            }
        }
        warn!(task_type = %task.task_type, task_id = %task.id, "no agent accepted task");
        None
    }

    pub fn start_all(&self) {
        for agent in self.agents.values() {
            agent.start();
        }
    }

    pub async fn shutdown_all(&self) {
        futures::future::join_all(self.agents.values().map(|agent| agent.shutdown())).await;
    }

    /// Status report per agent, keyed by codename
    pub fn status_report(&self) -> Value {
        let reports: Map<String, Value> = self
            .agents
            .iter()
            .map(|(codename, agent)| (codename.clone(), agent.status_report()))
            .collect();
        Value::Object(reports)
    }
}

/// Build the provider router from configuration.
///
/// Providers whose credentials are missing are skipped with an info log.
pub fn build_router(
    providers: &[ProviderConfig],
    routes: RoutingTable,
    auth: &AuthConfig,
    timeout: Duration,
) -> std::result::Result<ProviderRouter, ProviderError> {
    let mut router = ProviderRouter::new(routes);
    for config in providers {
        match build_provider(config.clone(), auth, timeout) {
            Ok(provider) => {
                info!(provider = %config.id, kind = config.kind.as_str(), "provider registered");
                router.register(provider);
            }
            Err(ProviderError::MissingCredentials(source)) => {
                info!(
                    provider = %config.id,
                    missing = %source,
                    "provider skipped, no credentials"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(router)
}

/// A fully wired council: router, store and agents
pub struct Council {
    router: Arc<ProviderRouter>,
    store: Arc<dyn SharedStore>,
    directory: Arc<CouncilDirectory>,
    runtime: RuntimeConfig,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Council {
    /// Assemble from configuration. Agents are created but not started.
    pub fn from_config(config: &CouncilConfig, auth: &AuthConfig) -> Result<Self> {
        let router = build_router(
            &config.providers,
            config.routing_table(),
            auth,
            config.runtime.request_timeout(),
        )
        .map_err(|e| CouncilError::Config(e.to_string()))?;
        let store = config.store.open()?;
        Self::assemble(
            Arc::new(router),
            store,
            &SpecialistRegistry::new(),
            &config.agents,
            config.runtime.clone(),
        )
    }

    /// Assemble from parts. An empty `codenames` list means the whole registry.
    pub fn assemble(
        router: Arc<ProviderRouter>,
        store: Arc<dyn SharedStore>,
        registry: &SpecialistRegistry,
        codenames: &[String],
        runtime: RuntimeConfig,
    ) -> Result<Self> {
        let deps = SpecialistDeps {
            router: router.clone(),
        };
        let codenames = if codenames.is_empty() {
            registry.codenames()
        } else {
            codenames.to_vec()
        };

        let mut agents = Vec::with_capacity(codenames.len());
        for codename in &codenames {
            let specialist = registry.create(codename, &deps)?;
            agents.push(Agent::new(specialist, store.clone(), runtime.clone()));
        }
        let directory = CouncilDirectory::assemble(agents);
        info!(
            agents = directory.len(),
            providers = router.provider_ids().len(),
            "council assembled"
        );

        Ok(Self {
            router,
            store,
            directory,
            runtime,
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
        })
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<CouncilDirectory> {
        &self.directory
    }

    pub fn agent(&self, codename: &str) -> Result<&Arc<Agent>> {
        self.directory
            .get(&codename.to_uppercase())
            .ok_or_else(|| CouncilError::UnknownAgent(codename.to_string()))
    }

    /// Start every agent and the periodic provider health monitor
    pub fn start(&self) {
        self.directory.start_all();
        let handle = self
            .router
            .spawn_health_monitor(self.runtime.health_check_interval(), self.cancel.clone());
        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Drain and stop every agent, then the health monitor
    pub async fn shutdown(&self) {
        self.directory.shutdown_all().await;
        self.cancel.cancel();
        let monitor = self.monitor.lock().take();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }
        info!("council shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;
    use crate::events::{CompletionEvent, COMPLETION_CHANNEL};
    use crate::message::MessageType;
    use crate::store::MemoryStore;
    use crate::task::TaskStatus;
    use crate::test_support::{Behavior, RecordingSpecialist};
    use serde_json::json;

    fn runtime() -> RuntimeConfig {
        RuntimeConfig {
            workers_per_agent: 2,
            heartbeat_interval_secs: 3600,
            ..Default::default()
        }
    }

    struct Fixture {
        x: Arc<RecordingSpecialist>,
        y: Arc<RecordingSpecialist>,
        directory: Arc<CouncilDirectory>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let x = RecordingSpecialist::new("X", &["route_tracking"]);
        let y = RecordingSpecialist::new("Y", &["face_comparison"]);
        let directory = CouncilDirectory::assemble(vec![
            Agent::new(x.clone(), store.clone(), runtime()),
            Agent::new(y.clone(), store, runtime()),
        ]);
        directory.start_all();
        Fixture { x, y, directory }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_collaboration_round_trip() {
        let f = fixture();
        let x = f.directory.get("X").unwrap().clone();

        assert!(x.collaborate_with("Y", json!({"q": "test"})).is_some());

        // X's specialist sees the uncorrelated response through its hook
        let x_spec = f.x.clone();
        wait_until(move || !x_spec.custom.lock().is_empty()).await;

        let (payload, ctx) = f.y.analyzed.lock()[0].clone();
        assert_eq!(payload, json!({"q": "test"}));
        assert!(ctx.collaboration);
        assert_eq!(ctx.requester.as_deref(), Some("X"));

        let response = f.x.custom.lock()[0].clone();
        assert_eq!(response.message_type, MessageType::CollaborationResponse);
        assert_eq!(response.sender, "Y");
        assert_eq!(response.content["result"], json!({"echo": {"q": "test"}}));
        let key = format!("collaboration_Y_{}", response.id);
        assert!(x.recall(&key).is_some());

        let y = f.directory.get("Y").unwrap().clone();
        wait_until(move || y.status() == AgentStatus::Idle).await;
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_request_collaboration_awaits_result() {
        let f = fixture();
        let x = f.directory.get("X").unwrap().clone();

        let result = x
            .request_collaboration("Y", json!({"q": "who"}), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(result, json!({"echo": {"q": "who"}}));
        // correlated responses do not reach the hook
        assert!(f.x.custom.lock().is_empty());
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_request_collaboration_surfaces_peer_failure() {
        let f = fixture();
        f.y.set_behavior(Behavior::Fail("no match".to_string()));
        let x = f.directory.get("X").unwrap().clone();

        let err = x
            .request_collaboration("Y", json!({}), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        match err {
            CouncilError::CollaborationFailed { agent, reason } => {
                assert_eq!(agent, "Y");
                assert_eq!(reason, "no match");
            }
            other => panic!("unexpected error: {other}"),
        }
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_request_collaboration_times_out() {
        let f = fixture();
        f.y.set_behavior(Behavior::Slow(Duration::from_millis(500)));
        let x = f.directory.get("X").unwrap().clone();

        let err = x
            .request_collaboration("Y", json!({}), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::CollaborationTimeout(ref name) if name == "Y"));
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_undeliverable_message_is_dropped() {
        let f = fixture();
        let x = f.directory.get("X").unwrap().clone();

        assert!(x.share_data("NOBODY", json!({"k": 1})).is_none());
        assert!(x.collaborate_with("NOBODY", json!({})).is_none());
        assert!(!f
            .directory
            .deliver(Message::new("X", "NOBODY", MessageType::DataShare, json!({}))));

        let err = x
            .request_collaboration("NOBODY", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::UnknownAgent(_)));
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_response_to_departed_sender_is_dropped() {
        let f = fixture();
        let y = f.directory.get("Y").unwrap().clone();

        // request claims to come from an agent that is not in the council
        y.post(Message::new(
            "GHOST",
            "Y",
            MessageType::CollaborationRequest,
            json!({"q": 1}),
        ));
        // the mailbox keeps going afterwards
        let x = f.directory.get("X").unwrap().clone();
        let shared_id = x.share_data("Y", json!({"after": true})).unwrap();
        let key = format!("shared_data_X_{}", shared_id);
        wait_until(|| y.recall(&key).is_some()).await;

        assert_eq!(f.y.analyzed.lock().len(), 1);
        assert!(f.x.custom.lock().is_empty());
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_dispatch_picks_capable_agent() {
        let f = fixture();
        let mut events = f.directory.get("X").unwrap().subscribe();

        let task = Task::new("CASE", "route_tracking", json!({}));
        assert_eq!(f.directory.dispatch(task).as_deref(), Some("X"));
        assert!(f
            .directory
            .dispatch(Task::new("CASE", "unknown_task", json!({})))
            .is_none());

        let payload = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let event: CompletionEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(event.status, TaskStatus::Completed);
        f.directory.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_assemble_council_from_registry() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let router = Arc::new(ProviderRouter::new(RoutingTable::default()));
        let council = Council::assemble(
            router,
            store.clone(),
            &SpecialistRegistry::new(),
            &["atlas".to_string(), "ORACLE".to_string()],
            runtime(),
        )
        .unwrap();
        assert_eq!(council.directory().codenames(), vec!["ATLAS", "ORACLE"]);

        let mut completions = store.subscribe(COMPLETION_CHANNEL);
        council.start();
        let atlas = council.agent("atlas").unwrap();
        assert!(atlas.assign_task(Task::new("CASE", "route_tracking", json!({"gps": []}))));

        let payload = tokio::time::timeout(Duration::from_secs(5), completions.recv())
            .await
            .unwrap()
            .unwrap();
        let event: CompletionEvent = serde_json::from_str(&payload).unwrap();
        // no providers registered: analysis completes with the failure recorded
        assert_eq!(event.status, TaskStatus::Completed);
        assert_eq!(event.result.unwrap()["aiConfidence"], 0.0);

        council.shutdown().await;
        assert_eq!(atlas.status(), AgentStatus::Offline);
    }

    #[test]
    fn test_unknown_codename_fails_assembly() {
        let result = Council::assemble(
            Arc::new(ProviderRouter::new(RoutingTable::default())),
            Arc::new(MemoryStore::new()),
            &SpecialistRegistry::new(),
            &["ZEUS".to_string()],
            runtime(),
        );
        assert!(matches!(result, Err(CouncilError::UnknownAgent(_))));
    }

    #[test]
    fn test_router_skips_providers_without_keys() {
        let mut claude = ProviderConfig::claude();
        claude.api_key_env = Some("COUNCIL_TEST_UNSET_KEY".to_string());
        let router = build_router(
            &[claude, ProviderConfig::local()],
            RoutingTable::default(),
            &AuthConfig::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(router.provider_ids(), vec!["local"]);
    }
}
