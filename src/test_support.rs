//! In-process providers and specialists for unit tests

use crate::agent::{AgentProfile, AnalysisContext, Capabilities, Specialist};
use crate::error::ProviderError;
use crate::message::Message;
use crate::provider::{Provider, ProviderKind, ProviderResponse, QueryContext};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ordered record of calls shared between fakes
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) struct ScriptedProvider {
    id: String,
    confidence: f64,
    fails: AtomicBool,
    healthy: AtomicBool,
    calls: AtomicUsize,
    log: CallLog,
}

impl ScriptedProvider {
    pub(crate) fn ok(id: &str, confidence: f64, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            confidence,
            fails: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            log: log.clone(),
        })
    }

    pub(crate) fn failing(id: &str, log: &CallLog) -> Arc<Self> {
        let provider = Self::ok(id, 0.0, log);
        provider.fails.store(true, Ordering::SeqCst);
        provider
    }

    pub(crate) fn report_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn query(
        &self,
        prompt: &str,
        _ctx: &QueryContext,
        _system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(self.id.clone());
        if self.fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Other(format!("{} is down", self.id)));
        }
        Ok(ProviderResponse {
            provider: self.id.clone(),
            content: format!("{} answered: {}", self.id, prompt),
            confidence: self.confidence,
            processing_time_secs: 0.5,
            tokens_used: 10,
            cost: 0.01,
            metadata: Value::Null,
            timestamp: Utc::now(),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// How a [`RecordingSpecialist`] answers `analyze`
#[derive(Clone)]
pub(crate) enum Behavior {
    /// Echo the payload back inside `{"echo": ..}`
    Echo,
    Fail(String),
    Panic,
    /// Sleep, then echo
    Slow(Duration),
}

/// Specialist that records every call it receives
pub(crate) struct RecordingSpecialist {
    profile: AgentProfile,
    supported: Vec<String>,
    behavior: Mutex<Behavior>,
    pub(crate) analyzed: Mutex<Vec<(Value, AnalysisContext)>>,
    pub(crate) custom: Mutex<Vec<Message>>,
}

impl RecordingSpecialist {
    pub(crate) fn new(codename: &str, supported: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            profile: AgentProfile {
                name: format!("{} test agent", codename),
                codename: codename.to_string(),
                specialization: "Testing".to_string(),
                tools: vec!["fixture".to_string()],
                ai_backends: Vec::new(),
                division: "Test Division".to_string(),
            },
            supported: supported.iter().map(|s| s.to_string()).collect(),
            behavior: Mutex::new(Behavior::Echo),
            analyzed: Mutex::new(Vec::new()),
            custom: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }
}

#[async_trait]
impl Specialist for RecordingSpecialist {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(self.supported.clone())
    }

    async fn analyze(&self, payload: Value, ctx: AnalysisContext) -> anyhow::Result<Value> {
        self.analyzed.lock().push((payload.clone(), ctx));
        let behavior = self.behavior.lock().clone();
        match behavior {
            Behavior::Echo => Ok(json!({"echo": payload})),
            Behavior::Fail(reason) => Err(anyhow::anyhow!(reason)),
            Behavior::Panic => panic!("specialist exploded"),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(json!({"echo": payload}))
            }
        }
    }

    async fn handle_custom_message(&self, message: &Message) {
        self.custom.lock().push(message.clone());
    }
}
