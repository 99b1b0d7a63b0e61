//! Agent runtime
//!
//! An [`Agent`] wraps one [`Specialist`] and owns everything around it:
//! - the current-task table and a worker pool draining its [`WorkQueue`]
//! - a FIFO [`Mailbox`] processed by a single loop
//! - a heartbeat loop writing to the [`SharedStore`]
//! - session memory and the real-time [`Listeners`]
//!
//! Lock order is always tasks, then status.

use super::{AgentProfile, AgentStatus, AnalysisContext, Capabilities, Specialist};
use crate::bus::{Listeners, Mailbox, WorkQueue};
use crate::config::RuntimeConfig;
use crate::council::CouncilDirectory;
use crate::error::{CouncilError, Result};
use crate::events::{CompletionEvent, Heartbeat, COMPLETION_CHANNEL};
use crate::message::{Message, MessageType};
use crate::store::SharedStore;
use crate::task::{Task, TaskStatus};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type CollaborationReply = std::result::Result<Value, String>;

pub struct Agent {
    profile: AgentProfile,
    specialist: Arc<dyn Specialist>,
    status: RwLock<AgentStatus>,
    tasks: Mutex<HashMap<String, Task>>,
    memory: RwLock<HashMap<String, Value>>,
    mailbox: Mailbox,
    queue: WorkQueue,
    listeners: Listeners,
    store: Arc<dyn SharedStore>,
    council: RwLock<Option<Weak<CouncilDirectory>>>,
    /// Outstanding `request_collaboration` calls keyed by request message id
    pending: Mutex<HashMap<String, oneshot::Sender<CollaborationReply>>>,
    runtime: RuntimeConfig,
    cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
    started: AtomicBool,
}

impl Agent {
    pub fn new(
        specialist: Arc<dyn Specialist>,
        store: Arc<dyn SharedStore>,
        runtime: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            profile: specialist.profile().clone(),
            specialist,
            status: RwLock::new(AgentStatus::Offline),
            tasks: Mutex::new(HashMap::new()),
            memory: RwLock::new(HashMap::new()),
            mailbox: Mailbox::new(),
            queue: WorkQueue::new(),
            listeners: Listeners::new(),
            store,
            council: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            runtime,
            cancel: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            started: AtomicBool::new(false),
        })
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn codename(&self) -> &str {
        &self.profile.codename
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.read()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.specialist.capabilities()
    }

    /// Run the specialization directly, bypassing the task table
    pub async fn analyze(&self, payload: Value, ctx: AnalysisContext) -> anyhow::Result<Value> {
        self.specialist.analyze(payload, ctx).await
    }

    pub fn active_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Snapshot of an active task
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn recall(&self, key: &str) -> Option<Value> {
        self.memory.read().get(key).cloned()
    }

    pub fn remember(&self, key: impl Into<String>, value: Value) {
        self.memory.write().insert(key.into(), value);
    }

    pub fn memory_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.memory.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register a real-time listener for completion events
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        self.listeners.subscribe()
    }

    pub(crate) fn register_with_council(&self, council: Weak<CouncilDirectory>) {
        *self.council.write() = Some(council);
    }

    fn council(&self) -> Option<Arc<CouncilDirectory>> {
        self.council.read().as_ref().and_then(Weak::upgrade)
    }

    /// Put a message in this agent's mailbox
    pub fn post(&self, message: Message) -> bool {
        self.mailbox.post(message)
    }

    // ---- task lifecycle ----

    /// Accept a task for asynchronous processing.
    ///
    /// Returns `false` without touching any state when the task type is not
    /// supported or the agent has been shut down.
    pub fn assign_task(&self, task: Task) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!(
                agent = %self.codename(),
                task_id = %task.id,
                "rejecting task, agent is shut down"
            );
            return false;
        }
        if !self.capabilities().supports(&task.task_type) {
            info!(
                agent = %self.codename(),
                task_id = %task.id,
                task_type = %task.task_type,
                "rejecting unsupported task type"
            );
            return false;
        }

        let task_id = task.id.clone();
        let previous = {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(&task_id) {
                warn!(agent = %self.codename(), task_id = %task_id, "task already active");
                return false;
            }
            tasks.insert(task_id.clone(), task);
            let mut status = self.status.write();
            std::mem::replace(&mut *status, AgentStatus::Working)
        };

        if !self.queue.push(task_id.clone()) {
            let mut tasks = self.tasks.lock();
            tasks.remove(&task_id);
            *self.status.write() = previous;
            warn!(agent = %self.codename(), task_id = %task_id, "work queue closed, task dropped");
            return false;
        }

        info!(agent = %self.codename(), task_id = %task_id, "task accepted");
        true
    }

    async fn process_task(&self, task_id: String) {
        let started = {
            let mut tasks = self.tasks.lock();
            tasks.get_mut(&task_id).map(|task| {
                task.status = TaskStatus::InProgress;
                let ctx = AnalysisContext {
                    case_id: Some(task.case_id.clone()),
                    task_id: Some(task.id.clone()),
                    task_type: Some(task.task_type.clone()),
                    ..Default::default()
                };
                (task.payload.clone(), ctx)
            })
        };
        let Some((payload, ctx)) = started else {
            warn!(agent = %self.codename(), task_id = %task_id, "queued task vanished");
            return;
        };

        debug!(agent = %self.codename(), task_id = %task_id, "task in progress");
        let outcome = AssertUnwindSafe(self.specialist.analyze(payload, ctx))
            .catch_unwind()
            .await;

        let finished = {
            let mut tasks = self.tasks.lock();
            let Some(mut task) = tasks.remove(&task_id) else {
                return;
            };
            match outcome {
                Ok(Ok(result)) => task.complete(result),
                Ok(Err(e)) => task.fail(format!("{:#}", e)),
                Err(panic) => task.fail(format!("analysis panicked: {}", panic_message(&*panic))),
            }
            let mut status = self.status.write();
            if *status != AgentStatus::Offline {
                *status = if tasks.is_empty() {
                    AgentStatus::Idle
                } else {
                    AgentStatus::Working
                };
            }
            task
        };

        match finished.status {
            TaskStatus::Completed => {
                info!(agent = %self.codename(), task_id = %finished.id, "task completed")
            }
            _ => error!(
                agent = %self.codename(),
                task_id = %finished.id,
                error = finished.error.as_deref().unwrap_or_default(),
                "task failed"
            ),
        }
        self.notify_completion(&finished).await;
    }

    async fn notify_completion(&self, task: &Task) {
        let event = CompletionEvent::from_task(self.codename(), task);
        match serde_json::to_string(&event) {
            Ok(payload) => {
                if let Err(e) = self.store.publish(COMPLETION_CHANNEL, &payload).await {
                    warn!(
                        agent = %self.codename(),
                        task_id = %task.id,
                        error = %e,
                        "failed to publish completion"
                    );
                }
            }
            Err(e) => warn!(agent = %self.codename(), error = %e, "failed to encode completion"),
        }
        self.listeners.broadcast(&event);
    }

    fn settle_status(&self) {
        let tasks = self.tasks.lock();
        let mut status = self.status.write();
        if *status != AgentStatus::Offline {
            *status = if tasks.is_empty() {
                AgentStatus::Idle
            } else {
                AgentStatus::Working
            };
        }
    }

    // ---- background loops ----

    /// Spawn the mailbox loop, heartbeat loop and worker pool. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(rx) = self.mailbox.take_receiver() else {
            error!(agent = %self.codename(), "mailbox receiver already taken");
            *self.status.write() = AgentStatus::Error;
            return;
        };

        {
            let tasks = self.tasks.lock();
            *self.status.write() = if tasks.is_empty() {
                AgentStatus::Idle
            } else {
                AgentStatus::Working
            };
        }

        let mut loops = self.loops.lock();
        loops.push(tokio::spawn(Arc::clone(self).run_mailbox(rx)));
        loops.push(tokio::spawn(Arc::clone(self).run_heartbeat()));
        drop(loops);

        let mut workers = self.workers.lock();
        for _ in 0..self.runtime.workers() {
            let agent = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                while let Some(task_id) = agent.queue.next().await {
                    agent.process_task(task_id).await;
                }
            }));
        }
        drop(workers);

        info!(
            agent = %self.codename(),
            workers = self.runtime.workers(),
            "agent started"
        );
    }

    async fn run_mailbox(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Message>) {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle_message(message).await;
        }
        debug!(agent = %self.codename(), "mailbox loop stopped");
    }

    async fn run_heartbeat(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.runtime.heartbeat_interval());
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.publish_heartbeat().await,
            }
        }
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            status: self.status(),
            last_heartbeat: Utc::now(),
            active_tasks: self.active_tasks(),
            specialization: self.profile.specialization.clone(),
        }
    }

    /// Write one heartbeat record. Failures are logged, never returned.
    pub async fn publish_heartbeat(&self) {
        let beat = self.heartbeat();
        if let Err(e) = self.store.put_heartbeat(self.codename(), &beat).await {
            warn!(agent = %self.codename(), error = %e, "heartbeat failed");
        }
    }

    /// Stop accepting tasks, drain the queue, then stop the loops.
    pub async fn shutdown(&self) {
        info!(agent = %self.codename(), "shutting down");
        self.accepting.store(false, Ordering::SeqCst);
        self.queue.close();

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            // never started: no worker will drain what was accepted
            while let Some(task_id) = self.queue.next().await {
                self.process_task(task_id).await;
            }
        }
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(agent = %self.codename(), error = %e, "worker exited abnormally");
            }
        }

        self.cancel.cancel();
        let loops = std::mem::take(&mut *self.loops.lock());
        futures::future::join_all(loops).await;

        // wake anyone still waiting on a collaboration reply
        self.pending.lock().clear();
        *self.status.write() = AgentStatus::Offline;
        info!(agent = %self.codename(), "agent offline");
    }

    // ---- message handling ----

    pub(crate) async fn handle_message(&self, message: Message) {
        debug!(
            agent = %self.codename(),
            sender = %message.sender,
            message_type = %message.message_type,
            "message received"
        );
        match message.message_type {
            MessageType::CollaborationRequest => self.handle_collaboration_request(message).await,
            MessageType::CollaborationResponse => {
                self.handle_collaboration_response(message).await
            }
            MessageType::DataShare => self.handle_data_share(message),
            MessageType::TaskDelegation => self.handle_task_delegation(message),
            MessageType::Custom(_) => self.specialist.handle_custom_message(&message).await,
        }
    }

    async fn handle_collaboration_request(&self, message: Message) {
        {
            let mut status = self.status.write();
            if *status != AgentStatus::Offline {
                *status = AgentStatus::Collaboration;
            }
        }

        let ctx = AnalysisContext::collaboration(&message.sender);
        let outcome = AssertUnwindSafe(self.specialist.analyze(message.content.clone(), ctx))
            .catch_unwind()
            .await;
        let content = match outcome {
            Ok(Ok(result)) => json!({"requestId": message.id, "result": result}),
            Ok(Err(e)) => json!({"requestId": message.id, "error": format!("{:#}", e)}),
            Err(panic) => json!({
                "requestId": message.id,
                "error": format!("analysis panicked: {}", panic_message(&*panic)),
            }),
        };

        let response = Message::new(
            self.codename(),
            &message.sender,
            MessageType::CollaborationResponse,
            content,
        )
        .with_priority(message.priority);
        self.deliver(response);
        self.settle_status();
    }

    async fn handle_collaboration_response(&self, message: Message) {
        let waiter = message
            .content
            .get("requestId")
            .and_then(Value::as_str)
            .and_then(|id| self.pending.lock().remove(id));

        if let Some(tx) = waiter {
            let reply = match message.content.get("error").and_then(Value::as_str) {
                Some(reason) => Err(reason.to_string()),
                None => Ok(message.content.get("result").cloned().unwrap_or(Value::Null)),
            };
            // the requester may have timed out already
            let _ = tx.send(reply);
            return;
        }

        self.remember(
            format!("collaboration_{}_{}", message.sender, message.id),
            message.content.clone(),
        );
        self.specialist.handle_custom_message(&message).await;
    }

    fn handle_data_share(&self, message: Message) {
        let key = format!("shared_data_{}_{}", message.sender, message.id);
        self.remember(
            key,
            json!({
                "data": message.content,
                "timestamp": message.timestamp,
                "sender": message.sender,
            }),
        );
    }

    fn handle_task_delegation(&self, message: Message) {
        match Task::from_delegation(&message.content) {
            Some(task) => {
                if !self.assign_task(task) {
                    warn!(
                        agent = %self.codename(),
                        sender = %message.sender,
                        "delegated task refused"
                    );
                }
            }
            None => warn!(
                agent = %self.codename(),
                sender = %message.sender,
                "task delegation without task_type ignored"
            ),
        }
    }

    // ---- sending ----

    /// Hand a message to the council. Undeliverable messages are logged and dropped.
    fn deliver(&self, message: Message) -> bool {
        match self.council() {
            Some(council) => council.deliver(message),
            None => {
                warn!(
                    agent = %self.codename(),
                    recipient = %message.recipient,
                    "not registered with a council, message dropped"
                );
                false
            }
        }
    }

    /// Send a message to another agent. Returns the message id if it was delivered.
    pub fn send_message(
        &self,
        recipient: &str,
        message_type: impl Into<MessageType>,
        content: Value,
    ) -> Option<String> {
        let message = Message::new(self.codename(), recipient, message_type, content);
        let id = message.id.clone();
        self.deliver(message).then_some(id)
    }

    /// Fire-and-forget collaboration request
    pub fn collaborate_with(&self, target: &str, request: Value) -> Option<String> {
        self.send_message(target, MessageType::CollaborationRequest, request)
    }

    pub fn share_data(&self, target: &str, data: Value) -> Option<String> {
        self.send_message(target, MessageType::DataShare, data)
    }

    pub fn delegate_task(&self, target: &str, delegation: Value) -> Option<String> {
        self.send_message(target, MessageType::TaskDelegation, delegation)
    }

    /// Ask another agent to analyze `request` and wait for its answer.
    ///
    /// The reply is delivered through this agent's mailbox, so the agent must be
    /// started and this must not be awaited from inside its own mailbox handling.
    pub async fn request_collaboration(
        &self,
        target: &str,
        request: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let council = self
            .council()
            .ok_or_else(|| CouncilError::NotInCouncil(self.codename().to_string()))?;
        if council.get(target).is_none() {
            return Err(CouncilError::UnknownAgent(target.to_string()));
        }

        let message = Message::new(
            self.codename(),
            target,
            MessageType::CollaborationRequest,
            request,
        );
        let request_id = message.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        if !council.deliver(message) {
            self.pending.lock().remove(&request_id);
            return Err(CouncilError::UnknownAgent(target.to_string()));
        }

        let timeout = timeout.unwrap_or_else(|| self.runtime.collaboration_timeout());
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(reason))) => Err(CouncilError::CollaborationFailed {
                agent: target.to_string(),
                reason,
            }),
            Ok(Err(_)) => Err(CouncilError::ShutDown(self.codename().to_string())),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(CouncilError::CollaborationTimeout(target.to_string()))
            }
        }
    }

    // ---- sessions and reporting ----

    /// Persist session memory and active tasks under `session_id`
    pub async fn save_session(&self, session_id: &str) -> Result<()> {
        let snapshot = {
            let memory = self.memory.read().clone();
            let tasks = self.tasks.lock().clone();
            json!({
                "agent": self.codename(),
                "memory": memory,
                "tasks": tasks,
                "status": self.status(),
                "timestamp": Utc::now(),
            })
        };
        let payload = serde_json::to_string(&snapshot).map_err(crate::error::StoreError::from)?;
        self.store
            .set_session(session_id, self.codename(), &payload)
            .await?;
        debug!(agent = %self.codename(), session = %session_id, "session saved");
        Ok(())
    }

    /// Replace session memory with the snapshot saved under `session_id`.
    /// Tasks are not restored.
    ///
    /// Returns `false` when no snapshot exists; memory is left untouched then.
    pub async fn load_session(&self, session_id: &str) -> Result<bool> {
        let Some(payload) = self.store.get_session(session_id, self.codename()).await? else {
            return Ok(false);
        };
        let snapshot: Value =
            serde_json::from_str(&payload).map_err(crate::error::StoreError::from)?;
        let memory: HashMap<String, Value> = snapshot
            .get("memory")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        *self.memory.write() = memory;
        debug!(agent = %self.codename(), session = %session_id, "session loaded");
        Ok(true)
    }

    pub fn status_report(&self) -> Value {
        json!({
            "name": self.profile.name,
            "codename": self.profile.codename,
            "specialization": self.profile.specialization,
            "division": self.profile.division,
            "status": self.status(),
            "activeTasks": self.active_tasks(),
            "tools": self.profile.tools,
            "aiBackends": self.profile.ai_backends,
            "capabilities": self.capabilities(),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{Behavior, RecordingSpecialist};
    use tokio::sync::broadcast;

    fn runtime() -> RuntimeConfig {
        RuntimeConfig {
            workers_per_agent: 2,
            heartbeat_interval_secs: 3600,
            ..Default::default()
        }
    }

    fn agent_with(specialist: &Arc<RecordingSpecialist>) -> (Arc<Agent>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let agent = Agent::new(specialist.clone(), store.clone(), runtime());
        (agent, store)
    }

    async fn next_event(rx: &mut broadcast::Receiver<String>) -> CompletionEvent {
        let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for completion")
            .unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_task_completes_and_leaves_table() {
        let specialist = RecordingSpecialist::new("ATLAS", &["route_tracking"]);
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);
        agent.start();

        let task = Task::new("CASE-1", "route_tracking", json!({"gps": [1, 2]}));
        let task_id = task.id.clone();
        assert!(agent.assign_task(task));

        let event = next_event(&mut events).await;
        assert_eq!(event.task_id, task_id);
        assert_eq!(event.agent, "ATLAS");
        assert_eq!(event.status, TaskStatus::Completed);
        assert_eq!(event.result, Some(json!({"echo": {"gps": [1, 2]}})));
        assert!(event.error.is_none());

        assert!(agent.task(&task_id).is_none());
        assert_eq!(agent.active_tasks(), 0);
        assert_eq!(agent.status(), AgentStatus::Idle);

        let (payload, ctx) = specialist.analyzed.lock()[0].clone();
        assert_eq!(payload, json!({"gps": [1, 2]}));
        assert_eq!(ctx.case_id.as_deref(), Some("CASE-1"));
        assert!(!ctx.collaboration);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsupported_task_is_rejected_without_side_effects() {
        let specialist = RecordingSpecialist::new("ATLAS", &["route_tracking"]);
        let (agent, _store) = agent_with(&specialist);
        agent.start();
        let before = agent.status();

        assert!(!agent.assign_task(Task::new("c", "facial_recognition", json!({}))));
        assert_eq!(agent.status(), before);
        assert_eq!(agent.active_tasks(), 0);
        assert!(specialist.analyzed.lock().is_empty());
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_analyze_error_fails_task() {
        let specialist = RecordingSpecialist::new("ORACLE", &["face_comparison"]);
        specialist.set_behavior(Behavior::Fail("no faces found".to_string()));
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);
        agent.start();

        assert!(agent.assign_task(Task::new("c", "face_comparison", json!({}))));
        let event = next_event(&mut events).await;

        assert_eq!(event.status, TaskStatus::Failed);
        assert_eq!(event.error.as_deref(), Some("no faces found"));
        assert!(event.result.is_none());
        assert_eq!(agent.active_tasks(), 0);
        assert_eq!(agent.status(), AgentStatus::Idle);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_analyze_fails_task_and_worker_survives() {
        let specialist = RecordingSpecialist::new("ORACLE", &["face_comparison"]);
        specialist.set_behavior(Behavior::Panic);
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);
        agent.start();

        assert!(agent.assign_task(Task::new("c", "face_comparison", json!({}))));
        let event = next_event(&mut events).await;
        assert_eq!(event.status, TaskStatus::Failed);
        assert!(event.error.unwrap().contains("specialist exploded"));

        specialist.set_behavior(Behavior::Echo);
        assert!(agent.assign_task(Task::new("c", "face_comparison", json!({"n": 2}))));
        let event = next_event(&mut events).await;
        assert_eq!(event.status, TaskStatus::Completed);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_tasks_each_finish_once() {
        let specialist = RecordingSpecialist::new("ARGUS", &["profile_analysis"]);
        specialist.set_behavior(Behavior::Slow(Duration::from_millis(20)));
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);
        agent.start();

        let mut ids: Vec<String> = Vec::new();
        for n in 0..6 {
            let task = Task::new("c", "profile_analysis", json!({ "n": n }));
            ids.push(task.id.clone());
            assert!(agent.assign_task(task));
        }
        assert_eq!(agent.status(), AgentStatus::Working);

        let mut seen = Vec::new();
        for _ in 0..ids.len() {
            let event = next_event(&mut events).await;
            assert_eq!(event.status, TaskStatus::Completed);
            seen.push(event.task_id);
        }
        seen.sort();
        ids.sort();
        assert_eq!(seen, ids);
        assert_eq!(agent.active_tasks(), 0);
        assert_eq!(agent.status(), AgentStatus::Idle);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_listeners_receive_completion() {
        let specialist = RecordingSpecialist::new("ATLAS", &["route_tracking"]);
        let (agent, _store) = agent_with(&specialist);
        let mut listener = agent.subscribe();
        agent.start();

        assert!(agent.assign_task(Task::new("c", "route_tracking", json!({}))));
        let payload = tokio::time::timeout(Duration::from_secs(5), listener.recv())
            .await
            .unwrap()
            .unwrap();
        let event: CompletionEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(event.status, TaskStatus::Completed);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_mailbox_is_fifo() {
        let specialist = RecordingSpecialist::new("HYDRA", &[]);
        let (agent, _store) = agent_with(&specialist);
        agent.start();

        for n in 1..=5 {
            agent.post(Message::new("KRONOS", "HYDRA", "case_update", json!({ "seq": n })));
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while specialist.custom.lock().len() < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let order: Vec<Value> = specialist
            .custom
            .lock()
            .iter()
            .map(|m| m.content["seq"].clone())
            .collect();
        assert_eq!(order, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_data_share_lands_in_memory() {
        let specialist = RecordingSpecialist::new("ATLAS", &[]);
        let (agent, _store) = agent_with(&specialist);

        let message = Message::new("ORACLE", "ATLAS", MessageType::DataShare, json!({"face": 1}));
        let key = format!("shared_data_ORACLE_{}", message.id);
        agent.handle_message(message).await;

        let stored = agent.recall(&key).unwrap();
        assert_eq!(stored["data"], json!({"face": 1}));
        assert_eq!(stored["sender"], "ORACLE");
        assert!(specialist.analyzed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_task_delegation_assigns_task() {
        let specialist = RecordingSpecialist::new("TRACE", &["route_analysis"]);
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);
        agent.start();

        agent.post(Message::new(
            "MOTOR",
            "TRACE",
            MessageType::TaskDelegation,
            json!({"task_type": "route_analysis", "case_id": "CASE-9", "data": {"plate": "X1"}}),
        ));

        let event = next_event(&mut events).await;
        assert_eq!(event.status, TaskStatus::Completed);
        assert_eq!(event.result, Some(json!({"echo": {"plate": "X1"}})));
        let (_, ctx) = specialist.analyzed.lock()[0].clone();
        assert_eq!(ctx.case_id.as_deref(), Some("CASE-9"));
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_uncorrelated_response_goes_to_memory_and_hook() {
        let specialist = RecordingSpecialist::new("ATLAS", &[]);
        let (agent, _store) = agent_with(&specialist);

        let message = Message::new(
            "ORACLE",
            "ATLAS",
            MessageType::CollaborationResponse,
            json!({"requestId": "unknown", "result": 1}),
        );
        let key = format!("collaboration_ORACLE_{}", message.id);
        agent.handle_message(message).await;

        assert!(agent.recall(&key).is_some());
        assert_eq!(specialist.custom.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_is_published() {
        let specialist = RecordingSpecialist::new("SENTINEL", &[]);
        let (agent, store) = agent_with(&specialist);
        agent.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.heartbeat("SENTINEL").await.unwrap().is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let beat = store.heartbeat("SENTINEL").await.unwrap().unwrap();
        assert_eq!(beat.specialization, "Testing");
        assert_eq!(beat.active_tasks, 0);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_then_refuses() {
        let specialist = RecordingSpecialist::new("PHOENIX", &["data_recovery"]);
        specialist.set_behavior(Behavior::Slow(Duration::from_millis(10)));
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);
        agent.start();

        for _ in 0..4 {
            assert!(agent.assign_task(Task::new("c", "data_recovery", json!({}))));
        }
        agent.shutdown().await;

        for _ in 0..4 {
            assert_eq!(next_event(&mut events).await.status, TaskStatus::Completed);
        }
        assert_eq!(agent.active_tasks(), 0);
        assert_eq!(agent.status(), AgentStatus::Offline);
        assert!(!agent.assign_task(Task::new("c", "data_recovery", json!({}))));
    }

    #[tokio::test]
    async fn test_session_round_trip_restores_memory_only() {
        let specialist = RecordingSpecialist::new("KRONOS", &[]);
        let store = Arc::new(MemoryStore::new());
        let agent = Agent::new(specialist.clone(), store.clone(), runtime());
        agent.remember("timeline", json!(["a", "b"]));
        agent.save_session("S1").await.unwrap();

        let restored = Agent::new(specialist, store, runtime());
        restored.remember("stale", json!(true));
        assert!(restored.load_session("S1").await.unwrap());
        assert_eq!(restored.recall("timeline"), Some(json!(["a", "b"])));
        assert_eq!(restored.recall("stale"), None);
        assert_eq!(restored.memory_keys(), vec!["timeline".to_string()]);

        assert!(!restored.load_session("missing").await.unwrap());
        assert_eq!(restored.recall("timeline"), Some(json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_shutdown_without_start_finishes_queued_tasks() {
        let specialist = RecordingSpecialist::new("ATLAS", &["route_tracking"]);
        let (agent, store) = agent_with(&specialist);
        let mut events = store.subscribe(COMPLETION_CHANNEL);

        let task = Task::new("case-9", "route_tracking", json!({"plate": "X1"}));
        let task_id = task.id.clone();
        assert!(agent.assign_task(task));
        assert_eq!(agent.active_tasks(), 1);

        agent.shutdown().await;

        let event = next_event(&mut events).await;
        assert_eq!(event.task_id, task_id);
        assert_eq!(event.status, TaskStatus::Completed);
        assert_eq!(agent.active_tasks(), 0);
        assert_eq!(agent.status(), AgentStatus::Offline);
    }

    #[tokio::test]
    async fn test_send_without_council_is_dropped() {
        let specialist = RecordingSpecialist::new("ATLAS", &[]);
        let (agent, _store) = agent_with(&specialist);
        assert!(agent.share_data("ORACLE", json!({})).is_none());
        let err = agent
            .request_collaboration("ORACLE", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::NotInCouncil(_)));
    }

    #[test]
    fn test_status_report_shape() {
        let specialist = RecordingSpecialist::new("GRAPH", &["network_graphs"]);
        let agent = Agent::new(specialist, Arc::new(MemoryStore::new()), runtime());
        let report = agent.status_report();
        assert_eq!(report["codename"], "GRAPH");
        assert_eq!(report["status"], "offline");
        assert_eq!(report["activeTasks"], 0);
        assert_eq!(
            report["capabilities"]["supportedTaskTypes"],
            json!(["network_graphs"])
        );
    }
}
