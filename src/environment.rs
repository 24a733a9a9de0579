// environment.rs
use crate::agent::Agent;
use crate::error::Error;
use crate::message::{AgentId, Message, MessageId, Performative, Receiver};
use crate::service::{DirectoryService, MessageService};
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Default bounded wait between two mailbox polls of an idle agent.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The single coordinator of one application.
///
/// Owns the shared mailbox, the agent directory, and the runtime the agent
/// loops execute on. It is a passive coordinator: it never runs a loop of its
/// own, and its only active role is posting control messages such as the
/// broadcast stop. The handle is cheap to clone; every clone refers to the
/// same environment.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

struct EnvironmentInner {
    id: AgentId,
    name: String,
    message_service: MessageService,
    directory_service: DirectoryService,
    runtime: Runtime,
    poll_interval: Duration,
    pending: Mutex<Vec<Agent>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Environment {
    pub fn new(name: &str) -> Self {
        Self::with_poll_interval(name, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(name: &str, poll_interval: Duration) -> Self {
        let runtime = Runtime::new().expect("failed to create tokio runtime");
        Self {
            inner: Arc::new(EnvironmentInner {
                id: AgentId::derive(name),
                name: name.to_string(),
                message_service: MessageService::new(),
                directory_service: DirectoryService::new(),
                runtime,
                poll_interval,
                pending: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The environment's own identity, used as the sender of control
    /// messages. Stable for the process lifetime.
    pub fn id(&self) -> &AgentId {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn message_service(&self) -> &MessageService {
        &self.inner.message_service
    }

    pub fn directory_service(&self) -> &DirectoryService {
        &self.inner.directory_service
    }

    /// Registers an agent and queues it for the next `initialize` call.
    pub fn add_agent(&self, mut agent: Agent) -> Result<AgentId, Error> {
        let id = agent.register(self)?;
        self.inner
            .pending
            .lock()
            .expect("agent queue lock poisoned")
            .push(agent);
        Ok(id)
    }

    /// Starts every agent queued so far. Agents added afterwards are not
    /// started automatically; hand them to `start_agent` explicitly.
    pub fn initialize(&self) {
        let agents: Vec<Agent> = self
            .inner
            .pending
            .lock()
            .expect("agent queue lock poisoned")
            .drain(..)
            .collect();
        info!("{}: starting {} agent(s)", self.inner.name, agents.len());
        for agent in agents {
            self.start_agent(agent);
        }
    }

    /// Spawns one agent's run loop on the environment runtime.
    pub fn start_agent(&self, agent: Agent) {
        let handle = self.inner.runtime.spawn(agent.run(self.inner.poll_interval));
        self.inner
            .tasks
            .lock()
            .expect("task list lock poisoned")
            .push(handle);
    }

    /// Posts an environment-originated control message.
    pub fn post(
        &self,
        performative: Performative,
        receiver: Receiver,
        content: Value,
    ) -> MessageId {
        let msg = Message::new(performative, self.inner.id.clone(), receiver, content);
        self.inner.message_service.post(msg)
    }

    /// Broadcasts the stop request. Every live agent picks it up on its next
    /// poll and winds down on its own.
    pub fn finalize(&self) {
        info!("{}: broadcasting stop", self.inner.name);
        self.post(
            Performative::Request,
            Receiver::Broadcast,
            json!({"action": "stop"}),
        );
    }

    /// Waits for every started agent loop to exit. Cooperative only: an
    /// agent that never observes a stop command keeps this call blocked.
    pub fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .expect("task list lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(err) = self.inner.runtime.block_on(handle) {
                warn!("{}: agent task ended abnormally: {}", self.inner.name, err);
            }
        }
    }
}
