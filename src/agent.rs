// agent.rs
use crate::command::{decode_content, Command, Origin};
use crate::environment::Environment;
use crate::error::Error;
use crate::message::{AgentId, Message, MessageId, MessageQuery, Performative, Receiver};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::timeout;

/// Handler invoked when a fetched message resolves to its command. It
/// receives the agent's core (to reply, or to stop the loop), the decoded
/// content, and the raw message.
pub type Handler =
    Box<dyn FnMut(&mut AgentCore, Option<Value>, &Message) -> Result<(), Error> + Send>;

/// Parser applied to message content for one language tag, replacing the
/// default JSON decoding.
pub type ContentParser = Box<dyn Fn(&Value) -> Option<Value> + Send>;

/// Registration-dependent state of an agent, split from the dispatch table so
/// handlers can borrow it mutably while they run.
pub struct AgentCore {
    id: Option<AgentId>,
    name: String,
    environment: Option<Environment>,
    working: bool,
    handled: HashSet<MessageId>,
}

impl AgentCore {
    fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            environment: None,
            working: true,
            handled: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` until the agent registers with an environment.
    pub fn id(&self) -> Option<&AgentId> {
        self.id.as_ref()
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    /// Builds a message authored by this agent.
    pub fn compose(
        &self,
        performative: Performative,
        receiver: Receiver,
        content: Value,
    ) -> Result<Message, Error> {
        let id = self.id.clone().ok_or_else(|| Error::Unregistered {
            agent: self.name.clone(),
        })?;
        Ok(Message::new(performative, id, receiver, content))
    }

    /// Posts a message to the environment's mailbox and returns the id the
    /// mailbox assigned to it.
    pub fn send_message(&self, msg: Message) -> Result<MessageId, Error> {
        let env = self.environment.as_ref().ok_or_else(|| Error::Unregistered {
            agent: self.name.clone(),
        })?;
        Ok(env.message_service().post(msg))
    }

    /// Withdraws a previously posted message. Unknown or already-consumed
    /// ids are a no-op.
    pub fn withdraw_message(&self, id: MessageId) -> Result<(), Error> {
        let env = self.environment.as_ref().ok_or_else(|| Error::Unregistered {
            agent: self.name.clone(),
        })?;
        env.message_service().withdraw(id);
        Ok(())
    }

    /// Stops the run loop once the current batch is done.
    pub fn stop(&mut self) {
        info!("{}: finishing work", self.name);
        self.working = false;
    }
}

/// An independently scheduled worker.
///
/// An agent talks to the rest of the system only through the environment's
/// mailbox: it polls for messages addressed to it (or to nobody in
/// particular), resolves each one to a [`Command`], and dispatches to the
/// matching handler. Lifecycle: construct unregistered, `register`, run the
/// loop until a stop command clears the working flag. A stopped agent is not
/// restartable; the loop consumes it.
pub struct Agent {
    core: AgentCore,
    handlers: HashMap<Command, Handler>,
    parsers: HashMap<String, ContentParser>,
    fetch_query: Option<MessageQuery>,
}

impl Agent {
    pub fn new(name: &str) -> Self {
        Self {
            core: AgentCore::new(name),
            handlers: HashMap::new(),
            parsers: HashMap::new(),
            fetch_query: None,
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn id(&self) -> Option<&AgentId> {
        self.core.id()
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// Registers a handler for one resolved command.
    pub fn on<F>(&mut self, command: Command, handler: F)
    where
        F: FnMut(&mut AgentCore, Option<Value>, &Message) -> Result<(), Error> + Send + 'static,
    {
        self.handlers.insert(command, Box::new(handler));
    }

    /// Registers a content parser for one language tag.
    pub fn set_parser<F>(&mut self, language: &str, parser: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + 'static,
    {
        self.parsers.insert(language.to_string(), Box::new(parser));
    }

    /// Binds the agent to an environment: obtains an identity from the
    /// directory and installs the default handler for the environment's stop
    /// request. Registering twice is an error, as is a name that collides
    /// with an already-enrolled agent.
    pub fn register(&mut self, environment: &Environment) -> Result<AgentId, Error> {
        if self.core.id.is_some() {
            return Err(Error::AlreadyRegistered {
                agent: self.core.name.clone(),
            });
        }
        let id = environment.directory_service().enroll(&self.core.name)?;
        self.fetch_query = Some(MessageQuery::receiver(id.as_str())?);
        self.core.id = Some(id.clone());
        self.core.environment = Some(environment.clone());
        self.handlers.insert(
            Command::control(Performative::Request, "stop"),
            Box::new(|core, _info, _msg| {
                core.stop();
                Ok(())
            }),
        );
        info!("{}: registered as {}...", self.core.name, id.short());
        Ok(id)
    }

    /// Removes the agent from the directory. Idempotent; pending messages
    /// stay in the mailbox.
    pub fn unregister(&mut self) {
        if let (Some(id), Some(env)) = (&self.core.id, &self.core.environment) {
            env.directory_service().remove(id);
        }
    }

    /// Posts a message through the environment. Fails if the agent is not
    /// registered.
    pub fn send_message(&self, msg: Message) -> Result<MessageId, Error> {
        self.core.send_message(msg)
    }

    /// Withdraws a previously posted message. Fails if the agent is not
    /// registered.
    pub fn withdraw_message(&self, id: MessageId) -> Result<(), Error> {
        self.core.withdraw_message(id)
    }

    /// Pulls every pending message addressed to this agent or broadcast,
    /// skipping what it already handled and what it authored itself. An
    /// unregistered agent sees nothing.
    pub fn fetch_messages(&self) -> Vec<Message> {
        let (Some(id), Some(env), Some(query)) = (
            &self.core.id,
            &self.core.environment,
            &self.fetch_query,
        ) else {
            return Vec::new();
        };
        env.message_service()
            .search(query)
            .into_iter()
            .filter(|msg| msg.id.is_some_and(|mid| !self.core.handled.contains(&mid)))
            .filter(|msg| &msg.sender != id)
            .collect()
    }

    /// Resolves a message to its dispatch command and decoded content. A
    /// parser registered for the message's language wins over the default
    /// JSON decoding.
    pub fn parse_message(&self, msg: &Message) -> (Command, Option<Value>) {
        let origin = match &self.core.environment {
            Some(env) if env.id() == &msg.sender => Origin::Environment,
            _ => Origin::Peer,
        };
        let info = match self.parsers.get(&msg.language) {
            Some(parser) => parser(&msg.content),
            None => decode_content(&msg.content),
        };
        (Command::resolve(msg, origin, info.as_ref()), info)
    }

    /// Consumes one message. A given id is handled at most once; a command
    /// with no registered handler is dropped silently; a handler error is
    /// logged and never escapes the loop.
    pub fn handle_message(&mut self, msg: &Message) {
        let Some(id) = msg.id else {
            return;
        };
        if !self.core.handled.insert(id) {
            return;
        }
        let (command, info) = self.parse_message(msg);
        let Some(handler) = self.handlers.get_mut(&command) else {
            debug!(
                "{}: no handler for command {}, dropping message {}",
                self.core.name, command, id
            );
            return;
        };
        debug!(
            "{}: message {} interpreted as command {}",
            self.core.name, id, command
        );
        if let Err(err) = handler(&mut self.core, info, msg) {
            warn!("{}: handler for {} failed: {}", self.core.name, command, err);
        }
    }

    /// The agent's unit of execution: fetch pending messages, handle each in
    /// turn, and wait for the next post when idle. Exits once a stop command
    /// clears the working flag.
    pub async fn run(mut self, poll: Duration) {
        let Some(env) = self.core.environment.clone() else {
            warn!("{}: started without an environment, nothing to do", self.core.name);
            return;
        };
        let notify = env.message_service().notifier();
        info!("{}: starting work", self.core.name);
        while self.core.working {
            let batch = self.fetch_messages();
            if batch.is_empty() {
                // Bounded wait: wake on the next post, or re-poll after the
                // interval in case one landed before we subscribed.
                let _ = timeout(poll, notify.notified()).await;
                continue;
            }
            for msg in &batch {
                self.handle_message(msg);
            }
        }
        info!("{}: stopped", self.core.name);
    }
}
