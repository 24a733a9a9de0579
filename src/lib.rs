// lib.rs

//! A minimal multi-agent communication substrate.
//!
//! Agents register with a single [`Environment`], exchange [`Message`]s
//! through its shared mailbox, and shut down cooperatively once the
//! environment broadcasts a stop request. There is no direct call between
//! two agents: everything goes through the mailbox, pull-based. The
//! [`blackbox`] module builds the one concrete specialization: a two-agent
//! session evaluating a model on behalf of an external black-box
//! optimization solver.

pub mod agent;
pub mod blackbox;
pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod message;
pub mod service;

pub use agent::{Agent, AgentCore};
pub use blackbox::Blackbox;
pub use command::{Command, Origin};
pub use config::Config;
pub use environment::Environment;
pub use error::Error;
pub use message::{AgentId, Message, MessageId, MessageQuery, Performative, Receiver};
pub use service::{DirectoryService, MessageService};
