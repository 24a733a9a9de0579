// message.rs
use crate::error::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Content language a message defaults to when none is given. Content in this
/// language is decoded with a plain JSON parser, never evaluated.
pub const DEFAULT_LANGUAGE: &str = "json";

/// Identity of a registered agent (the environment carries one too).
///
/// Derived deterministically from the display name, so the same name always
/// maps to the same identity. The directory refuses a second enrollment under
/// an already-taken identity instead of overwriting the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Derives the identity for a display name.
    pub fn derive(name: &str) -> Self {
        Self(hex::encode(Sha256::digest(name.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the mailbox when a message is posted. Time-based
/// and strictly increasing within one mailbox instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageId(pub(crate) u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Speech-act tag of a message, after FIPA's communicative acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    Inform,
    Request,
    Failure,
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self {
            Performative::Inform => "inform",
            Performative::Request => "request",
            Performative::Failure => "failure",
        };
        write!(f, "{}", tag)
    }
}

/// Target of a message. `Broadcast` is the "no receiver" sentinel: such a
/// message shows up in every agent's poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Receiver {
    Broadcast,
    Agent(AgentId),
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Receiver::Broadcast => write!(f, "broadcast"),
            Receiver::Agent(id) => write!(f, "{}", id),
        }
    }
}

/// One unit of communication between agents.
///
/// A plain data carrier: sender and receiver identity, a performative, and an
/// opaque JSON payload tagged with the language it should be decoded with.
/// The serde derives are the extension point for wire transport; within one
/// host they are never exercised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// `None` until the message is accepted by a mailbox; immutable after.
    pub id: Option<MessageId>,
    pub performative: Performative,
    pub sender: AgentId,
    pub receiver: Receiver,
    pub content: Value,
    pub language: String,
}

impl Message {
    pub fn new(
        performative: Performative,
        sender: AgentId,
        receiver: Receiver,
        content: Value,
    ) -> Self {
        Self {
            id: None,
            performative,
            sender,
            receiver,
            content,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }
}

/// Predicate used to filter the mailbox.
///
/// Only the receiver field is filterable; an empty query selects every
/// pending message. A broadcast message matches any receiver pattern, so a
/// query for one agent's identity also returns everything addressed to
/// nobody in particular.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    receiver: Option<Regex>,
}

impl MessageQuery {
    /// A query with no patterns: matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts the query to messages whose receiver matches `pattern`. The
    /// pattern is anchored on both ends, so a bare identity matches exactly.
    pub fn receiver(pattern: &str) -> Result<Self, Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            receiver: Some(regex),
        })
    }

    pub fn matches(&self, msg: &Message) -> bool {
        let Some(regex) = &self.receiver else {
            return true;
        };
        match &msg.receiver {
            Receiver::Broadcast => true,
            Receiver::Agent(id) => regex.is_match(id.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg_to(receiver: Receiver) -> Message {
        Message::new(
            Performative::Inform,
            AgentId::derive("sender"),
            receiver,
            json!({"x": 1}),
        )
    }

    #[test]
    fn test_agent_id_is_deterministic() {
        assert_eq!(AgentId::derive("alice"), AgentId::derive("alice"));
        assert_ne!(AgentId::derive("alice"), AgentId::derive("bob"));
        assert_eq!(AgentId::derive("alice").short().len(), 8);
    }

    #[test]
    fn test_message_has_no_id_before_posting() {
        let msg = msg_to(Receiver::Broadcast);
        assert!(msg.id.is_none());
        assert_eq!(msg.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let query = MessageQuery::any();
        assert!(query.matches(&msg_to(Receiver::Broadcast)));
        assert!(query.matches(&msg_to(Receiver::Agent(AgentId::derive("anyone")))));
    }

    #[test]
    fn test_receiver_query_matches_exactly() {
        let target = AgentId::derive("target");
        let query = MessageQuery::receiver(target.as_str()).unwrap();

        assert!(query.matches(&msg_to(Receiver::Agent(target))));
        assert!(!query.matches(&msg_to(Receiver::Agent(AgentId::derive("other")))));
    }

    #[test]
    fn test_partial_identity_does_not_match() {
        let target = AgentId::derive("target");
        let query = MessageQuery::receiver(target.short()).unwrap();
        assert!(!query.matches(&msg_to(Receiver::Agent(target))));
    }

    #[test]
    fn test_broadcast_matches_any_receiver_pattern() {
        let query = MessageQuery::receiver(AgentId::derive("whoever").as_str()).unwrap();
        assert!(query.matches(&msg_to(Receiver::Broadcast)));
    }
}
