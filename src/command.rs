// command.rs
use crate::message::{Message, Performative};
use serde_json::Value;
use std::fmt;

/// Where a message came from, as far as dispatch is concerned. A control
/// message issued by the environment selects a different handler than the
/// same performative coming from a peer agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Environment,
    Peer,
}

/// The resolved dispatch key for one message.
///
/// Resolution precedence: the environment origin is noted first, then an
/// `action` field in the decoded content supplies the subject, then a
/// `proposition.what` field, and a message with neither dispatches on the
/// bare performative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    pub origin: Origin,
    pub performative: Performative,
    pub subject: Option<String>,
}

impl Command {
    /// Key for an environment-issued control message.
    pub fn control(performative: Performative, subject: &str) -> Self {
        Self {
            origin: Origin::Environment,
            performative,
            subject: Some(subject.to_string()),
        }
    }

    /// Key for a peer message carrying no action or proposition.
    pub fn peer(performative: Performative) -> Self {
        Self {
            origin: Origin::Peer,
            performative,
            subject: None,
        }
    }

    /// Key for a peer message whose content names an action (or a
    /// proposition subject).
    pub fn peer_action(performative: Performative, subject: &str) -> Self {
        Self {
            origin: Origin::Peer,
            performative,
            subject: Some(subject.to_string()),
        }
    }

    /// Builds the dispatch key for a message whose content was already
    /// decoded.
    pub fn resolve(msg: &Message, origin: Origin, info: Option<&Value>) -> Self {
        Self {
            origin,
            performative: msg.performative,
            subject: info.and_then(subject_of),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.origin == Origin::Environment {
            write!(f, "env-")?;
        }
        write!(f, "{}", self.performative)?;
        if let Some(subject) = &self.subject {
            write!(f, "-{}", subject)?;
        }
        Ok(())
    }
}

/// Extracts the dispatch subject from decoded content: an `action` key wins,
/// otherwise `proposition.what` is used.
fn subject_of(info: &Value) -> Option<String> {
    let map = info.as_object()?;
    if let Some(action) = map.get("action").and_then(Value::as_str) {
        return Some(action.to_string());
    }
    map.get("proposition")?
        .get("what")?
        .as_str()
        .map(str::to_string)
}

/// Decodes message content without ever executing it: string content must be
/// valid JSON, structured content is taken as-is, and anything undecodable
/// yields `None`.
pub fn decode_content(content: &Value) -> Option<Value> {
    match content {
        Value::Null => None,
        Value::String(text) => serde_json::from_str(text).ok(),
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AgentId, Receiver};
    use serde_json::json;

    fn inform(content: Value) -> Message {
        Message::new(
            Performative::Inform,
            AgentId::derive("someone"),
            Receiver::Broadcast,
            content,
        )
    }

    #[test]
    fn test_decode_structured_content_as_is() {
        let content = json!({"action": "evaluate"});
        assert_eq!(decode_content(&content), Some(content));
    }

    #[test]
    fn test_decode_textual_content_as_json() {
        let content = json!(r#"{"action": "evaluate", "point": [1.0, 2.0]}"#);
        let info = decode_content(&content).unwrap();
        assert_eq!(info["action"], "evaluate");
        assert_eq!(info["point"][1], 2.0);
    }

    #[test]
    fn test_undecodable_content_yields_none() {
        assert_eq!(decode_content(&Value::Null), None);
        assert_eq!(decode_content(&json!("__import__('os')")), None);
        assert_eq!(decode_content(&json!("not json either")), None);
    }

    #[test]
    fn test_action_supplies_the_subject() {
        let msg = inform(json!({}));
        let info = json!({"action": "evaluate", "point": [0.0]});
        let cmd = Command::resolve(&msg, Origin::Peer, Some(&info));
        assert_eq!(cmd, Command::peer_action(Performative::Inform, "evaluate"));
    }

    #[test]
    fn test_action_wins_over_proposition() {
        let msg = inform(json!({}));
        let info = json!({"action": "evaluate", "proposition": {"what": "values"}});
        let cmd = Command::resolve(&msg, Origin::Peer, Some(&info));
        assert_eq!(cmd.subject.as_deref(), Some("evaluate"));
    }

    #[test]
    fn test_proposition_what_supplies_the_subject() {
        let msg = inform(json!({}));
        let info = json!({"proposition": {"what": "values", "objective": 5.0}});
        let cmd = Command::resolve(&msg, Origin::Peer, Some(&info));
        assert_eq!(cmd, Command::peer_action(Performative::Inform, "values"));
    }

    #[test]
    fn test_bare_performative_without_subject() {
        let msg = inform(json!({}));
        let cmd = Command::resolve(&msg, Origin::Peer, Some(&json!([1, 2, 3])));
        assert_eq!(cmd, Command::peer(Performative::Inform));
    }

    #[test]
    fn test_display_matches_the_wire_naming() {
        let cmd = Command::control(Performative::Request, "stop");
        assert_eq!(cmd.to_string(), "env-request-stop");
        let cmd = Command::peer_action(Performative::Inform, "evaluate");
        assert_eq!(cmd.to_string(), "inform-evaluate");
    }
}
