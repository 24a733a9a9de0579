// service.rs
use crate::error::Error;
use crate::message::{AgentId, Message, MessageId, MessageQuery};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Generic id-keyed object store shared between agent tasks.
///
/// Both environment services specialize this: the mailbox keys messages by
/// post time, the directory keys agents by their name-derived identity. All
/// access goes through one mutex, so concurrent add/remove/search from many
/// agents cannot corrupt the map.
#[derive(Debug)]
pub struct ManagementService<I, T> {
    objects: Mutex<HashMap<I, T>>,
}

impl<I: Eq + Hash + Clone, T: Clone> ManagementService<I, T> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: I, obj: T) {
        self.objects.lock().expect("service lock poisoned").insert(id, obj);
    }

    /// Stores `obj` only if `id` is still free. Returns whether it was stored.
    pub fn insert_if_absent(&self, id: I, obj: T) -> bool {
        let mut objects = self.objects.lock().expect("service lock poisoned");
        if objects.contains_key(&id) {
            return false;
        }
        objects.insert(id, obj);
        true
    }

    /// Removes an entry. Removing an absent id is a no-op.
    pub fn remove(&self, id: &I) {
        self.objects.lock().expect("service lock poisoned").remove(id);
    }

    pub fn contains(&self, id: &I) -> bool {
        self.objects.lock().expect("service lock poisoned").contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("service lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones out every entry. Iteration order is unspecified.
    pub fn snapshot(&self) -> Vec<(I, T)> {
        self.objects
            .lock()
            .expect("service lock poisoned")
            .iter()
            .map(|(id, obj)| (id.clone(), obj.clone()))
            .collect()
    }
}

/// The shared mailbox.
///
/// Messages stay posted until their sender withdraws them: delivery does not
/// evict, so a long-lived environment accumulates handled messages. Callers
/// that care about mailbox growth should withdraw what they post.
#[derive(Debug)]
pub struct MessageService {
    store: ManagementService<MessageId, Message>,
    last_id: Mutex<u64>,
    notify: Arc<Notify>,
}

impl MessageService {
    pub fn new() -> Self {
        Self {
            store: ManagementService::new(),
            last_id: Mutex::new(0),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Time-based token, strictly increasing even when two posts land in the
    /// same microsecond.
    fn create_id(&self) -> MessageId {
        let now = Utc::now().timestamp_micros() as u64;
        let mut last = self.last_id.lock().expect("message id lock poisoned");
        *last = now.max(*last + 1);
        MessageId(*last)
    }

    /// Accepts a message: assigns a fresh id, stores it, and wakes pollers.
    pub fn post(&self, mut msg: Message) -> MessageId {
        let id = self.create_id();
        msg.id = Some(id);
        debug!(
            "mailbox: {} message {} from {}... to {}",
            msg.performative,
            id,
            msg.sender.short(),
            msg.receiver,
        );
        self.store.insert(id, msg);
        self.notify.notify_waiters();
        id
    }

    /// Removes a posted message. Unknown or already-withdrawn ids are a
    /// no-op.
    pub fn withdraw(&self, id: MessageId) {
        self.store.remove(&id);
    }

    /// Returns every stored message selected by `query`, in unspecified
    /// order.
    pub fn search(&self, query: &MessageQuery) -> Vec<Message> {
        self.store
            .snapshot()
            .into_iter()
            .map(|(_, msg)| msg)
            .filter(|msg| query.matches(msg))
            .collect()
    }

    /// Wakeup handle the agent poll loops wait on between posts.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// One registered agent, as the directory sees it.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

/// The agent registry.
///
/// Identities are derived from display names, so enrolling a second agent
/// under an already-taken name is refused instead of silently replacing the
/// first entry.
#[derive(Debug)]
pub struct DirectoryService {
    store: ManagementService<AgentId, AgentRecord>,
}

impl DirectoryService {
    pub fn new() -> Self {
        Self {
            store: ManagementService::new(),
        }
    }

    /// Assigns the identity for `name`, failing if it is already taken.
    pub fn enroll(&self, name: &str) -> Result<AgentId, Error> {
        let id = AgentId::derive(name);
        let record = AgentRecord {
            name: name.to_string(),
            registered_at: Utc::now(),
        };
        if !self.store.insert_if_absent(id.clone(), record) {
            return Err(Error::DuplicateIdentity {
                name: name.to_string(),
                id,
            });
        }
        info!("directory: {} enrolled as {}...", name, id.short());
        Ok(id)
    }

    /// Removes an entry. Idempotent.
    pub fn remove(&self, id: &AgentId) {
        self.store.remove(id);
    }

    /// Looks up the identity currently enrolled for `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<AgentId> {
        let id = AgentId::derive(name);
        self.store.contains(&id).then_some(id)
    }

    /// Every enrolled agent, in unspecified order.
    pub fn records(&self) -> Vec<(AgentId, AgentRecord)> {
        self.store.snapshot()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Performative, Receiver};
    use serde_json::json;
    use std::collections::HashSet;

    fn msg(sender: &str, receiver: Receiver) -> Message {
        Message::new(
            Performative::Inform,
            AgentId::derive(sender),
            receiver,
            json!({"n": 1}),
        )
    }

    #[test]
    fn test_posted_ids_are_pairwise_distinct() {
        let mailbox = MessageService::new();
        let mut seen = HashSet::new();
        let mut previous = None;
        for _ in 0..100 {
            let id = mailbox.post(msg("a", Receiver::Broadcast));
            assert!(seen.insert(id));
            if let Some(prev) = previous {
                assert!(id > prev);
            }
            previous = Some(id);
        }
        assert_eq!(mailbox.len(), 100);
    }

    #[test]
    fn test_post_assigns_the_id_on_the_stored_copy() {
        let mailbox = MessageService::new();
        let id = mailbox.post(msg("a", Receiver::Broadcast));
        let stored = mailbox.search(&MessageQuery::any());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, Some(id));
    }

    #[test]
    fn test_withdraw_of_absent_id_is_a_noop() {
        let mailbox = MessageService::new();
        mailbox.post(msg("a", Receiver::Broadcast));
        mailbox.withdraw(MessageId(12345));
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_withdraw_removes_the_message() {
        let mailbox = MessageService::new();
        let id = mailbox.post(msg("a", Receiver::Broadcast));
        mailbox.withdraw(id);
        mailbox.withdraw(id);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_search_with_unmatched_receiver_is_empty() {
        let mailbox = MessageService::new();
        for name in ["x", "y", "z"] {
            mailbox.post(msg("a", Receiver::Agent(AgentId::derive(name))));
        }
        let query = MessageQuery::receiver(AgentId::derive("nobody").as_str()).unwrap();
        assert!(mailbox.search(&query).is_empty());
    }

    #[test]
    fn test_enroll_rejects_a_duplicate_name() {
        let directory = DirectoryService::new();
        let id = directory.enroll("worker").unwrap();
        let err = directory.enroll("worker").unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateIdentity { ref name, id: ref taken } if name == "worker" && *taken == id
        ));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_directory_remove_is_idempotent() {
        let directory = DirectoryService::new();
        let id = directory.enroll("worker").unwrap();
        directory.remove(&id);
        directory.remove(&id);
        assert!(directory.is_empty());
        // The freed name can be enrolled again.
        directory.enroll("worker").unwrap();
    }

    #[test]
    fn test_lookup_finds_enrolled_names_only() {
        let directory = DirectoryService::new();
        let id = directory.enroll("worker").unwrap();
        assert_eq!(directory.lookup("worker"), Some(id));
        assert_eq!(directory.lookup("ghost"), None);
    }
}
