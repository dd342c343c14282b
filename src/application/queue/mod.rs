//! Action message queue
//!
//! Outstanding central-system requests, kept per client until the matching
//! CallResult / CallError arrives, the request times out, or the client's
//! queue is discarded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{Action, ClientIdentity};

/// Why a pending request did not produce a result payload
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("Charge point not connected: {0}")]
    NotConnected(String),

    #[error("Failed to send: {0}")]
    SendFailed(String),

    #[error("Response timeout")]
    Timeout,

    #[error("CallError {code}: {description}")]
    CallError {
        code: String,
        description: String,
        details: Value,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request discarded")]
    Discarded,
}

pub type ReplySender = oneshot::Sender<Result<Value, RequestError>>;
pub type ReplyReceiver = oneshot::Receiver<Result<Value, RequestError>>;

/// A request sent to a charge point and not yet answered
#[derive(Debug)]
pub struct PendingActionMessage {
    pub client: ClientIdentity,
    pub message_id: String,
    pub action: Action,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
    reply: Option<ReplySender>,
}

impl PendingActionMessage {
    pub fn new(
        client: ClientIdentity,
        message_id: impl Into<String>,
        action: Action,
        payload: Value,
    ) -> Self {
        Self {
            client,
            message_id: message_id.into(),
            action,
            payload,
            sent_at: Utc::now(),
            reply: None,
        }
    }

    /// Attach a reply continuation, returning its receiving half.
    pub fn awaiting_reply(mut self) -> (Self, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        (self, rx)
    }

    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Complete the continuation. Returns `false` when there is none or the
    /// waiting side has gone away.
    pub fn complete(mut self, outcome: Result<Value, RequestError>) -> bool {
        match self.reply.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.sent_at).to_std().unwrap_or_default()
    }
}

/// Live, independently lockable queue of one client
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    inner: Arc<Mutex<VecDeque<PendingActionMessage>>>,
}

impl PendingQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingActionMessage>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn push_back(&self, message: PendingActionMessage) {
        self.lock().push_back(message);
    }

    pub fn pop_front(&self) -> Option<PendingActionMessage> {
        self.lock().pop_front()
    }

    pub fn remove_by_id(&self, message_id: &str) -> Option<PendingActionMessage> {
        let mut queue = self.lock();
        let index = queue.iter().position(|m| m.message_id == message_id)?;
        queue.remove(index)
    }

    /// Message ids in queue order
    pub fn message_ids(&self) -> Vec<String> {
        self.lock().iter().map(|m| m.message_id.clone()).collect()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.lock().iter().any(|m| m.message_id == message_id)
    }

    fn drain_where<F>(&self, mut predicate: F) -> Vec<PendingActionMessage>
    where
        F: FnMut(&PendingActionMessage) -> bool,
    {
        let mut queue = self.lock();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        for message in queue.drain(..) {
            if predicate(&message) {
                removed.push(message);
            } else {
                kept.push_back(message);
            }
        }
        *queue = kept;
        removed
    }
}

/// Per-client queues of outstanding requests
#[derive(Debug, Default)]
pub struct ActionMessageQueue {
    queues: DashMap<ClientIdentity, PendingQueue>,
}

pub type SharedActionMessageQueue = Arc<ActionMessageQueue>;

impl ActionMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedActionMessageQueue {
        Arc::new(Self::new())
    }

    pub fn add_pending_message(&self, message: PendingActionMessage) {
        self.add_pending_message_with(message, |_| ());
    }

    /// Append `message`, then run `consumer` on the updated queue before the
    /// queue lock is released.
    pub fn add_pending_message_with<F, R>(&self, message: PendingActionMessage, consumer: F) -> R
    where
        F: FnOnce(&VecDeque<PendingActionMessage>) -> R,
    {
        debug!(
            charge_point_id = message.client.charge_point_id(),
            message_id = message.message_id.as_str(),
            action = message.action.name(),
            "Queued pending message"
        );
        let queue = self.pending_message_queue(&message.client);
        let mut guard = queue.lock();
        guard.push_back(message);
        consumer(&guard)
    }

    /// The client's live queue, created empty if absent.
    pub fn pending_message_queue(&self, client: &ClientIdentity) -> PendingQueue {
        self.queues.entry(client.clone()).or_default().clone()
    }

    pub fn poll_pending_message(&self, client: &ClientIdentity) -> Option<PendingActionMessage> {
        let queue = self.queues.get(client)?.clone();
        queue.pop_front()
    }

    pub fn poll_pending_message_by_id(
        &self,
        client: &ClientIdentity,
        message_id: &str,
    ) -> Option<PendingActionMessage> {
        let queue = self.queues.get(client)?.clone();
        queue.remove_by_id(message_id)
    }

    /// Snapshot of the known clients with their live queues
    pub fn all_queues(&self) -> Vec<(ClientIdentity, PendingQueue)> {
        self.queues
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Remove every pending message older than `max_age`.
    pub fn purge_expired(&self, max_age: Duration) -> Vec<PendingActionMessage> {
        self.purge_expired_at(Utc::now(), max_age)
    }

    fn purge_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<PendingActionMessage> {
        self.all_queues()
            .into_iter()
            .flat_map(|(_, queue)| queue.drain_where(|m| m.age(now) > max_age))
            .collect()
    }

    /// Drain every pending message of `client`; the (empty) queue stays.
    pub fn discard_client(&self, client: &ClientIdentity) -> Vec<PendingActionMessage> {
        match self.queues.get(client).map(|q| q.clone()) {
            Some(queue) => queue.drain_where(|_| true),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(client: &ClientIdentity, id: &str) -> PendingActionMessage {
        PendingActionMessage::new(client.clone(), id, Action::Reset, json!({"type": "Soft"}))
    }

    #[test]
    fn test_first_access_creates_empty_queue() {
        let table = ActionMessageQueue::new();
        let client = ClientIdentity::v16("CP001");
        assert!(table.all_queues().is_empty());

        let queue = table.pending_message_queue(&client);
        assert!(queue.is_empty());
        assert_eq!(table.all_queues().len(), 1);
    }

    #[test]
    fn test_poll_never_creates_entries() {
        let table = ActionMessageQueue::new();
        let client = ClientIdentity::v16("CP001");
        assert!(table.poll_pending_message(&client).is_none());
        assert!(table.poll_pending_message_by_id(&client, "1").is_none());
        assert!(table.discard_client(&client).is_empty());
        assert!(table.all_queues().is_empty());
    }

    #[test]
    fn test_head_poll_is_fifo() {
        let table = ActionMessageQueue::new();
        let client = ClientIdentity::v16("CP001");
        for id in ["1", "2", "3"] {
            table.add_pending_message(message(&client, id));
        }

        let polled: Vec<String> = std::iter::from_fn(|| table.poll_pending_message(&client))
            .map(|m| m.message_id)
            .collect();
        assert_eq!(polled, vec!["1", "2", "3"]);

        // the emptied queue is kept
        assert_eq!(table.all_queues().len(), 1);
        assert!(table.pending_message_queue(&client).is_empty());
    }

    #[test]
    fn test_poll_by_id_removes_exactly_one() {
        let table = ActionMessageQueue::new();
        let client = ClientIdentity::v201("CP001");
        for id in ["a", "b", "c"] {
            table.add_pending_message(message(&client, id));
        }

        let hit = table.poll_pending_message_by_id(&client, "b").unwrap();
        assert_eq!(hit.message_id, "b");
        let queue = table.pending_message_queue(&client);
        assert_eq!(queue.message_ids(), vec!["a", "c"]);

        assert!(table.poll_pending_message_by_id(&client, "zzz").is_none());
        assert_eq!(queue.message_ids(), vec!["a", "c"]);
    }

    #[test]
    fn test_distinct_clients_get_distinct_queues() {
        let table = ActionMessageQueue::new();
        let v16 = ClientIdentity::v16("CP001");
        let v201 = ClientIdentity::v201("CP001");
        table.add_pending_message(message(&v16, "1"));

        assert_eq!(table.pending_message_queue(&v16).len(), 1);
        assert!(table.pending_message_queue(&v201).is_empty());
        assert!(table.poll_pending_message_by_id(&v201, "1").is_none());
    }

    #[test]
    fn test_all_queues_lists_each_client_once() {
        let table = ActionMessageQueue::new();
        let a = ClientIdentity::v16("A");
        let b = ClientIdentity::v16("B");
        table.add_pending_message(message(&a, "a-1"));
        table.add_pending_message(message(&b, "b-1"));

        let mut queues: Vec<(String, Vec<String>)> = table
            .all_queues()
            .into_iter()
            .map(|(client, queue)| (client.charge_point_id().to_string(), queue.message_ids()))
            .collect();
        queues.sort();
        assert_eq!(
            queues,
            vec![
                ("A".to_string(), vec!["a-1".to_string()]),
                ("B".to_string(), vec!["b-1".to_string()]),
            ]
        );
    }

    #[test]
    fn test_add_with_consumer_sees_updated_queue() {
        let table = ActionMessageQueue::new();
        let client = ClientIdentity::v16("CP001");
        table.add_pending_message(message(&client, "1"));

        let seen = table.add_pending_message_with(message(&client, "2"), |queue| {
            queue.iter().map(|m| m.message_id.clone()).collect::<Vec<_>>()
        });
        assert_eq!(seen, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_reply_continuation() {
        let client = ClientIdentity::v16("CP001");
        let (pending, rx) = message(&client, "1").awaiting_reply();
        assert!(pending.has_reply());
        assert!(pending.complete(Ok(json!({"status": "Accepted"}))));
        assert_eq!(rx.await.unwrap().unwrap()["status"], "Accepted");

        let (pending, rx) = message(&client, "2").awaiting_reply();
        drop(rx);
        assert!(!pending.complete(Err(RequestError::Timeout)));
        assert!(!message(&client, "3").complete(Err(RequestError::Timeout)));
    }

    #[test]
    fn test_purge_expired() {
        let table = ActionMessageQueue::new();
        let a = ClientIdentity::v16("A");
        let b = ClientIdentity::v201("B");
        table.add_pending_message(message(&a, "1"));
        table.add_pending_message(message(&b, "2"));

        let now = Utc::now();
        assert!(table.purge_expired_at(now, Duration::from_secs(30)).is_empty());

        let later = now + chrono::Duration::seconds(60);
        let mut purged: Vec<String> = table
            .purge_expired_at(later, Duration::from_secs(30))
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        purged.sort();
        assert_eq!(purged, vec!["1", "2"]);
        assert!(table.pending_message_queue(&a).is_empty());
        assert_eq!(table.all_queues().len(), 2);
    }

    #[test]
    fn test_discard_client() {
        let table = ActionMessageQueue::new();
        let client = ClientIdentity::v16("CP001");
        table.add_pending_message(message(&client, "1"));
        table.add_pending_message(message(&client, "2"));

        assert_eq!(table.discard_client(&client).len(), 2);
        assert!(table.pending_message_queue(&client).is_empty());
    }

    #[test]
    fn test_concurrent_appends() {
        let table = Arc::new(ActionMessageQueue::new());
        let client = ClientIdentity::v16("CP001");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let table = table.clone();
                let client = client.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        table.add_pending_message(message(&client, &format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.pending_message_queue(&client).len(), 400);
    }
}
