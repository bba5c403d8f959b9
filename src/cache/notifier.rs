//! Change Notifier Module
//!
//! Publish/subscribe registry keyed by subscription id. The engine is the
//! only publisher; every subscriber gets its own unbounded channel.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::error::{CacheError, Result};

pub type SubscriptionId = u64;

// == Change Action ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Set,
    Remove,
    Clear,
    Expire,
}

// == Change Event ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Logical key
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub action: ChangeAction,
    /// Unix milliseconds
    pub timestamp: u64,
}

/// Item delivered by key-set and pattern subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyChange {
    pub key: String,
    pub value: Option<Value>,
}

// == Subscription ==
/// Receiving end of one subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next item; None once the subscription is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Next already-delivered item, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Every item delivered so far.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.try_recv() {
            items.push(item);
        }
        items
    }

    /// True once the publisher side is gone and nothing is buffered.
    pub fn is_closed(&mut self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

// == Filters and Sinks ==
#[derive(Debug)]
enum KeyFilter {
    Any,
    Exact(String),
    OneOf(HashSet<String>),
    Pattern(Regex),
}

impl KeyFilter {
    fn matches(&self, key: &str) -> bool {
        match self {
            KeyFilter::Any => true,
            KeyFilter::Exact(k) => k == key,
            KeyFilter::OneOf(keys) => keys.contains(key),
            KeyFilter::Pattern(re) => re.is_match(key),
        }
    }
}

#[derive(Debug)]
enum Sink {
    Events(UnboundedSender<ChangeEvent>),
    Changes(UnboundedSender<KeyChange>),
    /// Collapses consecutive identical values
    Values {
        tx: UnboundedSender<Option<Value>>,
        last: Option<Value>,
    },
}

impl Sink {
    /// Returns false when the receiver has been dropped.
    fn deliver(&mut self, event: &ChangeEvent) -> bool {
        match self {
            Sink::Events(tx) => tx.send(event.clone()).is_ok(),
            Sink::Changes(tx) => tx
                .send(KeyChange {
                    key: event.key.clone(),
                    value: event.new_value.clone(),
                })
                .is_ok(),
            Sink::Values { tx, last } => {
                if *last == event.new_value {
                    return !tx.is_closed();
                }
                *last = event.new_value.clone();
                tx.send(event.new_value.clone()).is_ok()
            }
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    filter: KeyFilter,
    sink: Sink,
}

// == Change Notifier ==
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event.
    pub fn subscribe_all(&mut self) -> Subscription<ChangeEvent> {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.register(KeyFilter::Any, Sink::Events(tx));
        Subscription { id, receiver }
    }

    /// Values of one key, starting with `current`.
    pub fn subscribe_key(
        &mut self,
        key: String,
        current: Option<Value>,
    ) -> Subscription<Option<Value>> {
        let (tx, receiver) = mpsc::unbounded_channel();
        // Receiver is alive, send cannot fail
        let _ = tx.send(current.clone());
        let id = self.register(KeyFilter::Exact(key), Sink::Values { tx, last: current });
        Subscription { id, receiver }
    }

    /// Changes to any key in `keys`.
    pub fn subscribe_keys(&mut self, keys: HashSet<String>) -> Subscription<KeyChange> {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.register(KeyFilter::OneOf(keys), Sink::Changes(tx));
        Subscription { id, receiver }
    }

    /// Changes to keys matching a `*` wildcard pattern.
    pub fn subscribe_pattern(&mut self, pattern: &str) -> Result<Subscription<KeyChange>> {
        let regex = compile_pattern(pattern)?;
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.register(KeyFilter::Pattern(regex), Sink::Changes(tx));
        Ok(Subscription { id, receiver })
    }

    // == Publish ==
    /// Delivers `event` to every matching subscriber and prunes closed ones.
    ///
    /// Returns the number of subscribers that matched.
    pub fn publish(&mut self, event: &ChangeEvent) -> usize {
        let mut matched = 0;
        let mut closed = Vec::new();

        for (id, subscriber) in self.subscribers.iter_mut() {
            if !subscriber.filter.matches(&event.key) {
                continue;
            }
            matched += 1;
            if !subscriber.sink.deliver(event) {
                closed.push(*id);
            }
        }

        for id in closed {
            self.subscribers.remove(&id);
        }
        matched
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Ends every subscription; receivers drain what is buffered, then close.
    pub fn close_all(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn register(&mut self, filter: KeyFilter, sink: Sink) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, Subscriber { filter, sink });
        id
    }
}

/// Compiles a wildcard pattern: `*` matches any run of characters, everything
/// else matches literally, anywhere in the key.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    let source = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&source).map_err(|e| CacheError::Internal(format!("bad pattern {:?}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(key: &str, new_value: Option<Value>, action: ChangeAction) -> ChangeEvent {
        ChangeEvent {
            key: key.to_string(),
            old_value: None,
            new_value,
            action,
            timestamp: 0,
        }
    }

    #[test]
    fn test_subscribe_all_receives_everything() {
        let mut notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe_all();

        notifier.publish(&event("a", Some(json!(1)), ChangeAction::Set));
        notifier.publish(&event("b", None, ChangeAction::Remove));

        let events = sub.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key, "a");
        assert_eq!(events[1].action, ChangeAction::Remove);
    }

    #[test]
    fn test_key_subscription_replays_and_dedupes() {
        let mut notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe_key("k".to_string(), None);

        notifier.publish(&event("k", Some(json!(1)), ChangeAction::Set));
        notifier.publish(&event("k", Some(json!(1)), ChangeAction::Set));
        notifier.publish(&event("other", Some(json!(9)), ChangeAction::Set));
        notifier.publish(&event("k", None, ChangeAction::Remove));
        notifier.publish(&event("k", None, ChangeAction::Remove));

        assert_eq!(sub.drain(), vec![None, Some(json!(1)), None]);
    }

    #[test]
    fn test_keys_subscription_filters() {
        let mut notifier = ChangeNotifier::new();
        let keys = ["a".to_string(), "c".to_string()].into_iter().collect();
        let mut sub = notifier.subscribe_keys(keys);

        for key in ["a", "b", "c"] {
            notifier.publish(&event(key, Some(json!(key)), ChangeAction::Set));
        }

        let seen: Vec<String> = sub.drain().into_iter().map(|c| c.key).collect();
        assert_eq!(seen, vec!["a", "c"]);
    }

    #[test]
    fn test_pattern_subscription() {
        let mut notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe_pattern("user.*").unwrap();

        notifier.publish(&event("user.1", Some(json!(1)), ChangeAction::Set));
        notifier.publish(&event("userx1", Some(json!(2)), ChangeAction::Set));
        notifier.publish(&event("session", Some(json!(3)), ChangeAction::Set));

        let seen: Vec<String> = sub.drain().into_iter().map(|c| c.key).collect();
        assert_eq!(seen, vec!["user.1"]);
    }

    #[test]
    fn test_compile_pattern_is_unanchored() {
        let re = compile_pattern("cart*").unwrap();
        assert!(re.is_match("cart"));
        assert!(re.is_match("my-cart-items"));
        assert!(!re.is_match("car"));

        let re = compile_pattern("a*z").unwrap();
        assert!(re.is_match("abcz"));
        assert!(!re.is_match("za"));
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let mut notifier = ChangeNotifier::new();
        let sub = notifier.subscribe_all();
        let _kept = notifier.subscribe_all();
        drop(sub);

        notifier.publish(&event("a", None, ChangeAction::Clear));
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_and_close_all() {
        let mut notifier = ChangeNotifier::new();
        let first = notifier.subscribe_all();
        let mut second = notifier.subscribe_all();

        assert!(notifier.unsubscribe(first.id()));
        assert!(!notifier.unsubscribe(first.id()));

        notifier.close_all();
        assert_eq!(notifier.subscriber_count(), 0);
        assert!(second.is_closed());
    }
}
