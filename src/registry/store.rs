//! Subscriber registry
//!
//! Keeps the subscribers of one service keyed by a stable, monotonically
//! increasing id, so iteration follows registration order and removal never
//! depends on pointer identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::subscriber::{Subscriber, SubscriberId};

/// Registered subscribers of one service
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: BTreeMap<SubscriberId, Arc<Subscriber>>,
    next_id: u64,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for the next subscriber
    pub fn allocate_id(&mut self) -> SubscriberId {
        self.next_id += 1;
        SubscriberId::new(self.next_id)
    }

    /// Add a subscriber
    pub fn insert(&mut self, subscriber: Arc<Subscriber>) {
        self.subscribers.insert(subscriber.id(), subscriber);
    }

    /// Remove a subscriber by id
    pub fn remove(&mut self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.remove(&id)
    }

    /// Look up a subscriber by id
    pub fn get(&self, id: SubscriberId) -> Option<&Arc<Subscriber>> {
        self.subscribers.get(&id)
    }

    /// All subscribers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Subscriber>> {
        self.subscribers.values()
    }

    /// Live subscribers that have not terminated, in registration order
    pub fn live(&self) -> impl Iterator<Item = &Arc<Subscriber>> {
        self.iter().filter(|s| s.is_live() && !s.is_terminated())
    }

    /// Catch-up subscribers that have not terminated, in registration order
    pub fn catching_up(&self) -> impl Iterator<Item = &Arc<Subscriber>> {
        self.iter().filter(|s| !s.is_live() && !s.is_terminated())
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if no subscribers are registered
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Cancel every registered subscriber
    ///
    /// Returns the number of subscribers cancelled.
    pub fn cancel_all(&self) -> usize {
        for subscriber in self.subscribers.values() {
            subscriber.cancel();
        }
        self.subscribers.len()
    }

    /// Drop subscribers that already terminated
    ///
    /// Returns the ids removed.
    pub fn remove_terminated(&mut self) -> Vec<SubscriberId> {
        let terminated: Vec<SubscriberId> = self
            .subscribers
            .values()
            .filter(|s| s.is_terminated())
            .map(|s| s.id())
            .collect();

        for id in &terminated {
            self.subscribers.remove(id);
        }

        terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(registry: &mut SubscriberRegistry) -> Arc<Subscriber> {
        let (client, _server) = tokio::io::duplex(64);
        let sub = Arc::new(Subscriber::live(registry.allocate_id(), Box::new(client)));
        registry.insert(Arc::clone(&sub));
        sub
    }

    fn catch_up(registry: &mut SubscriberRegistry, offset: u64) -> Arc<Subscriber> {
        let (client, _server) = tokio::io::duplex(64);
        let sub = Arc::new(Subscriber::catch_up(
            registry.allocate_id(),
            Box::new(client),
            offset,
        ));
        registry.insert(Arc::clone(&sub));
        sub
    }

    #[test]
    fn test_registration_order() {
        let mut registry = SubscriberRegistry::new();
        let a = live(&mut registry);
        let b = catch_up(&mut registry, 0);
        let c = live(&mut registry);

        let ids: Vec<_> = registry.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);

        let live_ids: Vec<_> = registry.live().map(|s| s.id()).collect();
        assert_eq!(live_ids, vec![a.id(), c.id()]);

        let catch_up_ids: Vec<_> = registry.catching_up().map(|s| s.id()).collect();
        assert_eq!(catch_up_ids, vec![b.id()]);
    }

    #[test]
    fn test_remove() {
        let mut registry = SubscriberRegistry::new();
        let a = live(&mut registry);
        let b = live(&mut registry);

        assert!(registry.remove(a.id()).is_some());
        assert!(registry.remove(a.id()).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(b.id()).is_some());

        registry.remove(b.id());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_not_reused() {
        let mut registry = SubscriberRegistry::new();
        let a = live(&mut registry);
        registry.remove(a.id());
        let b = live(&mut registry);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_cancel_all_and_prune() {
        let mut registry = SubscriberRegistry::new();
        let a = live(&mut registry);
        let b = catch_up(&mut registry, 10);

        assert_eq!(registry.cancel_all(), 2);
        assert!(a.is_terminated());
        assert!(b.is_terminated());
        assert_eq!(registry.live().count(), 0);

        let removed = registry.remove_terminated();
        assert_eq!(removed, vec![a.id(), b.id()]);
        assert!(registry.is_empty());
    }
}
