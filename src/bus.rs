//! In-process change notification bus.
//!
//! Every store publishes on its channel after a successful write
//! ([`Origin::Local`]). The storage watcher publishes on the same channels
//! when it picks up a write made by another process ([`Origin::External`]).
//! Consumers therefore subscribe once per channel and see both paths.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Written by a store in this process.
    Local,
    /// Written by another process and picked up by the watcher.
    External,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Channel name, e.g. `"internshipsChanged"`.
    pub channel: String,
    /// Which delivery path produced the notice.
    pub origin: Origin,
}

/// Returned by [`ChangeBus::subscribe`]; pass to [`ChangeBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(&ChangeNotice) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_token: u64,
    channels: HashMap<String, Vec<(SubscriptionToken, Handler)>>,
}

/// Publish/subscribe registry keyed by channel name.
///
/// Delivery is synchronous: [`publish`](ChangeBus::publish) returns after
/// every handler has run. Handlers may subscribe or unsubscribe from inside
/// a callback; the change applies from the next publish on.
///
/// `Clone` is cheap and clones share the same registry.
#[derive(Clone, Default)]
pub struct ChangeBus {
    registry: Arc<RwLock<Registry>>,
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ChangeBus")
            .field("channels", &registry.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every notice published on `channel`.
    pub fn subscribe<F>(&self, channel: &str, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChangeNotice) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let token = SubscriptionToken(registry.next_token);
        registry.next_token += 1;
        registry
            .channels
            .entry(channel.to_owned())
            .or_default()
            .push((token, Arc::new(handler)));
        token
    }

    /// Remove a subscription.
    ///
    /// # Returns
    ///
    /// `true` if the token was registered, `false` if it was already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        for handlers in registry.channels.values_mut() {
            if let Some(pos) = handlers.iter().position(|(t, _)| *t == token) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver a notice to every subscriber of `channel`.
    ///
    /// # Returns
    ///
    /// The number of handlers invoked.
    pub fn publish(&self, channel: &str, origin: Origin) -> usize {
        // Snapshot the handlers so callbacks can touch the registry.
        let handlers: Vec<Handler> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .channels
                .get(channel)
                .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        let notice = ChangeNotice {
            channel: channel.to_owned(),
            origin,
        };
        for handler in &handlers {
            handler(&notice);
        }
        tracing::debug!(channel, ?origin, delivered = handlers.len(), "published");
        handlers.len()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.channels.get(channel).map_or(0, Vec::len)
    }
}
