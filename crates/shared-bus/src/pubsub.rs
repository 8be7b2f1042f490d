//! # Pub/Sub Server
//!
//! Generic in-memory publish/subscribe engine. Subscribers register a
//! [`Query`] under a client identity and receive every published message
//! whose tags satisfy it.
//!
//! ## Delivery
//!
//! Publishing never blocks. Each matching subscription is offered the
//! message with a non-blocking send; a subscription whose buffer is full is
//! cancelled with [`CancelReason::OutOfCapacity`] and removed, so one slow
//! consumer can never stall the publisher or its peers.
//!
//! ## Lifecycle
//!
//! The server must be started before it accepts subscriptions. Stopping it
//! flips the quit signal first and then cancels every live subscription
//! with [`CancelReason::Terminated`].

use crate::config::BusConfig;
use crate::query::Query;
use crate::subscriber::{CancelReason, Message, Subscription, SubscriptionSink, Tags};
use crate::MAX_SUBSCRIPTION_CAPACITY;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Errors from pub/sub operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The server is not running.
    #[error("event bus is not running")]
    NotRunning,

    /// `start` was called on a running server.
    #[error("event bus already started")]
    AlreadyStarted,

    /// The client already holds a subscription for this query.
    #[error("client {client} already subscribed to {query:?}")]
    AlreadySubscribed {
        /// Subscriber identity.
        client: String,
        /// Query string.
        query: String,
    },

    /// No matching subscription exists.
    #[error("subscription not found")]
    SubscriptionNotFound,

    /// The maximum number of subscribers has been reached.
    #[error("max subscription clients reached ({0})")]
    TooManyClients(usize),

    /// The client holds the maximum number of subscriptions.
    #[error("max subscriptions per client reached ({0})")]
    TooManySubscriptions(usize),

    /// Subscription buffers must hold between one and
    /// [`MAX_SUBSCRIPTION_CAPACITY`] messages.
    #[error("subscription capacity must be between 1 and {}", MAX_SUBSCRIPTION_CAPACITY)]
    InvalidCapacity,
}

struct Entry<T> {
    query: Query,
    sink: SubscriptionSink<T>,
}

/// In-memory publish/subscribe server.
pub struct PubSubServer<T> {
    /// client id -> query string -> subscription.
    subscriptions: RwLock<HashMap<String, HashMap<String, Entry<T>>>>,

    config: BusConfig,

    running: AtomicBool,

    /// Quit signal; flips to `true` once, on stop.
    quit: watch::Sender<bool>,

    /// Total messages published.
    messages_published: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> PubSubServer<T> {
    /// Create a stopped server with the given limits.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let (quit, _) = watch::channel(false);
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            config,
            running: AtomicBool::new(false),
            quit,
            messages_published: AtomicU64::new(0),
        }
    }

    /// Start accepting subscriptions and publishes.
    ///
    /// # Errors
    ///
    /// [`BusError::AlreadyStarted`] if the server is running or was stopped.
    pub fn start(&self) -> Result<(), BusError> {
        if *self.quit.borrow() {
            return Err(BusError::AlreadyStarted);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BusError::AlreadyStarted);
        }
        debug!("Event bus started");
        Ok(())
    }

    /// Stop the server and terminate every live subscription.
    ///
    /// Idempotent; a stopped server cannot be restarted.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.quit.send_replace(true);

        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        let mut cancelled = 0usize;
        for (_, subs) in drained {
            for (_, entry) in subs {
                entry.sink.cancel(CancelReason::Terminated);
                cancelled += 1;
            }
        }
        debug!(cancelled, "Event bus stopped");
    }

    /// Whether the server is accepting work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A receiver that observes `true` once the server stops.
    pub fn quit(&self) -> watch::Receiver<bool> {
        self.quit.subscribe()
    }

    /// Subscribe `client` to messages matching `query`.
    ///
    /// # Errors
    ///
    /// - [`BusError::NotRunning`] if the server is not started
    /// - [`BusError::InvalidCapacity`] if `capacity` is zero or above [`MAX_SUBSCRIPTION_CAPACITY`]
    /// - [`BusError::AlreadySubscribed`] for a duplicate client/query pair
    /// - [`BusError::TooManyClients`] / [`BusError::TooManySubscriptions`] on limits
    pub fn subscribe(
        &self,
        client: &str,
        query: Query,
        capacity: usize,
    ) -> Result<Subscription<T>, BusError> {
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        if capacity == 0 || capacity > MAX_SUBSCRIPTION_CAPACITY {
            return Err(BusError::InvalidCapacity);
        }

        let mut subs = self.subscriptions.write();
        // Re-check under the lock; stop drains the map after flipping `running`.
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        // Entries whose subscriber dropped its handle are vacant.
        reap_closed(&mut subs);

        match subs.get(client) {
            Some(client_subs) => {
                if client_subs.contains_key(query.as_str()) {
                    return Err(BusError::AlreadySubscribed {
                        client: client.to_string(),
                        query: query.to_string(),
                    });
                }
                if client_subs.len() >= self.config.max_subscriptions_per_client {
                    return Err(BusError::TooManySubscriptions(
                        self.config.max_subscriptions_per_client,
                    ));
                }
            }
            None if subs.len() >= self.config.max_clients => {
                return Err(BusError::TooManyClients(self.config.max_clients));
            }
            None => {}
        }

        let (sink, subscription) = Subscription::channel(capacity);
        debug!(client, query = %query, capacity, "New subscription created");
        subs.entry(client.to_string())
            .or_default()
            .insert(query.to_string(), Entry { query, sink });

        Ok(subscription)
    }

    /// Remove the subscription of `client` for `query`.
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriptionNotFound`] if there is no such subscription.
    pub fn unsubscribe(&self, client: &str, query: &Query) -> Result<(), BusError> {
        self.remove(client, query, CancelReason::Unsubscribed)
    }

    /// Remove every subscription held by `client`.
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriptionNotFound`] if the client holds none.
    pub fn unsubscribe_all(&self, client: &str) -> Result<(), BusError> {
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        let removed = self
            .subscriptions
            .write()
            .remove(client)
            .ok_or(BusError::SubscriptionNotFound)?;

        for (_, entry) in &removed {
            entry.sink.cancel(CancelReason::Unsubscribed);
        }
        debug!(client, count = removed.len(), "Removed all subscriptions");
        Ok(())
    }

    /// Forcibly remove a subscription, e.g. a misbehaving client.
    ///
    /// The subscriber observes [`CancelReason::Evicted`].
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriptionNotFound`] if there is no such subscription.
    pub fn evict(&self, client: &str, query: &Query) -> Result<(), BusError> {
        self.remove(client, query, CancelReason::Evicted)
    }

    fn remove(&self, client: &str, query: &Query, reason: CancelReason) -> Result<(), BusError> {
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        let entry = {
            let mut subs = self.subscriptions.write();
            let client_subs = subs
                .get_mut(client)
                .ok_or(BusError::SubscriptionNotFound)?;
            let entry = client_subs
                .remove(query.as_str())
                .ok_or(BusError::SubscriptionNotFound)?;
            if client_subs.is_empty() {
                subs.remove(client);
            }
            entry
        };

        entry.sink.cancel(reason);
        debug!(client, query = %query, reason = %reason, "Subscription removed");
        Ok(())
    }

    /// Publish `data` with `tags` to every matching subscription.
    ///
    /// # Returns
    ///
    /// The number of subscriptions the message was delivered to.
    pub fn publish_with_tags(&self, data: T, tags: Tags) -> usize {
        if !self.is_running() {
            warn!("Publish on stopped event bus ignored");
            return 0;
        }
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0usize;
        let mut overflowed = Vec::new();
        let mut closed = Vec::new();
        {
            let subs = self.subscriptions.read();
            for (client, client_subs) in subs.iter() {
                for (key, entry) in client_subs {
                    if !entry.query.matches(&tags) {
                        continue;
                    }
                    let msg = Message::new(data.clone(), tags.clone());
                    match entry.sink.sender().try_send(msg) {
                        Ok(()) => delivered += 1,
                        Err(TrySendError::Full(_)) => overflowed.push((client.clone(), key.clone())),
                        Err(TrySendError::Closed(_)) => closed.push((client.clone(), key.clone())),
                    }
                }
            }
        }

        if !overflowed.is_empty() || !closed.is_empty() {
            let mut subs = self.subscriptions.write();
            for (client, key) in overflowed {
                if let Some(entry) = take_entry(&mut subs, &client, &key) {
                    warn!(client = %client, query = %key, "Subscription out of capacity, cancelling");
                    entry.sink.cancel(CancelReason::OutOfCapacity);
                }
            }
            for (client, key) in closed {
                if take_entry(&mut subs, &client, &key).is_some() {
                    debug!(client = %client, query = %key, "Reaped dropped subscription");
                }
            }
        }

        delivered
    }

    /// Number of distinct subscribers.
    pub fn num_clients(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Number of subscriptions held by `client`.
    pub fn num_client_subscriptions(&self, client: &str) -> usize {
        self.subscriptions
            .read()
            .get(client)
            .map_or(0, HashMap::len)
    }

    /// Total messages published since creation.
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Configured limits.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

fn reap_closed<T>(subs: &mut HashMap<String, HashMap<String, Entry<T>>>) {
    subs.retain(|client, client_subs| {
        client_subs.retain(|key, entry| {
            let open = !entry.sink.sender().is_closed();
            if !open {
                debug!(client = %client, query = %key, "Reaped dropped subscription");
            }
            open
        });
        !client_subs.is_empty()
    });
}

fn take_entry<T>(
    subs: &mut HashMap<String, HashMap<String, Entry<T>>>,
    client: &str,
    key: &str,
) -> Option<Entry<T>> {
    let client_subs = subs.get_mut(client)?;
    let entry = client_subs.remove(key)?;
    if client_subs.is_empty() {
        subs.remove(client);
    }
    Some(entry)
}
