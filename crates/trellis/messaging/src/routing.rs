//! Shared routing table of the in-memory transport
//!
//! Holds, per owner id, the subscribed contexts and the queue messages are
//! delivered to. Both maps live behind one lock so renaming an owner moves
//! its subscriptions and its handler together.

use crate::context::MessagingContext;
use crate::messages::Message;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Queue a routed message is delivered to
pub type RoutedQueue = mpsc::Sender<Message>;

#[derive(Default)]
struct RoutingTable {
    subscriptions: HashMap<String, HashSet<MessagingContext>>,
    handlers: HashMap<String, RoutedQueue>,
}

/// Routing table shared by every in-memory client of a process
#[derive(Default)]
pub struct RoutingContext {
    table: RwLock<RoutingTable>,
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the queue messages for `owner_id` are delivered to.
    pub fn register(&self, owner_id: &str, queue: RoutedQueue) {
        self.table
            .write()
            .handlers
            .insert(owner_id.to_string(), queue);
        debug!(owner = owner_id, "Message handler registered");
    }

    /// Forget an owner: its handler and all of its subscriptions.
    pub fn unregister(&self, owner_id: &str) {
        let mut table = self.table.write();
        table.handlers.remove(owner_id);
        table.subscriptions.remove(owner_id);
        debug!(owner = owner_id, "Owner unregistered");
    }

    /// Returns `true` if the subscription is new.
    pub fn subscribe(&self, owner_id: &str, ctx: MessagingContext) -> bool {
        self.table
            .write()
            .subscriptions
            .entry(owner_id.to_string())
            .or_default()
            .insert(ctx)
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, owner_id: &str, ctx: &MessagingContext) -> bool {
        let mut table = self.table.write();
        let Some(contexts) = table.subscriptions.get_mut(owner_id) else {
            return false;
        };
        let removed = contexts.remove(ctx);
        if contexts.is_empty() {
            table.subscriptions.remove(owner_id);
        }
        removed
    }

    /// Contexts `owner_id` is subscribed to.
    pub fn subscriptions(&self, owner_id: &str) -> HashSet<MessagingContext> {
        self.table
            .read()
            .subscriptions
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_handler(&self, owner_id: &str) -> bool {
        self.table.read().handlers.contains_key(owner_id)
    }

    pub fn owner_ids(&self) -> Vec<String> {
        let table = self.table.read();
        let mut ids: Vec<String> = table
            .subscriptions
            .keys()
            .chain(table.handlers.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Move everything registered under `old_id` to `new_id`.
    ///
    /// Subscriptions already held by `new_id` are kept. The rename is
    /// refused, and `false` returned, when another owner already has a
    /// handler registered under `new_id`.
    pub fn rename_owner(&self, old_id: &str, new_id: &str) -> bool {
        if old_id == new_id {
            return true;
        }
        let mut table = self.table.write();
        if table.handlers.contains_key(new_id) {
            warn!(from = old_id, to = new_id, "Owner id already taken, rename refused");
            return false;
        }
        if let Some(contexts) = table.subscriptions.remove(old_id) {
            table
                .subscriptions
                .entry(new_id.to_string())
                .or_default()
                .extend(contexts);
        }
        if let Some(queue) = table.handlers.remove(old_id) {
            table.handlers.insert(new_id.to_string(), queue);
        }
        debug!(from = old_id, to = new_id, "Owner renamed");
        true
    }

    /// Drop every subscription to a context of `application_name`.
    ///
    /// Returns the number of subscriptions removed.
    pub fn remove_application(&self, application_name: &str) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;
        for contexts in table.subscriptions.values_mut() {
            let before = contexts.len();
            contexts.retain(|ctx| ctx.application_name() != Some(application_name));
            removed += before - contexts.len();
        }
        table.subscriptions.retain(|_, contexts| !contexts.is_empty());
        removed
    }

    /// Deliver `message` to every owner subscribed to `ctx`.
    ///
    /// Queues are collected under the read lock and fed after it is
    /// released. Returns the number of owners that accepted the message.
    pub fn route(&self, ctx: &MessagingContext, message: &Message) -> usize {
        let receivers: Vec<(String, RoutedQueue)> = {
            let table = self.table.read();
            table
                .subscriptions
                .iter()
                .filter(|(_, contexts)| contexts.contains(ctx))
                .filter_map(|(owner, _)| {
                    table
                        .handlers
                        .get(owner)
                        .map(|queue| (owner.clone(), queue.clone()))
                })
                .collect()
        };

        let mut delivered = 0;
        for (owner, queue) in receivers {
            match queue.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(owner = %owner, topic = %ctx, "Owner queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(owner = %owner, "Owner queue closed");
                }
            }
        }
        delivered
    }
}
