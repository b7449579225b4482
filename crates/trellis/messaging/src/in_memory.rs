//! In-process transport backed by a shared [`RoutingContext`]

use crate::client::{MessagingClient, OwnerProperties, PublishMode};
use crate::context::MessagingContext;
use crate::error::Result;
use crate::messages::Message;
use crate::routing::{RoutedQueue, RoutingContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub const IN_MEMORY_TYPE: &str = "in-memory";

/// A client of the in-memory transport
pub struct InMemoryClient {
    routing: Arc<RoutingContext>,
    queue: RoutedQueue,
    owner_id: Mutex<String>,
    connected: AtomicBool,
    connection_required: bool,
    undelivered: AtomicU64,
}

impl InMemoryClient {
    /// Create a client delivering to `queue`.
    ///
    /// The queue is registered right away under `owner`.
    pub fn new(
        routing: Arc<RoutingContext>,
        queue: RoutedQueue,
        owner: OwnerProperties,
        connection_required: bool,
    ) -> Self {
        let owner_id = owner.owner_id();
        routing.register(&owner_id, queue.clone());
        Self {
            routing,
            queue,
            owner_id: Mutex::new(owner_id),
            connected: AtomicBool::new(false),
            connection_required,
            undelivered: AtomicU64::new(0),
        }
    }

    pub fn owner_id(&self) -> String {
        self.owner_id.lock().clone()
    }

    /// Mandatory messages that reached no receiver.
    pub fn undelivered_mandatory(&self) -> u64 {
        self.undelivered.load(Ordering::Relaxed)
    }

    fn can_proceed(&self) -> bool {
        !self.connection_required || self.is_connected()
    }
}

#[async_trait]
impl MessagingClient for InMemoryClient {
    fn messaging_type(&self) -> &str {
        IN_MEMORY_TYPE
    }

    // Owner-keyed routing calls run under the owner lock.

    async fn open_connection(&self) -> Result<()> {
        let owner_id = self.owner_id.lock();
        self.routing.register(&owner_id, self.queue.clone());
        self.connected.store(true, Ordering::SeqCst);
        debug!(owner = %*owner_id, "Connection opened");
        Ok(())
    }

    async fn close_connection(&self) -> Result<()> {
        let owner_id = self.owner_id.lock();
        self.connected.store(false, Ordering::SeqCst);
        self.routing.unregister(&owner_id);
        debug!(owner = %*owner_id, "Connection closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_owner_properties(&self, owner: OwnerProperties) {
        let new_id = owner.owner_id();
        let mut current = self.owner_id.lock();
        if *current != new_id && self.routing.rename_owner(&current, &new_id) {
            *current = new_id;
        }
    }

    async fn subscribe(&self, ctx: &MessagingContext) -> Result<()> {
        if !self.can_proceed() {
            debug!(topic = %ctx, "Not connected, subscription skipped");
            return Ok(());
        }
        let owner_id = self.owner_id.lock();
        if self.routing.subscribe(&owner_id, ctx.clone()) {
            debug!(owner = %*owner_id, topic = %ctx, "Subscribed");
        }
        Ok(())
    }

    async fn unsubscribe(&self, ctx: &MessagingContext) -> Result<()> {
        if !self.can_proceed() {
            debug!(topic = %ctx, "Not connected, unsubscription skipped");
            return Ok(());
        }
        let owner_id = self.owner_id.lock();
        if self.routing.unsubscribe(&owner_id, ctx) {
            debug!(owner = %*owner_id, topic = %ctx, "Unsubscribed");
        }
        Ok(())
    }

    async fn publish(
        &self,
        ctx: &MessagingContext,
        message: Message,
        mode: PublishMode,
    ) -> Result<()> {
        if !self.can_proceed() {
            if mode == PublishMode::Mandatory {
                self.undelivered.fetch_add(1, Ordering::Relaxed);
                warn!(
                    message = message.kind_name(),
                    topic = %ctx,
                    "Not connected, mandatory message dropped"
                );
            } else {
                debug!(
                    message = message.kind_name(),
                    topic = %ctx,
                    "Not connected, message dropped"
                );
            }
            return Ok(());
        }

        let delivered = self.routing.route(ctx, &message);
        if delivered == 0 && mode == PublishMode::Mandatory {
            self.undelivered.fetch_add(1, Ordering::Relaxed);
            warn!(
                message = message.kind_name(),
                topic = %ctx,
                "No receiver for a message that expects one"
            );
        }
        Ok(())
    }

    async fn delete_server_artifacts(&self, application_name: &str) -> Result<()> {
        let removed = self.routing.remove_application(application_name);
        debug!(application = application_name, removed, "Server artifacts deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ThoseThat;
    use tokio::sync::mpsc;

    fn ctx() -> MessagingContext {
        MessagingContext::for_agents("d", "app", "database", ThoseThat::Import)
    }

    fn msg() -> Message {
        Message::RequestImport {
            application_name: "app".into(),
            component_or_facet_name: "database".into(),
        }
    }

    fn client(
        routing: &Arc<RoutingContext>,
        path: &str,
        required: bool,
    ) -> (InMemoryClient, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let owner = OwnerProperties::agent("d", "app", path);
        (InMemoryClient::new(routing.clone(), tx, owner, required), rx)
    }

    #[tokio::test]
    async fn test_disconnected_client_is_silent_when_connection_required() {
        let routing = Arc::new(RoutingContext::new());
        let (client, _rx) = client(&routing, "/vm1", true);

        client.subscribe(&ctx()).await.unwrap();
        assert!(routing.subscriptions(&client.owner_id()).is_empty());

        client.open_connection().await.unwrap();
        client.subscribe(&ctx()).await.unwrap();
        assert_eq!(routing.subscriptions(&client.owner_id()).len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_without_connection_when_not_required() {
        let routing = Arc::new(RoutingContext::new());
        let (receiver, mut rx) = client(&routing, "/vm1", false);
        let (sender, _rx2) = client(&routing, "/vm2", false);

        receiver.subscribe(&ctx()).await.unwrap();
        sender
            .publish(&ctx(), msg(), PublishMode::Mandatory)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(msg()));
    }

    #[tokio::test]
    async fn test_owner_rename_keeps_delivery() {
        let routing = Arc::new(RoutingContext::new());
        let (receiver, mut rx) = client(&routing, "/vm1", false);
        let (sender, _rx2) = client(&routing, "/vm2", false);
        receiver.subscribe(&ctx()).await.unwrap();

        receiver.set_owner_properties(OwnerProperties::agent("d", "app", "/vm9"));
        assert_eq!(receiver.owner_id(), "app /vm9");
        assert!(routing.subscriptions("app /vm1").is_empty());

        sender
            .publish(&ctx(), msg(), PublishMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(msg()));
    }

    #[tokio::test]
    async fn test_mandatory_without_receiver_is_counted() {
        let routing = Arc::new(RoutingContext::new());
        let (sender, _rx) = client(&routing, "/vm1", false);

        sender
            .publish(&ctx(), msg(), PublishMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(sender.undelivered_mandatory(), 0);

        sender
            .publish(&ctx(), msg(), PublishMode::Mandatory)
            .await
            .unwrap();
        assert_eq!(sender.undelivered_mandatory(), 1);
    }

    #[tokio::test]
    async fn test_mandatory_while_disconnected_is_counted() {
        let routing = Arc::new(RoutingContext::new());
        let (receiver, mut rx) = client(&routing, "/vm1", false);
        let (sender, _rx2) = client(&routing, "/vm2", true);
        receiver.subscribe(&ctx()).await.unwrap();

        sender
            .publish(&ctx(), msg(), PublishMode::Mandatory)
            .await
            .unwrap();
        assert_eq!(sender.undelivered_mandatory(), 1);
        assert!(rx.try_recv().is_err());

        sender.open_connection().await.unwrap();
        sender
            .publish(&ctx(), msg(), PublishMode::Mandatory)
            .await
            .unwrap();
        assert_eq!(sender.undelivered_mandatory(), 1);
        assert_eq!(rx.recv().await, Some(msg()));
    }

    #[tokio::test]
    async fn test_rename_onto_taken_owner_keeps_current_id() {
        let routing = Arc::new(RoutingContext::new());
        let (first, mut rx1) = client(&routing, "/vm1", false);
        let (second, mut rx2) = client(&routing, "/vm2", false);
        first.subscribe(&ctx()).await.unwrap();

        first.set_owner_properties(OwnerProperties::agent("d", "app", "/vm2"));
        assert_eq!(first.owner_id(), "app /vm1");
        assert_eq!(routing.subscriptions("app /vm1").len(), 1);

        // Later subscriptions still land under the id the client kept
        second.subscribe(&ctx()).await.unwrap();
        first
            .subscribe(&MessagingContext::for_agents("d", "app", "cache", ThoseThat::Import))
            .await
            .unwrap();
        assert_eq!(routing.subscriptions("app /vm1").len(), 2);

        second
            .publish(&ctx(), msg(), PublishMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(rx1.recv().await, Some(msg()));
        assert_eq!(rx2.recv().await, Some(msg()));
    }

    #[tokio::test]
    async fn test_concurrent_rename_and_subscribe_stay_consistent() {
        let routing = Arc::new(RoutingContext::new());
        let (receiver, _rx) = client(&routing, "/vm1", false);
        let receiver = Arc::new(receiver);

        let renamer = {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let path = format!("/vm{}", i % 3 + 1);
                    receiver.set_owner_properties(OwnerProperties::agent("d", "app", &path));
                    tokio::task::yield_now().await;
                }
            })
        };
        let subscriber = {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let ctx = MessagingContext::for_agents(
                        "d",
                        "app",
                        &format!("component-{}", i),
                        ThoseThat::Import,
                    );
                    receiver.subscribe(&ctx).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        renamer.await.unwrap();
        subscriber.await.unwrap();

        // Every subscription and the handler follow the final id
        let owner_id = receiver.owner_id();
        assert_eq!(routing.owner_ids(), vec![owner_id.clone()]);
        assert_eq!(routing.subscriptions(&owner_id).len(), 50);
        assert!(routing.has_handler(&owner_id));
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let routing = Arc::new(RoutingContext::new());
        let (receiver, mut rx) = client(&routing, "/vm1", false);
        let (sender, _rx2) = client(&routing, "/vm2", false);
        receiver.open_connection().await.unwrap();
        receiver.subscribe(&ctx()).await.unwrap();
        receiver.close_connection().await.unwrap();

        sender
            .publish(&ctx(), msg(), PublishMode::BestEffort)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
