use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::future::Future;
use crate::message::{Broadcast, BroadcastMessage, Event, EventId, EventMessage, Message, Request};
use crate::service::ServiceId;

pub(crate) type InboxSender = mpsc::UnboundedSender<Message>;
pub(crate) type InboxReceiver = mpsc::UnboundedReceiver<Message>;

/// A service's private queue. The bus keeps the only sender, so dropping the
/// inbox closes the channel and wakes a reader parked on it.
struct Inbox {
    sender: InboxSender,
    receiver: Arc<Mutex<InboxReceiver>>,
}

impl Inbox {
    fn create() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Inbox {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

#[derive(Default)]
struct Routes {
    inboxes: HashMap<ServiceId, Inbox>,
    rotations: HashMap<TypeId, VecDeque<ServiceId>>,
    broadcasts: HashMap<TypeId, Vec<ServiceId>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Service '{0}' is not registered")]
    NotRegistered(ServiceId),
}

/// The broker every service talks through.
///
/// Events go to exactly one subscriber, picked round-robin per event type.
/// Broadcasts go to every subscriber of their type at the time of sending.
///
/// Lock order: `routes` before `pending`.
#[derive(Default)]
pub struct MessageBus {
    routes: Mutex<Routes>,
    pending: Mutex<HashMap<EventId, Box<dyn Any + Send>>>,
    next_event: AtomicU64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the inbox for `id`. Registering twice keeps the existing inbox.
    pub fn register(&self, id: &ServiceId) {
        let mut routes = self.routes.lock();
        if routes.inboxes.contains_key(id) {
            return;
        }
        routes.inboxes.insert(id.clone(), Inbox::create());
        log::debug!("Registered service '{}'.", id);
    }

    /// Removes `id` from every rotation and broadcast set and drops its inbox
    /// together with anything still queued in it.
    pub fn unregister(&self, id: &ServiceId) {
        let inbox = {
            let mut routes = self.routes.lock();
            for rotation in routes.rotations.values_mut() {
                rotation.retain(|subscriber| subscriber != id);
            }
            routes.rotations.retain(|_, rotation| !rotation.is_empty());
            for subscribers in routes.broadcasts.values_mut() {
                subscribers.retain(|subscriber| subscriber != id);
            }
            routes.broadcasts.retain(|_, subscribers| !subscribers.is_empty());
            routes.inboxes.remove(id)
        };

        let Some(Inbox { sender, receiver }) = inbox else {
            return;
        };
        drop(sender);

        // A reader in `await_message` may hold the lock. It drains the inbox
        // itself once it sees the inbox is gone.
        if let Some(mut receiver) = receiver.try_lock() {
            self.discard(id, &mut receiver);
        }
        log::debug!("Unregistered service '{}'.", id);
    }

    pub fn is_registered(&self, id: &ServiceId) -> bool {
        self.routes.lock().inboxes.contains_key(id)
    }

    /// Adds `id` to the round-robin rotation of `E`. Subscribing again to
    /// the same type is a no-op.
    pub fn subscribe_event<E: Event>(&self, id: &ServiceId) -> Result<(), BusError> {
        let mut routes = self.routes.lock();
        if !routes.inboxes.contains_key(id) {
            return Err(BusError::NotRegistered(id.clone()));
        }
        let rotation = routes.rotations.entry(TypeId::of::<E>()).or_default();
        if rotation.contains(id) {
            log::debug!("Service '{}' already handles {}.", id, std::any::type_name::<E>());
            return Ok(());
        }
        rotation.push_back(id.clone());
        Ok(())
    }

    /// Adds `id` to the subscribers of `B`. Subscribing again is a no-op.
    pub fn subscribe_broadcast<B: Broadcast>(&self, id: &ServiceId) -> Result<(), BusError> {
        let mut routes = self.routes.lock();
        if !routes.inboxes.contains_key(id) {
            return Err(BusError::NotRegistered(id.clone()));
        }
        let subscribers = routes.broadcasts.entry(TypeId::of::<B>()).or_default();
        if !subscribers.contains(id) {
            subscribers.push(id.clone());
        }
        Ok(())
    }

    /// Hands `event` to the next subscriber in the rotation of `E`.
    ///
    /// Returns `None` when nobody subscribes to `E`; the event is dropped.
    pub fn send_event<E: Event>(&self, event: E) -> Option<Future<E::Output>> {
        let mut routes = self.routes.lock();
        let Routes { inboxes, rotations, .. } = &mut *routes;

        let Some(target) = rotations.get_mut(&TypeId::of::<E>()).and_then(|rotation| {
            let target = rotation.pop_front()?;
            rotation.push_back(target.clone());
            Some(target)
        }) else {
            log::trace!("No subscriber for {}, event dropped.", std::any::type_name::<E>());
            return None;
        };

        let Some(inbox) = inboxes.get(&target) else {
            log::warn!("Service '{}' is in a rotation without an inbox.", target);
            return None;
        };

        let id = EventId(self.next_event.fetch_add(1, Ordering::Relaxed));
        let future = Future::new();
        // Recorded before the event becomes visible so a fast handler can
        // never complete it ahead of the entry.
        self.pending.lock().insert(id, Box::new(future.clone()));

        if let Err(error) = inbox.sender.send(Message::Event(EventMessage::new(id, event))) {
            log::error!("Failed to deliver {} to '{}'! {}", id, target, error);
            self.pending.lock().remove(&id);
            return None;
        }

        log::trace!("{} ({}) -> '{}'", id, std::any::type_name::<E>(), target);
        Some(future)
    }

    /// Delivers `broadcast` to every current subscriber of `B` and returns
    /// how many inboxes received it.
    pub fn send_broadcast<B: Broadcast>(&self, broadcast: B) -> usize {
        let message = Message::Broadcast(BroadcastMessage::new(broadcast));
        let routes = self.routes.lock();
        let Some(subscribers) = routes.broadcasts.get(&TypeId::of::<B>()) else {
            return 0;
        };

        let mut delivered = 0;
        for id in subscribers {
            let Some(inbox) = routes.inboxes.get(id) else {
                continue;
            };
            if inbox.sender.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        log::trace!("{} -> {} subscriber(s)", message.type_name(), delivered);
        delivered
    }

    /// Resolves the future the sender of `request` is waiting on. Does
    /// nothing if the event was already completed or never had a future.
    pub fn complete<E: Event>(&self, request: &Request<E>, result: E::Output) {
        let entry = self.pending.lock().remove(&request.id());
        match entry.map(|entry| entry.downcast::<Future<E::Output>>()) {
            Some(Ok(future)) => future.resolve(result),
            Some(Err(_)) => log::warn!("{} was sent with a different result type.", request.id()),
            None => log::trace!("{} has no pending future.", request.id()),
        }
    }

    /// Blocks until a message is queued for `id`.
    ///
    /// Fails with [`BusError::NotRegistered`] if `id` has no inbox, or loses
    /// it while waiting.
    pub fn await_message(&self, id: &ServiceId) -> Result<Message, BusError> {
        let receiver = self
            .routes
            .lock()
            .inboxes
            .get(id)
            .map(|inbox| Arc::clone(&inbox.receiver))
            .ok_or_else(|| BusError::NotRegistered(id.clone()))?;

        self.receive(id, &receiver)
    }

    fn receive(&self, id: &ServiceId, receiver: &Arc<Mutex<InboxReceiver>>) -> Result<Message, BusError> {
        let message = receiver.lock().blocking_recv();
        // `unregister` cannot drain an inbox while a reader holds its lock.
        if !self.owns(id, receiver) {
            self.discard(id, &mut receiver.lock());
        }
        message.ok_or_else(|| BusError::NotRegistered(id.clone()))
    }

    fn owns(&self, id: &ServiceId, receiver: &Arc<Mutex<InboxReceiver>>) -> bool {
        self.routes
            .lock()
            .inboxes
            .get(id)
            .is_some_and(|inbox| Arc::ptr_eq(&inbox.receiver, receiver))
    }

    /// Closes a removed inbox and forgets the futures of the events still in it.
    fn discard(&self, id: &ServiceId, receiver: &mut InboxReceiver) {
        receiver.close();
        let mut discarded = 0usize;
        let mut pending = self.pending.lock();
        while let Ok(message) = receiver.try_recv() {
            if let Message::Event(event) = message {
                pending.remove(&event.id());
            }
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("Discarded {} queued message(s) of service '{}'.", discarded, id);
        }
    }

    /// Number of sent events whose futures have not been completed yet.
    pub fn pending_events(&self) -> usize {
        self.pending.lock().len()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.routes.lock();
        f.debug_struct("MessageBus")
            .field("inboxes", &routes.inboxes.len())
            .field("event_types", &routes.rotations.len())
            .field("broadcast_types", &routes.broadcasts.len())
            .finish()
    }
}
