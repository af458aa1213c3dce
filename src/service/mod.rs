pub(crate) mod handler;
pub(crate) mod runner;

mod id;
pub use id::ServiceId;
pub use runner::{ServiceConfig, ServiceHandle};

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::bus::{BusError, MessageBus};
use crate::future::Future;
use crate::message::{Broadcast, Event, Message, Request};

use handler::{BoxedMessageHandler, BroadcastHandler, EventHandler};

/// Basic trait for services. A service binds its handlers in `initialize`,
/// after which its thread only reacts to messages delivered by the bus.
pub trait MicroService: Send + Sized + 'static {

    /// Subscribe to the events and broadcasts this service handles. Runs once,
    /// on the service's own thread, right after it is registered.
    fn initialize(&mut self, ctx: &mut ServiceContext<Self>) -> anyhow::Result<()>;

    /// Override this function if you like to perform work when the service
    /// has stopped reading messages.
    fn on_terminate(&mut self, _ctx: &mut ServiceContext<Self>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Created = 0,
    Initializing = 1,
    Running = 2,
    Terminated = 3,
}

impl ServiceState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ServiceState::Created,
            1 => ServiceState::Initializing,
            2 => ServiceState::Running,
            _ => ServiceState::Terminated,
        }
    }
}

/// The service context gives a running service access to its identity, the
/// bus, and the handler table of its receive loop.
pub struct ServiceContext<S> {
    id: ServiceId,
    bus: Arc<MessageBus>,
    handlers: HashMap<TypeId, BoxedMessageHandler<S>>,
    terminated: bool,
    events_received: Arc<AtomicUsize>,
}

impl<S> ServiceContext<S> {

    pub(crate) fn new(id: ServiceId, bus: Arc<MessageBus>, events_received: Arc<AtomicUsize>) -> Self {
        ServiceContext {
            id,
            bus,
            handlers: HashMap::new(),
            terminated: false,
            events_received,
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Subscribe to events of type `E` and bind `handler` to them. The handler
    /// must answer through [`ServiceContext::complete`].
    pub fn subscribe_event<E, F>(&mut self, handler: F) -> Result<(), BusError>
    where
        E: Event,
        F: FnMut(&mut S, Request<E>, &mut ServiceContext<S>) -> anyhow::Result<()> + 'static,
    {
        self.bus.subscribe_event::<E>(&self.id)?;
        self.bind(TypeId::of::<E>(), std::any::type_name::<E>(), Box::new(EventHandler::new(handler)));
        Ok(())
    }

    /// Subscribe to broadcasts of type `B` and bind `handler` to them.
    pub fn subscribe_broadcast<B, F>(&mut self, handler: F) -> Result<(), BusError>
    where
        B: Broadcast,
        F: FnMut(&mut S, Arc<B>, &mut ServiceContext<S>) -> anyhow::Result<()> + 'static,
    {
        self.bus.subscribe_broadcast::<B>(&self.id)?;
        self.bind(TypeId::of::<B>(), std::any::type_name::<B>(), Box::new(BroadcastHandler::new(handler)));
        Ok(())
    }

    pub fn send_event<E: Event>(&self, event: E) -> Option<Future<E::Output>> {
        self.bus.send_event(event)
    }

    pub fn send_broadcast<B: Broadcast>(&self, broadcast: B) -> usize {
        self.bus.send_broadcast(broadcast)
    }

    pub fn complete<E: Event>(&self, request: &Request<E>, result: E::Output) {
        self.bus.complete(request, result)
    }

    /// Stop after the message currently being handled. The service is
    /// unregistered right away, so anything still queued is dropped.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        log::debug!("Service '{}' terminating.", self.id);
        self.terminated = true;
        self.bus.unregister(&self.id);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn bind(&mut self, type_id: TypeId, type_name: &str, handler: BoxedMessageHandler<S>) {
        if self.handlers.insert(type_id, handler).is_some() {
            log::warn!("Service '{}' replaced its handler for {}.", self.id, type_name);
        }
    }

    pub(crate) fn dispatch(&mut self, service: &mut S, message: Message) -> anyhow::Result<()> {
        let type_id = message.payload_type();
        let Some(mut handler) = self.handlers.remove(&type_id) else {
            log::debug!("Service '{}' has no handler for {}, dropped.", self.id, message.type_name());
            return Ok(());
        };
        if let Message::Event(_) = &message {
            self.events_received.fetch_add(1, Ordering::Relaxed);
        }

        let result = handler.handle(service, message, self);
        // a handler bound while this one ran takes precedence
        self.handlers.entry(type_id).or_insert(handler);
        result
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {

    #[error("Could not start service '{0}': {1}")]
    Spawn(ServiceId, #[source] std::io::Error),

    #[error("Service '{0}' failed: {1:#}")]
    Failed(ServiceId, anyhow::Error),

    #[error("Service '{0}' panicked: {1}")]
    Panicked(ServiceId, String)
}
