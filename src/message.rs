use std::any::{Any, TypeId};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A request addressed to a single subscriber. The sender gets back a
/// [`Future`](crate::Future) that resolves to `Output` once the handling
/// service completes the event.
pub trait Event: Any + Send + Sync {
    /// Result the handler hands back through the bus. Use `()` if the sender
    /// only needs to know the event was processed.
    type Output: Clone + Send + 'static;
}

/// A notification fanned out to every subscriber. Broadcasts carry no result.
pub trait Broadcast: Any + Send + Sync {}

/// Identity the bus assigns to every event it accepts.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct EventId(pub(crate) u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

type Payload = Arc<dyn Any + Send + Sync>;

/// An event as delivered to its handler: the payload plus the identity the
/// bus needs to resolve the sender's future.
pub struct Request<E> {
    id: EventId,
    event: Arc<E>,
}

impl<E> Request<E> {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event(&self) -> &E {
        &self.event
    }
}

impl<E> Clone for Request<E> {
    fn clone(&self) -> Self {
        Request {
            id: self.id,
            event: Arc::clone(&self.event),
        }
    }
}

impl<E> Deref for Request<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.event
    }
}

impl<E: fmt::Debug> fmt::Debug for Request<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

#[derive(Clone)]
pub struct EventMessage {
    id: EventId,
    type_id: TypeId,
    type_name: &'static str,
    payload: Payload,
}

impl EventMessage {
    pub(crate) fn new<E: Event>(id: EventId, event: E) -> Self {
        EventMessage {
            id,
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            payload: Arc::new(event),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<E: Event>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    pub fn downcast<E: Event>(&self) -> Option<Request<E>> {
        let event = Arc::clone(&self.payload).downcast::<E>().ok()?;
        Some(Request { id: self.id, event })
    }
}

#[derive(Clone)]
pub struct BroadcastMessage {
    type_id: TypeId,
    type_name: &'static str,
    payload: Payload,
}

impl BroadcastMessage {
    pub(crate) fn new<B: Broadcast>(broadcast: B) -> Self {
        BroadcastMessage {
            type_id: TypeId::of::<B>(),
            type_name: std::any::type_name::<B>(),
            payload: Arc::new(broadcast),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<B: Broadcast>(&self) -> bool {
        self.type_id == TypeId::of::<B>()
    }

    pub fn downcast<B: Broadcast>(&self) -> Option<Arc<B>> {
        Arc::clone(&self.payload).downcast::<B>().ok()
    }
}

/// Everything that travels through a service inbox.
#[derive(Clone)]
pub enum Message {
    Event(EventMessage),
    Broadcast(BroadcastMessage),
}

impl Message {
    /// Concrete type of the payload, used to pick the bound handler.
    pub fn payload_type(&self) -> TypeId {
        match self {
            Message::Event(event) => event.type_id,
            Message::Broadcast(broadcast) => broadcast.type_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Event(event) => event.type_name,
            Message::Broadcast(broadcast) => broadcast.type_name,
        }
    }

    pub fn as_event<E: Event>(&self) -> Option<Request<E>> {
        match self {
            Message::Event(event) => event.downcast(),
            Message::Broadcast(_) => None,
        }
    }

    pub fn as_broadcast<B: Broadcast>(&self) -> Option<Arc<B>> {
        match self {
            Message::Broadcast(broadcast) => broadcast.downcast(),
            Message::Event(_) => None,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Event(event) => write!(f, "Event({}, {})", event.type_name, event.id),
            Message::Broadcast(broadcast) => write!(f, "Broadcast({})", broadcast.type_name),
        }
    }
}
