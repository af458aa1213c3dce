mod bus;
mod future;
mod message;
mod service;
mod system;

pub use bus::{BusError, MessageBus};
pub use future::Future;
pub use message::{Broadcast, BroadcastMessage, Event, EventId, EventMessage, Message, Request};
pub use service::{MicroService, ServiceConfig, ServiceContext, ServiceError, ServiceHandle, ServiceId, ServiceState};
pub use system::ServiceSystem;
