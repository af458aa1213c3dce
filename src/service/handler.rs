use std::marker::PhantomData;
use std::sync::Arc;

use crate::message::{Broadcast, Event, Message, Request};

use super::ServiceContext;

/// Type-erased handler bound to one concrete message type of a service.
pub(crate) trait MessageHandler<S> {
    fn handle(&mut self, service: &mut S, message: Message, ctx: &mut ServiceContext<S>) -> anyhow::Result<()>;
}

pub(crate) type BoxedMessageHandler<S> = Box<dyn MessageHandler<S>>;

pub(crate) struct EventHandler<E, F> {
    callback: F,
    _phantom_event: PhantomData<fn(E)>,
}

impl<E, F> EventHandler<E, F> {
    pub fn new(callback: F) -> Self {
        EventHandler {
            callback,
            _phantom_event: PhantomData,
        }
    }
}

impl<S, E, F> MessageHandler<S> for EventHandler<E, F>
where
    E: Event,
    F: FnMut(&mut S, Request<E>, &mut ServiceContext<S>) -> anyhow::Result<()>,
{
    fn handle(&mut self, service: &mut S, message: Message, ctx: &mut ServiceContext<S>) -> anyhow::Result<()> {
        match message.as_event::<E>() {
            Some(request) => (self.callback)(service, request, ctx),
            None => {
                log::warn!("'{}' got {:?} on its {} handler.", ctx.id(), message, std::any::type_name::<E>());
                Ok(())
            }
        }
    }
}

pub(crate) struct BroadcastHandler<B, F> {
    callback: F,
    _phantom_broadcast: PhantomData<fn(B)>,
}

impl<B, F> BroadcastHandler<B, F> {
    pub fn new(callback: F) -> Self {
        BroadcastHandler {
            callback,
            _phantom_broadcast: PhantomData,
        }
    }
}

impl<S, B, F> MessageHandler<S> for BroadcastHandler<B, F>
where
    B: Broadcast,
    F: FnMut(&mut S, Arc<B>, &mut ServiceContext<S>) -> anyhow::Result<()>,
{
    fn handle(&mut self, service: &mut S, message: Message, ctx: &mut ServiceContext<S>) -> anyhow::Result<()> {
        match message.as_broadcast::<B>() {
            Some(broadcast) => (self.callback)(service, broadcast, ctx),
            None => {
                log::warn!("'{}' got {:?} on its {} handler.", ctx.id(), message, std::any::type_name::<B>());
                Ok(())
            }
        }
    }
}
