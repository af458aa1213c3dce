use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Context;

use crate::bus::MessageBus;
use crate::future::Future;

use super::{MicroService, ServiceContext, ServiceError, ServiceId, ServiceState};

/// Configuration for a service's thread.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Thread name, defaults to the service id.
    pub thread_name: Option<String>,
    /// Stack size in bytes, defaults to the platform default.
    pub stack_size: Option<usize>,
}

impl ServiceConfig {
    pub fn with_thread_name(mut self, name: &str) -> Self {
        self.thread_name = Some(name.to_string());
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// Releases the registration and publishes the final state, also when the
/// service thread unwinds out of a handler.
struct Teardown {
    bus: Arc<MessageBus>,
    id: ServiceId,
    state: Arc<AtomicU8>,
    ready: Future<()>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.bus.unregister(&self.id);
        self.state.store(ServiceState::Terminated as u8, Ordering::SeqCst);
        let _ = self.ready.try_resolve(());
    }
}

pub(crate) struct ServiceRunner<S: MicroService> {
    service: S,
    ctx: ServiceContext<S>,
    state: Arc<AtomicU8>,
    ready: Future<()>,
}

impl<S: MicroService> ServiceRunner<S> {

    pub fn run(mut self) -> anyhow::Result<()> {
        let id = self.ctx.id().clone();
        let bus = Arc::clone(self.ctx.bus());

        bus.register(&id);
        let _teardown = Teardown {
            bus,
            id: id.clone(),
            state: Arc::clone(&self.state),
            ready: self.ready.clone(),
        };
        self.set_state(ServiceState::Initializing);
        log::debug!("Starting service '{}'...", &id);

        let outcome = self.start();
        if let Err(error) = &outcome {
            log::error!("Service '{}' failed! {:#}", &id, error);
        }

        self.service.on_terminate(&mut self.ctx);
        log::debug!("Service '{}' stopped.", &id);
        outcome
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.service
            .initialize(&mut self.ctx)
            .with_context(|| format!("initializing '{}'", self.ctx.id()))?;

        if self.ctx.is_terminated() {
            self.set_state(ServiceState::Terminated);
        } else {
            self.set_state(ServiceState::Running);
        }
        let _ = self.ready.try_resolve(());

        while !self.ctx.is_terminated() {
            let message = match self.ctx.bus().await_message(self.ctx.id()) {
                Ok(message) => message,
                Err(error) => {
                    log::debug!("Service '{}' stopped reading: {}", self.ctx.id(), error);
                    break;
                }
            };
            log::trace!("'{}' <- {:?}", self.ctx.id(), &message);

            let type_name = message.type_name();
            self.ctx
                .dispatch(&mut self.service, message)
                .with_context(|| format!("handling {} in '{}'", type_name, self.ctx.id()))?;
        }
        Ok(())
    }

    fn set_state(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Handle to a service running on its own thread.
pub struct ServiceHandle {
    id: ServiceId,
    state: Arc<AtomicU8>,
    events_received: Arc<AtomicUsize>,
    ready: Future<()>,
    thread: JoinHandle<anyhow::Result<()>>,
}

impl ServiceHandle {

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of events dispatched to a handler of this service so far.
    pub fn events_received(&self) -> usize {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Blocks until `initialize` has finished, so every subscription made
    /// there is in place. Returns the state reached.
    pub fn wait_ready(&self) -> ServiceState {
        self.ready.get();
        self.state()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the service thread to exit.
    pub fn join(self) -> Result<(), ServiceError> {
        match self.thread.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(ServiceError::Failed(self.id, error)),
            Err(payload) => Err(ServiceError::Panicked(self.id, panic_message(payload.as_ref()))),
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.id, self.state())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn spawn<S: MicroService>(
    bus: Arc<MessageBus>,
    id: ServiceId,
    service: S,
    config: &ServiceConfig,
) -> Result<ServiceHandle, ServiceError> {
    let state = Arc::new(AtomicU8::new(ServiceState::Created as u8));
    let events_received = Arc::new(AtomicUsize::new(0));
    let ready = Future::new();

    let mut builder = thread::Builder::new().name(config.thread_name.clone().unwrap_or_else(|| id.to_string()));
    if let Some(bytes) = config.stack_size {
        builder = builder.stack_size(bytes);
    }

    let runner_id = id.clone();
    let runner_state = Arc::clone(&state);
    let runner_events = Arc::clone(&events_received);
    let runner_ready = ready.clone();
    let thread = builder
        .spawn(move || {
            // built on the service thread: bound handlers never cross threads
            let runner = ServiceRunner {
                service,
                ctx: ServiceContext::new(runner_id, bus, runner_events),
                state: runner_state,
                ready: runner_ready,
            };
            runner.run()
        })
        .map_err(|error| ServiceError::Spawn(id.clone(), error))?;

    Ok(ServiceHandle {
        id,
        state,
        events_received,
        ready,
        thread,
    })
}
