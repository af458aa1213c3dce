use std::sync::Arc;

use crate::bus::MessageBus;
use crate::service::{MicroService, ServiceConfig, ServiceError, ServiceHandle, ServiceId, runner};

/// Owns the bus shared by a group of services and starts each of them on its
/// own thread.
#[derive(Clone)]
pub struct ServiceSystem {
    name: String,
    bus: Arc<MessageBus>,
    config: ServiceConfig,
}

impl ServiceSystem {

    pub fn new(name: &str) -> Self {
        Self::with_bus(name, Arc::new(MessageBus::new()))
    }

    pub fn with_bus(name: &str, bus: Arc<MessageBus>) -> Self {
        ServiceSystem {
            name: name.to_string(),
            bus,
            config: ServiceConfig::default(),
        }
    }

    /// Thread configuration used by [`ServiceSystem::spawn`].
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn spawn<S: MicroService>(&self, name: &str, service: S) -> Result<ServiceHandle, ServiceError> {
        self.spawn_with(name, service, &self.config)
    }

    pub fn spawn_with<S: MicroService>(&self, name: &str, service: S, config: &ServiceConfig) -> Result<ServiceHandle, ServiceError> {
        log::debug!("Creating service '{}' on system '{}'...", name, &self.name);
        runner::spawn(Arc::clone(&self.bus), ServiceId::new(name), service, config)
    }
}

impl std::fmt::Debug for ServiceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSystem")
            .field("name", &self.name)
            .field("bus", &self.bus)
            .finish()
    }
}
