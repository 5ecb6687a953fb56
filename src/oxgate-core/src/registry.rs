use async_trait::async_trait;
use oxgate_errors::{GatewayError, Result};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::Service;

/// Storage contract for registered services. Implementations must be safe
/// under concurrent access from many pipeline invocations.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Persist a new service and its endpoints atomically. Assigns an id
    /// when the given one is empty. Fails with `AlreadyExists` when another
    /// service holds the same name.
    async fn create(&self, service: Service) -> Result<Service>;

    async fn get(&self, id: &str) -> Result<Service>;

    async fn get_by_name(&self, name: &str) -> Result<Service>;

    /// Every active service with at least one endpoint whose path equals
    /// `path` and whose methods contain `method` or `*`. An empty result is
    /// a `NotFound` error: absence of a route is an error, not an empty
    /// success.
    async fn get_by_endpoint(&self, path: &str, method: &str) -> Result<Vec<Service>>;

    /// Replace a service wholesale, endpoint list included. Fails with
    /// `NotFound` for unknown ids and `AlreadyExists` when renaming onto
    /// another service's name.
    async fn update(&self, service: Service) -> Result<Service>;

    /// Delete by id, cascading to the service's endpoints.
    async fn delete(&self, id: &str) -> Result<()>;

    /// All services regardless of the active flag.
    async fn get_all(&self) -> Result<Vec<Service>>;
}

/// In-process registry. Services are kept in registration order so that
/// endpoint resolution is deterministic; the lock is held only for the
/// duration of the list access, never across another call.
#[derive(Default)]
pub struct MemoryRegistry {
    services: RwLock<Vec<Service>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn create(&self, mut service: Service) -> Result<Service> {
        let mut services = self.services.write();
        if services.iter().any(|s| s.name == service.name) {
            return Err(GatewayError::AlreadyExists(format!(
                "service `{}` already exists",
                service.name
            )));
        }
        if service.id.is_empty() {
            service.id = Uuid::new_v4().to_string();
        }
        services.push(service.clone());
        Ok(service)
    }

    async fn get(&self, id: &str) -> Result<Service> {
        self.services
            .read()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("service `{id}` not found")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Service> {
        self.services
            .read()
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("service `{name}` not found")))
    }

    async fn get_by_endpoint(&self, path: &str, method: &str) -> Result<Vec<Service>> {
        let matches: Vec<Service> = self
            .services
            .read()
            .iter()
            .filter(|s| s.active && s.find_endpoint(path, method).is_some())
            .cloned()
            .collect();
        if matches.is_empty() {
            return Err(GatewayError::NotFound(format!(
                "no active service for {method} {path}"
            )));
        }
        Ok(matches)
    }

    async fn update(&self, service: Service) -> Result<Service> {
        let mut services = self.services.write();
        let index = services
            .iter()
            .position(|s| s.id == service.id)
            .ok_or_else(|| GatewayError::NotFound(format!("service `{}` not found", service.id)))?;
        if services
            .iter()
            .any(|s| s.name == service.name && s.id != service.id)
        {
            return Err(GatewayError::AlreadyExists(format!(
                "service `{}` already exists",
                service.name
            )));
        }
        services[index] = service.clone();
        Ok(service)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|s| s.id != id);
        if services.len() == before {
            return Err(GatewayError::NotFound(format!("service `{id}` not found")));
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Service>> {
        Ok(self.services.read().clone())
    }
}
