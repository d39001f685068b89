//! Service-descriptor registry contract
//!
//! Maps a service name to the endpoint and credentials the harness should
//! use when driving it. Population of the registry (CLI flags, config files,
//! discovery) happens outside the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Registry error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("service not found: {name}")]
    ServiceNotFound { name: String },

    #[error("invalid descriptor: {message}")]
    InvalidDescriptor { message: String },
}

/// HTTP authentication credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HttpCredentials {
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { key: String, header: String },
}

/// Where and how to reach one target service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub credentials: Option<HttpCredentials>,
}

/// Lookup from service name to descriptor
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Resolve a service by name
    async fn resolve(&self, name: &str) -> Result<ServiceDescriptor, RegistryError>;

    /// Register or replace a descriptor
    async fn register(&self, descriptor: ServiceDescriptor) -> Result<(), RegistryError>;

    /// Names of all registered services
    async fn service_names(&self) -> Vec<String>;
}

/// Map-backed registry, the default for embedded and test use
#[derive(Debug, Default)]
pub struct InMemoryServiceRegistry {
    descriptors: RwLock<HashMap<String, ServiceDescriptor>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a pre-populated registry
    pub fn with_descriptors(descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        let map = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self {
            descriptors: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn resolve(&self, name: &str) -> Result<ServiceDescriptor, RegistryError> {
        self.descriptors
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    async fn register(&self, descriptor: ServiceDescriptor) -> Result<(), RegistryError> {
        if descriptor.name.is_empty() {
            return Err(RegistryError::InvalidDescriptor {
                message: "service name cannot be empty".to_string(),
            });
        }
        self.descriptors
            .write()
            .await
            .insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    async fn service_names(&self) -> Vec<String> {
        self.descriptors.read().await.keys().cloned().collect()
    }
}
