//! Contract definitions for the bombard harness
//!
//! This crate declares the narrow interfaces the test engine depends on:
//! the target-service API consumed by pipeline stages, the descriptor
//! registry that maps service names to endpoints, and the metrics recorder
//! the engine emits samples into. Implementations live elsewhere (the HTTP
//! adapter, in-memory fakes in tests, operator-provided sinks).

pub mod metrics;
pub mod registry;
pub mod service;

pub use metrics::{HarnessMetrics, NoopMetrics, RecordingMetrics};
pub use registry::{
    HttpCredentials, InMemoryServiceRegistry, RegistryError, ServiceDescriptor, ServiceRegistry,
};
pub use service::{ApiError, CommerceApi, CommerceApiFactory};
