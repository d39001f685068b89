//! HTTP adapter for the target-service API contract
//!
//! Builds `reqwest` clients for resolved service descriptors and maps the
//! REST surface of a target e-commerce service onto the
//! [`CommerceApi`](bombard_interfaces::CommerceApi) trait the engine drives.

pub mod client;
pub mod errors;

pub use client::{HttpCommerceClient, HttpCommerceClientFactory};
pub use errors::HttpClientError;
