//! Application layer - orchestration of domain logic.
//!
//! This layer wires the domain types into running components:
//! - TTL cache over a storage port
//! - Sliding-window limiter (the only component that suspends callers)
//! - Resource gauge over a sampler port
//! - Request governor composing the above
//! - Fetch driver running the caller-side retry loop
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod cache;
pub mod driver;
pub mod gauge;
pub mod governor;
pub mod limiter;
pub mod metrics;
pub mod ports;
