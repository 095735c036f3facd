//! Domain layer - pure logic with no I/O.
//!
//! This layer contains the core concepts of the governor:
//! - Request keys
//! - The sliding rate window
//! - Error classification
//! - Resource samples and budgets
//! - Decisions, outcomes and request phases
//! - Configuration values and their validation
//!
//! All types in this layer are deterministic given their inputs, which makes
//! them easy to test with explicit instants.

pub mod classify;
pub mod config;
pub mod decision;
pub mod key;
pub mod resources;
pub mod window;
