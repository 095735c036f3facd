//! Mock implementations for testing.
//!
//! Test doubles for the clock and sampler ports, plus a tracing layer that
//! records the governor's log events.

pub mod clock;
pub mod layer;
pub mod sampler;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use sampler::MockSampler;
