//! Lifecycle tracing for a single outbound HTTP request.
//!
//! A [`RequestTracer`] is bound to one request, receives [`TraceEvent`]s from
//! the driver executing it, and turns them into per-phase durations.

pub mod clock;
pub mod error;
pub mod event;
pub mod phase;
pub mod result;
pub mod tracer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TraceError;
pub use event::{TraceEvent, TraceHandler};
pub use phase::{Phase, PhaseTimer};
pub use result::{ConnInfo, PhaseDurations, PhaseError, TraceResult};
pub use tracer::{RequestTracer, TraceHandle, TracedRequest};
