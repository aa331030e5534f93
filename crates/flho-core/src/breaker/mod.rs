pub mod circuit;
pub mod registry;

pub use circuit::{Admission, CircuitBreaker, Transition};
pub use registry::{BreakerRegistry, Recorded};
