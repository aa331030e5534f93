pub mod countdown;
pub mod orchestrator;
pub mod retry;

pub use countdown::{CountdownRegistry, Expired};
pub use orchestrator::RunOrchestrator;
pub use retry::{BoxRetryInvoker, RetryInvoker, RetryPayload, RetryRequest};
