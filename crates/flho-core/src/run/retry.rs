//! Retry target invocation port.
//!
//! When a countdown expires and the breaker admits the attempt, the
//! orchestrator calls the state's `retryUrl` through a [`RetryInvoker`].
//! `BoxRetryInvoker` erases the concrete type so the orchestrator does not
//! carry another generic parameter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use flho_types::error::FlowError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body sent to a retry target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPayload {
    pub run_unique_id: Uuid,
    pub step: u32,
    pub workflow_id: Uuid,
}

/// One call to a retry target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub url: String,
    pub payload: RetryPayload,
}

/// Invokes retry targets. Success is any 2xx; everything else is
/// `FlowError::TransportFailure`.
pub trait RetryInvoker: Send + Sync {
    fn invoke(
        &self,
        request: &RetryRequest,
    ) -> impl Future<Output = Result<(), FlowError>> + Send;
}

/// Object-safe version of [`RetryInvoker`] with boxed futures.
pub trait RetryInvokerDyn: Send + Sync {
    fn invoke_boxed<'a>(
        &'a self,
        request: &'a RetryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), FlowError>> + Send + 'a>>;
}

impl<T: RetryInvoker> RetryInvokerDyn for T {
    fn invoke_boxed<'a>(
        &'a self,
        request: &'a RetryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), FlowError>> + Send + 'a>> {
        Box::pin(self.invoke(request))
    }
}

/// Type-erased, cheaply cloneable retry invoker.
#[derive(Clone)]
pub struct BoxRetryInvoker {
    inner: Arc<dyn RetryInvokerDyn>,
}

impl BoxRetryInvoker {
    pub fn new<T: RetryInvoker + 'static>(invoker: T) -> Self {
        Self {
            inner: Arc::new(invoker),
        }
    }

    pub async fn invoke(&self, request: &RetryRequest) -> Result<(), FlowError> {
        self.inner.invoke_boxed(request).await
    }
}

impl std::fmt::Debug for BoxRetryInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRetryInvoker").finish_non_exhaustive()
    }
}
