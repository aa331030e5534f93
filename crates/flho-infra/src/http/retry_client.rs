//! `RetryInvoker` over HTTP.
//!
//! POSTs the retry payload as JSON to the state's `retryUrl`. Any 2xx
//! response is success; connection errors, timeouts and other statuses
//! become `FlowError::TransportFailure`.

use flho_core::run::retry::{RetryInvoker, RetryRequest};
use flho_types::config::RetrySection;
use flho_types::error::FlowError;

#[derive(Clone)]
pub struct HttpRetryInvoker {
    client: reqwest::Client,
}

impl HttpRetryInvoker {
    pub fn new(config: &RetrySection) -> Result<Self, FlowError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FlowError::InternalFailure(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl RetryInvoker for HttpRetryInvoker {
    async fn invoke(&self, request: &RetryRequest) -> Result<(), FlowError> {
        let response = self
            .client
            .post(&request.url)
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| {
                FlowError::TransportFailure(format!("POST {} failed: {e}", request.url))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowError::TransportFailure(format!(
                "POST {} answered {status}",
                request.url
            )));
        }

        tracing::debug!(
            url = request.url.as_str(),
            status = status.as_u16(),
            run_id = %request.payload.run_unique_id,
            "retry target answered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use flho_core::run::retry::RetryPayload;
    use flho_types::error::ErrorKind;
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct Received {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        agents: Arc<Mutex<Vec<String>>>,
    }

    async fn accept(
        State(received): State<Received>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        received.bodies.lock().unwrap().push(body);
        if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
            received.agents.lock().unwrap().push(agent.to_string());
        }
        StatusCode::ACCEPTED
    }

    async fn unavailable() -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    async fn slow() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    async fn serve(received: Received) -> String {
        let app = Router::new()
            .route("/retry", post(accept))
            .route("/down", post(unavailable))
            .route("/slow", post(slow))
            .with_state(received);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request(url: String) -> RetryRequest {
        RetryRequest {
            url,
            payload: RetryPayload {
                run_unique_id: Uuid::now_v7(),
                step: 0,
                workflow_id: Uuid::now_v7(),
            },
        }
    }

    fn invoker(timeout_secs: u64) -> HttpRetryInvoker {
        HttpRetryInvoker::new(&RetrySection {
            http_timeout_secs: timeout_secs,
            ..RetrySection::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_camel_case_payload() {
        let received = Received::default();
        let base = serve(received.clone()).await;
        let req = request(format!("{base}/retry"));

        invoker(5).invoke(&req).await.unwrap();

        let bodies = received.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["runUniqueId"], req.payload.run_unique_id.to_string());
        assert_eq!(bodies[0]["step"], 0);
        assert_eq!(bodies[0]["workflowId"], req.payload.workflow_id.to_string());
        let agents = received.agents.lock().unwrap();
        assert!(agents[0].starts_with("flho/"));
    }

    #[tokio::test]
    async fn non_success_status_is_transport_failure() {
        let base = serve(Received::default()).await;
        let err = invoker(5)
            .invoke(&request(format!("{base}/down")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn timeout_is_transport_failure() {
        let base = serve(Received::default()).await;
        let err = invoker(1)
            .invoke(&request(format!("{base}/slow")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
    }

    #[tokio::test]
    async fn unreachable_target_is_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = invoker(2)
            .invoke(&request(format!("http://{addr}/retry")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
    }
}
