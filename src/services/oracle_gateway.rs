//! Gateway wrapping every oracle call with retry, timeout, cancellation and
//! reply validation.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::domain::errors::{OracleCallError, OracleError};
use crate::domain::models::{PipelineStage, StageTimeouts};
use crate::domain::ports::{GenerationOracle, OracleRequest};
use crate::services::retry::RetryPolicy;

/// Single entry point the role adapters use to talk to the oracle.
pub struct OracleGateway {
    oracle: Arc<dyn GenerationOracle>,
    retry: RetryPolicy,
    timeouts: StageTimeouts,
}

impl OracleGateway {
    /// Create a gateway using the default stage timeouts.
    ///
    /// # Arguments
    ///
    /// * `oracle` - Backend receiving the requests
    /// * `retry` - Policy applied to transient failures
    pub fn new(oracle: Arc<dyn GenerationOracle>, retry: RetryPolicy) -> Self {
        Self {
            oracle,
            retry,
            timeouts: StageTimeouts::default(),
        }
    }

    /// Per-stage bound on a single oracle attempt.
    pub fn with_stage_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Submit `request` and decode the reply into `T`.
    ///
    /// Timeouts are transient and retried. A reply that does not decode into
    /// `T` is [`OracleError::Malformed`]. Cancellation wins over everything,
    /// including a pending backoff sleep.
    ///
    /// # Errors
    ///
    /// Returns [`OracleCallError::Cancelled`] when `cancel` fires, otherwise
    /// the last [`OracleError`] once retries are spent or on a
    /// non-retryable failure.
    #[instrument(skip(self, request, cancel), fields(stage = stage.get(), role = request.role.as_str()))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        stage: PipelineStage,
        request: OracleRequest,
        cancel: &CancellationToken,
    ) -> Result<T, OracleCallError> {
        let limit = self.timeouts.get(stage);
        let request = &request;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("oracle call cancelled");
                Err(OracleCallError::Cancelled)
            }
            result = self.retry.execute(move |attempt| self.attempt::<T>(request, limit, attempt)) => {
                result.map_err(OracleCallError::from)
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &OracleRequest,
        limit: Option<Duration>,
        attempt: u32,
    ) -> Result<T, OracleError> {
        debug!(attempt, oracle = self.oracle.name(), "submitting oracle request");

        let submission = self.oracle.submit(request);
        let value = match limit {
            Some(limit) => tokio::time::timeout(limit, submission)
                .await
                .map_err(|_| {
                    OracleError::Transient(format!(
                        "no reply within {}s",
                        limit.as_secs_f64()
                    ))
                })??,
            None => submission.await?,
        };

        serde_json::from_value(value).map_err(|e| OracleError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracle::ScriptedOracle;
    use crate::domain::ports::Role;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        answer: u32,
    }

    fn request() -> OracleRequest {
        OracleRequest::json(Role::Verifying, "check", "payload")
    }

    #[tokio::test]
    async fn test_decodes_reply() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(Role::Verifying, Ok(json!({"answer": 42})));
        let gateway = OracleGateway::new(oracle, RetryPolicy::immediate(3));

        let reply: Reply = gateway
            .request(PipelineStage::VERIFICATION, request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, Reply { answer: 42 });
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_malformed_and_not_retried() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(Role::Verifying, Ok(json!({"unexpected": true})));
        oracle.push(Role::Verifying, Ok(json!({"answer": 1})));
        let gateway = OracleGateway::new(oracle.clone(), RetryPolicy::immediate(3));

        let result: Result<Reply, _> = gateway
            .request(PipelineStage::VERIFICATION, request(), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(OracleCallError::Oracle(OracleError::Malformed(_)))
        ));
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(Role::Verifying, Err(OracleError::Transient("429".into())));
        oracle.push(Role::Verifying, Ok(json!({"answer": 7})));
        let gateway = OracleGateway::new(oracle.clone(), RetryPolicy::immediate(3));

        let reply: Reply = gateway
            .request(PipelineStage::VERIFICATION, request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.answer, 7);
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let oracle = Arc::new(ScriptedOracle::new().with_latency(Duration::from_secs(30)));
        oracle.push(Role::Verifying, Ok(json!({"answer": 1})));
        oracle.push(Role::Verifying, Ok(json!({"answer": 2})));
        let gateway = OracleGateway::new(oracle.clone(), RetryPolicy::immediate(2))
            .with_stage_timeouts(StageTimeouts::new([(3, 5)]));

        let result: Result<Reply, _> = gateway
            .request(PipelineStage::VERIFICATION, request(), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(OracleCallError::Oracle(OracleError::Transient(_)))
        ));
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(Role::Verifying, Ok(json!({"answer": 1})));
        let gateway = OracleGateway::new(oracle.clone(), RetryPolicy::immediate(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<Reply, _> = gateway
            .request(PipelineStage::VERIFICATION, request(), &cancel)
            .await;
        assert!(matches!(result, Err(OracleCallError::Cancelled)));
        assert_eq!(oracle.call_count(), 0);
    }
}
