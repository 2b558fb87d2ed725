//! Estimation Service — orchestrates the full estimation pipeline.
//!
//! Flow: validate input → encode document → compile prompt → invoke model →
//!       validate output → `EstimationResult`.
//!
//! Retry policy lives here and nowhere else:
//! - transient model failures (transport, timeout, 408/429/5xx) are retried
//!   with exponential backoff up to `max_invocation_attempts`;
//! - contract violations are retried with the same prompt up to
//!   `max_contract_attempts` in total, then surfaced with the last raw output;
//! - invalid input and encoding failures are never retried.
//!
//! The service holds no per-request state; concurrent calls share only the
//! read-only schema registry and the invoker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::EstimationFailure;
use crate::estimation::compiler::{compile, CompiledPrompt};
use crate::estimation::contract::{EstimationResult, Provenance};
use crate::estimation::encoder::encode;
use crate::estimation::input::{EstimationRequest, ValidatedRequest};
use crate::estimation::schema::{input_schema, output_schema, InputSchema, OutputSchema};
use crate::estimation::validator::validate;
use crate::llm_client::{LlmError, ModelInvoker, RawModelResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Model calls per contract attempt, first call included.
    pub max_invocation_attempts: u32,
    /// Full invoke+validate rounds before a contract violation is surfaced.
    pub max_contract_attempts: u32,
    /// First backoff delay; doubles on every further retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_invocation_attempts: 3,
            max_contract_attempts: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, …
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

/// Pipeline states. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Encoding,
    Compiling,
    Invoking,
    Validating,
    Succeeded,
    Failed,
}

struct StageTracker {
    estimate_id: Uuid,
    stage: Stage,
}

impl StageTracker {
    fn new(estimate_id: Uuid) -> Self {
        Self {
            estimate_id,
            stage: Stage::Idle,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!("Estimate {}: {:?} -> {:?}", self.estimate_id, self.stage, next);
        self.stage = next;
    }
}

pub struct EstimationService {
    invoker: Arc<dyn ModelInvoker>,
    input_schema: &'static InputSchema,
    output_schema: &'static OutputSchema,
    policy: RetryPolicy,
}

impl EstimationService {
    pub fn new(invoker: Arc<dyn ModelInvoker>, policy: RetryPolicy) -> Self {
        Self {
            invoker,
            input_schema: input_schema(),
            output_schema: output_schema(),
            policy,
        }
    }

    pub fn input_schema(&self) -> &'static InputSchema {
        self.input_schema
    }

    pub fn output_schema(&self) -> &'static OutputSchema {
        self.output_schema
    }

    /// Estimates a salary for the CV in `document` at `location`.
    pub async fn estimate(
        &self,
        document: Vec<u8>,
        media_type: &str,
        location: &str,
    ) -> Result<EstimationResult, EstimationFailure> {
        let estimate_id = Uuid::new_v4();
        let mut tracker = StageTracker::new(estimate_id);

        let outcome = self
            .run(
                &mut tracker,
                EstimationRequest::new(document, media_type, location),
            )
            .await;

        match &outcome {
            Ok(result) => {
                tracker.advance(Stage::Succeeded);
                info!(
                    "Estimate {} succeeded after {} model call(s): median {} {} (confidence {:.2})",
                    estimate_id,
                    result.provenance.attempts,
                    result.estimate.salary.breakdown.p50,
                    result.estimate.salary.currency,
                    result.estimate.salary.confidence
                );
            }
            Err(failure) => {
                tracker.advance(Stage::Failed);
                warn!("Estimate {} failed [{}]: {}", estimate_id, failure.code(), failure);
            }
        }
        outcome
    }

    async fn run(
        &self,
        tracker: &mut StageTracker,
        request: EstimationRequest,
    ) -> Result<EstimationResult, EstimationFailure> {
        let ValidatedRequest {
            document,
            media_type,
            location,
        } = request.validate(self.input_schema)?;

        info!(
            "Estimate {}: {} bytes of {} for '{}'",
            tracker.estimate_id,
            document.len(),
            media_type,
            location
        );

        tracker.advance(Stage::Encoding);
        let encoded = encode(&document, &media_type);
        // The transport string is the only copy from here on.
        drop(document);

        tracker.advance(Stage::Compiling);
        let prompt = compile(encoded, &location, self.output_schema);

        let max_contract_attempts = self.policy.max_contract_attempts.max(1);
        let mut model_calls = 0u32;
        let mut contract_attempt = 0u32;

        loop {
            contract_attempt += 1;

            tracker.advance(Stage::Invoking);
            let response = self.invoke_with_retry(&prompt, &mut model_calls).await?;

            tracker.advance(Stage::Validating);
            match validate(&response.output, self.output_schema) {
                Ok(estimate) => {
                    return Ok(EstimationResult {
                        estimate,
                        provenance: Provenance {
                            estimate_id: tracker.estimate_id,
                            contract_version: self.output_schema.version,
                            model: self.invoker.model().to_string(),
                            attempts: model_calls,
                            generated_at: Utc::now(),
                            usage: response.usage,
                        },
                    });
                }
                Err(failure) => {
                    if contract_attempt >= max_contract_attempts {
                        return Err(failure);
                    }
                    warn!(
                        "Estimate {}: contract attempt {}/{} failed, retrying: {}",
                        tracker.estimate_id, contract_attempt, max_contract_attempts, failure
                    );
                }
            }
        }
    }

    /// Calls the model, retrying transient failures with exponential backoff.
    async fn invoke_with_retry(
        &self,
        prompt: &CompiledPrompt,
        model_calls: &mut u32,
    ) -> Result<RawModelResponse, EstimationFailure> {
        let max_attempts = self.policy.max_invocation_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            *model_calls += 1;

            let error = match self.invoker.invoke(prompt, self.output_schema).await {
                Ok(response) => return Ok(response),
                Err(LlmError::Document(e)) => return Err(e.into()),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(EstimationFailure::ModelInvocation {
                    message: error.to_string(),
                    status: error.status(),
                    timed_out: matches!(error, LlmError::Timeout(_)),
                    attempts: attempt,
                });
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                "Model call attempt {} failed ({}), retrying after {}ms...",
                attempt,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Violation;
    use crate::estimation::contract::ContractVersion;
    use crate::estimation::encoder::EncodingError;
    use crate::estimation::test_support::{api_error, sample_payload, structured, ScriptedInvoker};
    use serde_json::json;

    const RESUME: &[u8] = b"Jane Doe\nBackend Engineer\n5 years backend engineering, Go, distributed systems";

    fn service(invoker: &Arc<ScriptedInvoker>) -> EstimationService {
        EstimationService::new(invoker.clone(), RetryPolicy::default())
    }

    fn payload_without_confidence() -> serde_json::Value {
        let mut payload = sample_payload();
        payload["salary"].as_object_mut().unwrap().remove("confidence");
        payload
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_berlin_backend_engineer_end_to_end() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![structured(sample_payload())]));
        let result = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap();

        let salary = &result.estimate.salary;
        assert_eq!(salary.currency.len(), 3);
        assert!(salary.currency.chars().all(|c| c.is_ascii_uppercase()));
        assert!(salary.breakdown.is_ordered());
        assert!((0.0..=1.0).contains(&salary.confidence));
        assert!(!result.estimate.analysis.candidate_strengths.is_empty());
        let skills = &result.estimate.recommendations.skill_improvement;
        assert!(!skills.is_empty());
        assert!(skills.iter().all(|s| !s.skill.is_empty() && !s.reason.is_empty()));

        assert_eq!(result.provenance.contract_version, ContractVersion::V3);
        assert_eq!(result.provenance.model, "scripted-model");
        assert_eq!(result.provenance.attempts, 1);
        assert_eq!(result.provenance.usage.input_tokens, 1000);

        assert_eq!(invoker.calls(), 1);
        assert!(invoker.instructions()[0].contains("Location: Berlin, Germany"));
    }

    #[tokio::test]
    async fn test_invalid_inputs_never_reach_the_model() {
        let cases: Vec<(Vec<u8>, &str, &str, &str)> = vec![
            (vec![b'x'; 6 * 1024 * 1024], "application/pdf", "Berlin", "document"),
            (b"\x89PNG".to_vec(), "image/png", "Berlin", "media_type"),
            (RESUME.to_vec(), "text/plain", "A", "location"),
        ];
        for (document, media_type, location, field) in cases {
            let invoker = Arc::new(ScriptedInvoker::new(vec![]));
            let err = service(&invoker)
                .estimate(document, media_type, location)
                .await
                .unwrap_err();
            match err {
                EstimationFailure::InvalidInput { errors } => {
                    assert_eq!(errors.len(), 1);
                    assert_eq!(errors[0].field, field);
                }
                other => panic!("expected InvalidInput, got {other:?}"),
            }
            assert_eq!(invoker.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_contract_violation_is_retried_once_then_surfaced() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            structured(payload_without_confidence()),
            structured(payload_without_confidence()),
        ]));
        let err = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap_err();

        match err {
            EstimationFailure::ContractViolation { violations, raw } => {
                assert_eq!(
                    violations,
                    vec![Violation::new("salary.confidence", "missing required field")]
                );
                assert!(raw.contains("breakdown"));
            }
            other => panic!("expected ContractViolation, got {other:?}"),
        }
        assert_eq!(invoker.calls(), 2);
        let prompts = invoker.instructions();
        assert_eq!(prompts[0], prompts[1], "retry must reuse the same input");
    }

    #[tokio::test]
    async fn test_contract_violation_then_success() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            structured(json!({"salaryRange": "80k", "confidence": 0.5, "reason": "?"})),
            structured(sample_payload()),
        ]));
        let result = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap();
        assert_eq!(result.provenance.attempts, 2);
    }

    #[tokio::test]
    async fn test_single_contract_attempt_policy_does_not_retry() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![structured(payload_without_confidence())]));
        let policy = RetryPolicy {
            max_contract_attempts: 1,
            ..RetryPolicy::default()
        };
        let err = EstimationService::new(invoker.clone(), policy)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_VIOLATION");
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            api_error(529),
            api_error(429),
            structured(sample_payload()),
        ]));
        let started = tokio::time::Instant::now();
        let result = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap();

        assert_eq!(result.provenance.attempts, 3);
        // 1s + 2s of virtual backoff
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_model_invocation_error() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            api_error(503),
            api_error(503),
            api_error(503),
        ]));
        let err = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap_err();
        match err {
            EstimationFailure::ModelInvocation {
                status,
                attempts,
                timed_out,
                ..
            } => {
                assert_eq!(status, Some(503));
                assert_eq!(attempts, 3);
                assert!(!timed_out);
            }
            other => panic!("expected ModelInvocation, got {other:?}"),
        }
        assert_eq!(invoker.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_reported_as_such() {
        let timeout = || Err(LlmError::Timeout(Duration::from_secs(60)));
        let invoker = Arc::new(ScriptedInvoker::new(vec![timeout(), timeout(), timeout()]));
        let err = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EstimationFailure::ModelInvocation { timed_out: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![api_error(401)]));
        let err = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EstimationFailure::ModelInvocation {
                status: Some(401),
                attempts: 1,
                ..
            }
        ));
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_document_errors_surface_as_encoding_failures() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![Err(LlmError::Document(
            EncodingError::MissingBase64Marker,
        ))]));
        let err = service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENCODING_ERROR");
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_location_reaches_the_prompt_verbatim() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![structured(sample_payload())]));
        service(&invoker)
            .estimate(RESUME.to_vec(), "text/plain", "  Berlin, Germany ")
            .await
            .unwrap();
        assert!(invoker.instructions()[0].contains("Location:   Berlin, Germany \n"));
    }

    #[tokio::test]
    async fn test_latin1_text_cv_is_invalid_input() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![]));
        let err = service(&invoker)
            .estimate(
                b"Jos\xe9 M\xfcller\nBackend Engineer".to_vec(),
                "text/plain",
                "Zürich",
            )
            .await
            .unwrap_err();
        match err {
            EstimationFailure::InvalidInput { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "document");
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        assert_eq!(invoker.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_estimates_are_independent() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            structured(sample_payload()),
            structured(sample_payload()),
        ]));
        let service = Arc::new(service(&invoker));

        let a = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .estimate(RESUME.to_vec(), "text/plain", "Berlin, Germany")
                    .await
            })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .estimate(RESUME.to_vec(), "text/plain", "Munich, Germany")
                    .await
            })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_ne!(a.provenance.estimate_id, b.provenance.estimate_id);
        assert_eq!(invoker.calls(), 2);
        let prompts = invoker.instructions();
        assert!(prompts.iter().any(|p| p.contains("Location: Berlin, Germany")));
        assert!(prompts.iter().any(|p| p.contains("Location: Munich, Germany")));
    }
}
