//! Fixtures and a scripted `ModelInvoker` shared by the estimation tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::estimation::compiler::CompiledPrompt;
use crate::estimation::contract::{SalaryEstimate, TokenUsage};
use crate::estimation::schema::OutputSchema;
use crate::llm_client::{LlmError, ModelInvoker, ModelOutput, RawModelResponse};

/// A conforming answer for a Berlin backend engineer.
pub fn sample_payload() -> Value {
    json!({
        "salary": {
            "range": "€68,000 - €85,000",
            "currency": "EUR",
            "confidence": 0.78,
            "breakdown": {
                "25th_percentile": 68000,
                "50th_percentile_median": 76000,
                "75th_percentile": 85000
            }
        },
        "analysis": {
            "marketSummary": "Berlin has steady demand for backend engineers with Go and distributed systems experience.",
            "candidateStrengths": [
                "5 years of backend engineering",
                "Production Go experience",
                "Distributed systems design"
            ]
        },
        "recommendations": {
            "skillImprovement": [
                {"skill": "Kubernetes", "reason": "Platform skills command a premium in Berlin scale-ups."},
                {"skill": "Rust", "reason": "Systems roles using Rust pay above the backend median."}
            ],
            "negotiationTips": [
                "Anchor on the 75th percentile given distributed systems depth.",
                "Ask for the full compensation breakdown, including equity."
            ]
        }
    })
}

pub fn sample_estimate() -> SalaryEstimate {
    serde_json::from_value(sample_payload()).expect("sample payload matches the contract")
}

pub fn structured(payload: Value) -> Result<RawModelResponse, LlmError> {
    Ok(RawModelResponse {
        output: ModelOutput::Structured(payload),
        usage: TokenUsage {
            input_tokens: 1000,
            output_tokens: 400,
        },
    })
}

pub fn api_error(status: u16) -> Result<RawModelResponse, LlmError> {
    Err(LlmError::Api {
        status,
        message: format!("upstream returned {status}"),
    })
}

/// Replays canned responses in order and counts calls.
pub struct ScriptedInvoker {
    responses: Mutex<VecDeque<Result<RawModelResponse, LlmError>>>,
    calls: AtomicU32,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    pub fn new(responses: Vec<Result<RawModelResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instruction text of every prompt received, in call order.
    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn invoke(
        &self,
        prompt: &CompiledPrompt,
        _schema: &OutputSchema,
    ) -> Result<RawModelResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .unwrap()
            .push(prompt.instructions.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedInvoker ran out of responses")
    }
}
