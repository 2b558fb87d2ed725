//! Salary estimation pipeline.
//!
//! A CV and a location go in; a validated `SalaryEstimate` comes out.
//!
//! ```text
//! input ─▶ encoder ─▶ compiler ─▶ llm_client ─▶ validator ─▶ EstimationResult
//!                         ▲                          ▲
//!                         └──────── schema ──────────┘
//! ```
//!
//! `schema` is the single source of truth for the output contract: the
//! compiler renders its field guide into the prompt, the model client sends
//! its JSON Schema rendering, and the validator walks it.

pub mod compiler;
pub mod contract;
pub mod encoder;
pub mod handlers;
pub mod input;
pub mod prompts;
pub mod schema;
pub mod service;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;
