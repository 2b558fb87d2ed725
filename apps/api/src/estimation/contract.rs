//! Output Contract — the typed salary estimate returned to consumers.
//!
//! The wire shape (camelCase keys, percentile keys spelled out) is shared with
//! the schema registry: `schema::OUTPUT_SCHEMA` describes exactly these fields.
//! A test in `schema.rs` keeps the two from drifting apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Contract versions
// ────────────────────────────────────────────────────────────────────────────

/// Successive output contracts, from the first range-only shape to the
/// canonical percentile/analysis/recommendations shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractVersion {
    /// `{salaryRange, confidence, reason}`
    V1,
    /// V1 + `currency` + a single `skillRecommendation`
    V2,
    /// Canonical: salary with percentile breakdown, analysis, recommendations.
    V3,
}

impl ContractVersion {
    pub const CURRENT: ContractVersion = ContractVersion::V3;

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractVersion::V1 => "v1",
            ContractVersion::V2 => "v2",
            ContractVersion::V3 => "v3",
        }
    }
}

impl std::fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Canonical (V3) contract
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryEstimate {
    pub salary: Salary,
    pub analysis: Analysis,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Salary {
    /// Human-readable range in local currency, e.g. "€70,000 - €85,000".
    pub range: String,
    /// Three-letter currency code, e.g. "EUR".
    pub currency: String,
    /// 0.0 – 1.0
    pub confidence: f64,
    pub breakdown: PercentileBreakdown,
}

/// p25 ≤ p50 ≤ p75, enforced by the validator and never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBreakdown {
    #[serde(rename = "25th_percentile")]
    pub p25: f64,
    #[serde(rename = "50th_percentile_median")]
    pub p50: f64,
    #[serde(rename = "75th_percentile")]
    pub p75: f64,
}

impl PercentileBreakdown {
    pub fn is_ordered(&self) -> bool {
        self.p25 <= self.p50 && self.p50 <= self.p75
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub market_summary: String,
    pub candidate_strengths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub skill_improvement: Vec<SkillImprovement>,
    pub negotiation_tips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillImprovement {
    pub skill: String,
    pub reason: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Result + provenance
// ────────────────────────────────────────────────────────────────────────────

/// Token counts reported by the model provider for the successful call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub estimate_id: Uuid,
    pub contract_version: ContractVersion,
    pub model: String,
    /// Model calls made for this estimate, including failed ones.
    pub attempts: u32,
    pub generated_at: DateTime<Utc>,
    pub usage: TokenUsage,
}

/// Success value of `EstimationService::estimate`. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationResult {
    #[serde(flatten)]
    pub estimate: SalaryEstimate,
    pub provenance: Provenance,
}

// ────────────────────────────────────────────────────────────────────────────
// Legacy contracts
// ────────────────────────────────────────────────────────────────────────────

const V1_KEYS: &[&str] = &["salaryRange", "confidence", "reason"];
const V2_KEYS: &[&str] = &[
    "salaryRange",
    "currency",
    "confidence",
    "reason",
    "skillRecommendation",
];

/// Returns the legacy contract a payload looks like, if any.
/// Used for drift diagnostics only; legacy payloads are never accepted as results.
pub fn detect_legacy_shape(payload: &Value) -> Option<ContractVersion> {
    let object = payload.as_object()?;
    if object.contains_key("salary") {
        return None;
    }
    if V2_KEYS.iter().all(|k| object.contains_key(*k)) {
        Some(ContractVersion::V2)
    } else if V1_KEYS.iter().all(|k| object.contains_key(*k)) {
        Some(ContractVersion::V1)
    } else {
        None
    }
}

impl SalaryEstimate {
    /// Renders this estimate for a consumer pinned to an older contract.
    ///
    /// Fields the older contract has no slot for go under `extensions` so
    /// nothing is lost on the way down.
    pub fn downgrade(&self, version: ContractVersion) -> Value {
        let reason = self.analysis.market_summary.clone();
        match version {
            ContractVersion::V3 => json!(self),
            ContractVersion::V1 => {
                let mut extensions = Map::new();
                extensions.insert("currency".into(), json!(self.salary.currency));
                extensions.insert("breakdown".into(), json!(self.salary.breakdown));
                extensions.insert("analysis".into(), json!(self.analysis));
                extensions.insert("recommendations".into(), json!(self.recommendations));
                json!({
                    "salaryRange": self.salary.range,
                    "confidence": self.salary.confidence,
                    "reason": reason,
                    "extensions": extensions,
                })
            }
            ContractVersion::V2 => {
                let mut skills = self.recommendations.skill_improvement.iter();
                let primary = skills.next();
                let mut extensions = Map::new();
                extensions.insert("breakdown".into(), json!(self.salary.breakdown));
                extensions.insert("analysis".into(), json!(self.analysis));
                extensions.insert(
                    "additionalSkillImprovement".into(),
                    json!(skills.collect::<Vec<_>>()),
                );
                extensions.insert(
                    "negotiationTips".into(),
                    json!(self.recommendations.negotiation_tips),
                );
                json!({
                    "salaryRange": self.salary.range,
                    "currency": self.salary.currency,
                    "confidence": self.salary.confidence,
                    "reason": reason,
                    "skillRecommendation": primary,
                    "extensions": extensions,
                })
            }
        }
    }
}
