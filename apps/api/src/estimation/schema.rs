//! Schema Registry — frozen descriptors for the estimation input and output.
//!
//! `OUTPUT_SCHEMA` is the single source of truth for the output contract:
//! - the prompt compiler renders its field guide from it,
//! - the LLM client sends its JSON Schema rendering as the tool input schema,
//! - the validator walks it to check the model's answer.
//!
//! Both descriptors are `static`; there is no runtime mutation path.

use serde_json::{json, Map, Value};

use crate::estimation::contract::ContractVersion;

/// Primitive shape of a single field.
#[derive(Debug)]
pub enum FieldKind {
    /// String with at least `min_chars` characters after trimming.
    Text { min_chars: usize },
    /// Three uppercase ASCII letters (ISO-4217 style).
    CurrencyCode,
    /// Finite number within optional inclusive bounds.
    Number { min: Option<f64>, max: Option<f64> },
    Object(&'static [FieldSpec]),
    List {
        item: &'static FieldKind,
        min_items: usize,
    },
}

/// A required field: its wire name, shape, and what it means.
/// `purpose` is written for the model, not just for humans.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub purpose: &'static str,
}

impl FieldKind {
    /// Short type label used in the prompt field guide.
    pub fn label(&self) -> String {
        match self {
            FieldKind::Text { .. } => "string".to_string(),
            FieldKind::CurrencyCode => "3-letter currency code".to_string(),
            FieldKind::Number { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("number between {lo} and {hi}"),
                (Some(lo), None) => format!("number >= {lo}"),
                (None, Some(hi)) => format!("number <= {hi}"),
                (None, None) => "number".to_string(),
            },
            FieldKind::Object(_) => "object".to_string(),
            FieldKind::List { item, min_items } => {
                let item = match item {
                    FieldKind::Object(_) => "objects".to_string(),
                    FieldKind::Text { .. } => "strings".to_string(),
                    other => other.label(),
                };
                format!("array of {item}, at least {min_items}")
            }
        }
    }

    fn to_json_schema(&self, description: Option<&str>) -> Value {
        let mut node = match self {
            FieldKind::Text { min_chars } => {
                let mut node = json!({ "type": "string" });
                if *min_chars > 0 {
                    node["minLength"] = json!(min_chars);
                }
                node
            }
            FieldKind::CurrencyCode => json!({ "type": "string", "pattern": "^[A-Z]{3}$" }),
            FieldKind::Number { min, max } => {
                let mut node = json!({ "type": "number" });
                if let Some(min) = min {
                    node["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    node["maximum"] = json!(max);
                }
                node
            }
            FieldKind::Object(fields) => object_schema(fields),
            FieldKind::List { item, min_items } => json!({
                "type": "array",
                "items": item.to_json_schema(None),
                "minItems": min_items,
            }),
        };
        if let Some(description) = description {
            node["description"] = json!(description);
        }
        node
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(
            field.name.to_string(),
            field.kind.to_json_schema(Some(field.purpose)),
        );
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Output schema
// ────────────────────────────────────────────────────────────────────────────

pub struct OutputSchema {
    pub version: ContractVersion,
    /// Tool name used for schema-guided generation.
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

/// One line of the prompt field guide, e.g. `salary.confidence`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGuideLine {
    pub path: String,
    pub label: String,
    pub purpose: &'static str,
}

impl OutputSchema {
    /// JSON Schema rendering of the contract, sent to the model as a structural constraint.
    pub fn to_json_schema(&self) -> Value {
        let mut schema = object_schema(self.fields);
        schema["title"] = json!(self.name);
        schema["description"] = json!(self.description);
        schema
    }

    /// Every field (nested ones included) in declaration order, with its dotted path.
    /// Array items are addressed as `field[]`.
    pub fn field_guide(&self) -> Vec<FieldGuideLine> {
        let mut lines = Vec::new();
        collect_guide(self.fields, "", &mut lines);
        lines
    }
}

fn collect_guide(fields: &[FieldSpec], prefix: &str, out: &mut Vec<FieldGuideLine>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        out.push(FieldGuideLine {
            path: path.clone(),
            label: field.kind.label(),
            purpose: field.purpose,
        });
        match &field.kind {
            FieldKind::Object(children) => collect_guide(children, &path, out),
            FieldKind::List {
                item: FieldKind::Object(children),
                ..
            } => collect_guide(children, &format!("{path}[]"), out),
            _ => {}
        }
    }
}

const NON_EMPTY: FieldKind = FieldKind::Text { min_chars: 1 };

pub static OUTPUT_SCHEMA: OutputSchema = OutputSchema {
    version: ContractVersion::V3,
    name: "record_salary_estimate",
    description: "Records a structured salary estimate, market analysis and recommendations \
        for the candidate described by the attached CV.",
    fields: &[
        FieldSpec {
            name: "salary",
            purpose: "The salary estimate for the candidate in the given location.",
            kind: FieldKind::Object(&[
                FieldSpec {
                    name: "range",
                    purpose: "The estimated salary range in the local currency \
                        (e.g., \"$100,000 - $120,000\").",
                    kind: NON_EMPTY,
                },
                FieldSpec {
                    name: "currency",
                    purpose: "The currency code for the estimated salary range (e.g., \"USD\", \"EUR\").",
                    kind: FieldKind::CurrencyCode,
                },
                FieldSpec {
                    name: "confidence",
                    purpose: "A confidence score from 0 to 1 indicating the reliability of the estimate.",
                    kind: FieldKind::Number {
                        min: Some(0.0),
                        max: Some(1.0),
                    },
                },
                FieldSpec {
                    name: "breakdown",
                    purpose: "A breakdown of the salary range into percentiles, in ascending order.",
                    kind: FieldKind::Object(&[
                        FieldSpec {
                            name: "25th_percentile",
                            purpose: "The 25th percentile of the salary range.",
                            kind: FieldKind::Number {
                                min: Some(0.0),
                                max: None,
                            },
                        },
                        FieldSpec {
                            name: "50th_percentile_median",
                            purpose: "The 50th percentile (median) of the salary range.",
                            kind: FieldKind::Number {
                                min: Some(0.0),
                                max: None,
                            },
                        },
                        FieldSpec {
                            name: "75th_percentile",
                            purpose: "The 75th percentile of the salary range.",
                            kind: FieldKind::Number {
                                min: Some(0.0),
                                max: None,
                            },
                        },
                    ]),
                },
            ]),
        },
        FieldSpec {
            name: "analysis",
            purpose: "Market analysis supporting the estimate.",
            kind: FieldKind::Object(&[
                FieldSpec {
                    name: "marketSummary",
                    purpose: "A brief summary of the job market for the candidate's likely role \
                        in the specified location.",
                    kind: NON_EMPTY,
                },
                FieldSpec {
                    name: "candidateStrengths",
                    purpose: "Key strengths identified from the CV that support the estimate.",
                    kind: FieldKind::List {
                        item: &NON_EMPTY,
                        min_items: 1,
                    },
                },
            ]),
        },
        FieldSpec {
            name: "recommendations",
            purpose: "Actionable advice for increasing salary potential.",
            kind: FieldKind::Object(&[
                FieldSpec {
                    name: "skillImprovement",
                    purpose: "Skills to learn or improve to increase salary.",
                    kind: FieldKind::List {
                        item: &FieldKind::Object(&[
                            FieldSpec {
                                name: "skill",
                                purpose: "A specific skill to learn or improve.",
                                kind: NON_EMPTY,
                            },
                            FieldSpec {
                                name: "reason",
                                purpose: "Why this skill will boost salary potential.",
                                kind: NON_EMPTY,
                            },
                        ]),
                        min_items: 1,
                    },
                },
                FieldSpec {
                    name: "negotiationTips",
                    purpose: "Actionable tips for salary negotiation, tailored to the candidate.",
                    kind: FieldKind::List {
                        item: &NON_EMPTY,
                        min_items: 1,
                    },
                },
            ]),
        },
    ],
};

pub fn output_schema() -> &'static OutputSchema {
    &OUTPUT_SCHEMA
}

// ────────────────────────────────────────────────────────────────────────────
// Input schema
// ────────────────────────────────────────────────────────────────────────────

pub struct InputSchema {
    pub fields: &'static [FieldSpec],
    pub max_document_bytes: usize,
    pub allowed_media_types: &'static [&'static str],
    pub min_location_chars: usize,
}

pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_MEDIA_TYPES: &[&str] = &["application/pdf", "text/plain"];
pub const MIN_LOCATION_CHARS: usize = 2;

pub static INPUT_SCHEMA: InputSchema = InputSchema {
    fields: &[
        FieldSpec {
            name: "document",
            purpose: "The candidate's CV as a data URI with a MIME type and Base64 encoding: \
                'data:<mimetype>;base64,<encoded_data>'.",
            kind: FieldKind::Text { min_chars: 1 },
        },
        FieldSpec {
            name: "location",
            purpose: "The location where the job is based.",
            kind: FieldKind::Text {
                min_chars: MIN_LOCATION_CHARS,
            },
        },
    ],
    max_document_bytes: MAX_DOCUMENT_BYTES,
    allowed_media_types: ALLOWED_MEDIA_TYPES,
    min_location_chars: MIN_LOCATION_CHARS,
};

impl InputSchema {
    /// Upload rules and field purposes, as published by the schema endpoint.
    pub fn describe(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "type": f.kind.label(), "purpose": f.purpose }))
            .collect();
        json!({
            "fields": fields,
            "maxDocumentBytes": self.max_document_bytes,
            "allowedMediaTypes": self.allowed_media_types,
            "minLocationChars": self.min_location_chars,
        })
    }
}

pub fn input_schema() -> &'static InputSchema {
    &INPUT_SCHEMA
}
