//! Axum route handlers for the Salary Estimation API.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::EstimationFailure;
use crate::estimation::contract::ContractVersion;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct EstimateQuery {
    /// Contract the caller is pinned to. Defaults to the current one.
    pub version: Option<ContractVersion>,
}

/// Parts of the upload form. Absent parts stay empty and are reported by
/// input validation, so every problem comes back in one response.
#[derive(Debug, Default)]
struct EstimateForm {
    document: Vec<u8>,
    media_type: String,
    location: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/salary/estimate
///
/// Multipart form: `cv` (PDF or plain text, declared content type is used)
/// and `location`. Returns the estimate with its provenance.
pub async fn handle_estimate(
    State(state): State<AppState>,
    query: Result<Query<EstimateQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, EstimationFailure> {
    let Query(query) = query
        .map_err(|rejection| EstimationFailure::invalid_field("version", rejection.body_text()))?;
    let multipart = multipart
        .map_err(|rejection| EstimationFailure::invalid_field("form", rejection.body_text()))?;
    let form = read_form(multipart).await?;

    let mut result = state
        .estimator
        .estimate(form.document, &form.media_type, &form.location)
        .await?;

    let version = query.version.unwrap_or(ContractVersion::CURRENT);
    if version == ContractVersion::CURRENT {
        return Ok(Json(json!(result)));
    }

    result.provenance.contract_version = version;
    let mut body = result.estimate.downgrade(version);
    body["provenance"] = json!(result.provenance);
    Ok(Json(body))
}

/// GET /api/v1/salary/schema
///
/// The output contract as sent to the model, and the accepted upload.
pub async fn handle_schema(State(state): State<AppState>) -> Json<Value> {
    let schema = state.estimator.output_schema();
    Json(json!({
        "contractVersion": schema.version,
        "name": schema.name,
        "jsonSchema": schema.to_json_schema(),
        "input": state.estimator.input_schema().describe(),
    }))
}

async fn read_form(mut multipart: Multipart) -> Result<EstimateForm, EstimationFailure> {
    let mut form = EstimateForm::default();

    while let Some(field) = multipart.next_field().await.map_err(form_failure)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cv" => {
                form.media_type = field.content_type().unwrap_or_default().to_string();
                form.document = field.bytes().await.map_err(form_failure)?.to_vec();
            }
            "location" => {
                form.location = field.text().await.map_err(form_failure)?;
            }
            _ => {}
        }
    }

    Ok(form)
}

fn form_failure(e: MultipartError) -> EstimationFailure {
    if e.status().is_client_error() {
        EstimationFailure::invalid_field("form", e.body_text())
    } else {
        EstimationFailure::Unknown(e.body_text())
    }
}
