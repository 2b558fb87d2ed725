use std::sync::Arc;

use crate::estimation::service::EstimationService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub estimator: Arc<EstimationService>,
}
