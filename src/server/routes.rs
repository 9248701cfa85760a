//! Axum route handlers for the aether HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`                   : Status, version and loaded data counts
//! - `POST /api/formulation/generate` : Runs the pipeline for one profile and target
//! - `POST /api/formulation/validate` : Validates a caller-supplied draft formula

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::emotion::{AffectInterpreter, LexiconInterpreter, DEFAULT_AFFECT};
use crate::formulation::{FormulationEngine, PipelineDiagnostics};
use crate::types::profile::DEFAULT_TEMPERATURE_C;
use crate::types::{
    BiochemicalProfile, ComplianceResult, DraftFormula, EmotionalTarget, Formula, SkinType,
};

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Loaded pipeline, shared read-only across requests.
    pub engine: Arc<FormulationEngine>,
    /// Derives valence/arousal when a request only carries a prompt.
    pub interpreter: Arc<dyn AffectInterpreter>,
}

impl AppState {
    pub fn new(engine: Arc<FormulationEngine>) -> Self {
        Self {
            engine,
            interpreter: Arc::new(LexiconInterpreter::new()),
        }
    }

    pub fn with_interpreter(mut self, interpreter: Arc<dyn AffectInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }
}

/// Body of `POST /api/formulation/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub profile_id: Option<String>,
    pub ph_value: f64,
    pub skin_type: SkinType,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub valence: Option<f64>,
    #[serde(default)]
    pub arousal: Option<f64>,
    /// Include pipeline diagnostics in the response.
    #[serde(default)]
    pub diagnostics: bool,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE_C
}

impl GenerateRequest {
    pub fn profile(&self) -> BiochemicalProfile {
        BiochemicalProfile::new(self.ph_value, self.skin_type, self.temperature)
    }

    /// Explicit values win; missing ones come from the prompt, then the default.
    pub fn target(&self, interpreter: &dyn AffectInterpreter) -> EmotionalTarget {
        let prompt = self.prompt.as_deref().filter(|p| !p.trim().is_empty());
        let derived = match (self.valence, self.arousal, prompt) {
            (Some(_), Some(_), _) => DEFAULT_AFFECT,
            (_, _, Some(prompt)) => interpreter.interpret(prompt),
            _ => DEFAULT_AFFECT,
        };
        let target = EmotionalTarget::new(
            self.valence.unwrap_or(derived.0),
            self.arousal.unwrap_or(derived.1),
        );
        match prompt {
            Some(prompt) => target.with_prompt(prompt),
            None => target,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub formula: Formula,
    pub compliance: ComplianceResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<PipelineDiagnostics>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub formula: DraftFormula,
    pub compliance: ComplianceResult,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/formulation/generate", post(generate_handler))
        .route("/api/formulation/validate", post(validate_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "aether",
        "retrieval_mode": state.engine.retrieval_mode(),
        "ingredients": state.engine.catalog().len(),
        "rules": state.engine.corpus().len(),
    }))
}

/// POST /api/formulation/generate: run the full pipeline.
///
/// The formula is returned even when `compliance.valid` is false; callers
/// decide how to present it.
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<Value>)> {
    let profile = request.profile();
    let target = request.target(state.interpreter.as_ref());
    tracing::debug!(
        profile_id = request.profile_id.as_deref().unwrap_or("-"),
        valence = target.valence(),
        arousal = target.arousal(),
        "generate request"
    );

    let output = state
        .engine
        .generate_formula_traced(&profile, &target)
        .await
        .map_err(|e| {
            tracing::error!("Formulation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        })?;

    Ok(Json(GenerateResponse {
        profile_id: request.profile_id,
        formula: output.formula,
        compliance: output.compliance,
        diagnostics: request.diagnostics.then_some(output.diagnostics),
    }))
}

/// POST /api/formulation/validate: check a draft against the ceilings.
async fn validate_handler(
    State(state): State<AppState>,
    Json(draft): Json<DraftFormula>,
) -> Result<Json<ValidateResponse>, (StatusCode, Json<Value>)> {
    if draft.ingredient_count() == 0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": "Formula has no ingredients"})),
        ));
    }
    let (formula, compliance) = state.engine.validate(&draft);
    Ok(Json(ValidateResponse {
        formula,
        compliance,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
