pub mod routes;

use crate::errors::EngineError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/pricing/calculate", post(routes::calculate))
        .route("/api/pricing/calculate-auto", post(routes::calculate_auto))
        .route("/api/pricing/simulate", post(routes::simulate))
        .route("/api/pricing/history", get(routes::get_pricing_history))
        .route("/api/rates/current", get(routes::get_current_rate))
        .route("/api/rates/historical", get(routes::get_historical_rates))
        .route("/api/rates/refresh", post(routes::refresh_rate))
        .route("/api/volatility/calculate", post(routes::calculate_volatility))
        .route("/api/volatility/{pair}", get(routes::get_volatility))
        .route("/api/health", get(routes::get_health))
        .route("/api/counters", get(routes::get_counters))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

// Malformed bodies and query strings answer with the same error shape as
// every other validation failure.
impl From<JsonRejection> for EngineError {
    fn from(rejection: JsonRejection) -> Self {
        EngineError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for EngineError {
    fn from(rejection: QueryRejection) -> Self {
        EngineError::invalid_input(rejection.body_text())
    }
}

/// Error body: `{"error": kind, "message": text}` with a per-kind status.
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let resp = EngineError::invalid_input("notional_amount must be positive").into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = EngineError::InsufficientData { available: 12, required: 30 }.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = EngineError::rate_unavailable("USD/XXX").into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = EngineError::Network("timeout".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = EngineError::Database("locked".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_rejections_use_error_body() {
        let rejection = Json::<crate::state::PricingInput>::from_bytes(
            br#"{"spot_rate":19.0,"time_to_maturity_years":0.25,"volatility":0.2,
                "domestic_rate":0.04,"foreign_rate":0.07,"notional_amount":1000000.0,
                "option_type":"straddle"}"#,
        )
        .unwrap_err();
        let err = EngineError::from(rejection);
        assert!(matches!(err, EngineError::InvalidInput(ref m) if m.contains("straddle")), "{err}");

        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid_input");

        let uri: axum::http::Uri = "/api/rates/current?base=USD".parse().unwrap();
        let rejection = axum::extract::Query::<routes::PairQuery>::try_from_uri(&uri).unwrap_err();
        assert!(matches!(EngineError::from(rejection), EngineError::InvalidInput(_)));
    }
}
