use axum::{
    routing::{get, post},
    Router,
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Json, State},
    http::{header, HeaderMap, Method, StatusCode},
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Result, AppError};
use crate::api::models::{ExtractRequest, HealthResponse, SummarizeRequest, SummarizeResponse};
use crate::extract::{ExtractedPage, ExtractionPolicy};
use crate::limiter::RateLimitDecision;
use crate::prompt;
use crate::validator::ValidationError;
use crate::AppState;

/// Largest HTML document accepted by `/api/extract`. Leaves room for markup
/// around a page at the policy's default 50,000 character limit.
pub const EXTRACT_BODY_LIMIT: usize = 512 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/summarize",
            post(summarize_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/extract",
            post(extract_handler).layer(DefaultBodyLimit::max(EXTRACT_BODY_LIMIT)),
        )
        .route("/api/extraction-policy", get(extraction_policy_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(app_state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(86_400))
}

/// Picks the rate-limit key for a request: the first `X-Forwarded-For` hop
/// when trusted, then the peer address.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first) = forwarded {
            return first.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

async fn summarize_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SummarizeResponse>> {
    let client = client_identifier(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );
    let start_time = Instant::now();

    // Set an overall timeout for the entire handler
    let result = tokio::time::timeout(
        state.config.request_timeout(),
        process_summarize_request(&state, &client, &body),
    ).await;

    let elapsed = start_time.elapsed();

    match result {
        Ok(Ok(response)) => {
            info!(%client, ?elapsed, summary_chars = response.summary.chars().count(), "Summary generated");
            Ok(Json(response))
        }
        Ok(Err(err)) => {
            warn!(
                %client,
                ?elapsed,
                status = err.status_code().as_u16(),
                error = %err,
                "Summarize request failed"
            );
            Err(err)
        }
        Err(_) => {
            warn!(%client, ?elapsed, "Summarize request timed out");
            Err(AppError::Timeout)
        }
    }
}

async fn process_summarize_request(
    state: &AppState,
    client: &str,
    body: &[u8],
) -> Result<SummarizeResponse> {
    if let RateLimitDecision::Limited { retry_after } = state.limiter.check(client).await {
        return Err(AppError::RateLimited { retry_after });
    }

    let value = state.validator.validate_bytes(body)?;
    let req: SummarizeRequest = serde_json::from_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to decode request: {}", e)))?;

    let messages = prompt::compose(&req, state.config.provider.content_budget_chars);
    debug!(
        url = ?req.url,
        content_chars = req.content.chars().count(),
        custom_prompt = req.custom_prompt.is_some(),
        "Built provider request"
    );

    let summary = state.llm.complete(&messages).await?;
    Ok(SummarizeResponse { summary })
}

async fn extract_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExtractedPage>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MissingBody.into());
    }
    let req: ExtractRequest =
        serde_json::from_slice(&body).map_err(|_| ValidationError::MalformedJson)?;
    if req.html.trim().is_empty() {
        return Err(ValidationError::MissingHtml.into());
    }

    // a caller may ask for less than the policy allows, never more
    let max_chars = match (req.max_chars, state.extractor.policy().max_chars) {
        (Some(requested), Some(limit)) => Some(requested.min(limit)),
        (requested, limit) => requested.or(limit),
    };

    let page = state.extractor.extract_with_limit(&req.html, max_chars);
    info!(
        html_bytes = req.html.len(),
        content_chars = page.content.chars().count(),
        truncated = page.truncated,
        "Extracted page content"
    );
    Ok(Json(page))
}

async fn extraction_policy_handler(State(state): State<AppState>) -> Json<ExtractionPolicy> {
    Json(state.extractor.policy().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_identifier(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_identifier(&headers, Some(peer), false), "127.0.0.1");
    }

    #[test]
    fn falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "[::1]:5000".parse().unwrap();

        assert_eq!(client_identifier(&headers, Some(peer), true), "::1");
        assert_eq!(client_identifier(&headers, None, true), "unknown");
    }
}
