use crate::api::{ApiError, AppState, peer_addr};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    response::IntoResponse,
};
use std::sync::Arc;

/// Prometheus text, for loopback peers only.
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    if !peer_addr(req.extensions()).is_some_and(|ip| ip.is_loopback()) {
        return Err(ApiError::page_not_found(req.uri().path()));
    }

    Ok(state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    ))
}

use axum::{middleware::Next, response::Response};
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = req.uri().path().to_string();

    let matched_path = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|mp| mp.as_str().to_string());

    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let client = super::client_ip(req.extensions());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
        client = %client,
        user_id = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();

        let outcome = if status >= 500 {
            "error"
        } else if status >= 400 {
            "client_error"
        } else {
            "success"
        };

        let metrics_path = metrics_path(
            matched_path.as_deref(),
            response.extensions().get::<RuleLabel>(),
        );

        let labels = [
            ("method", method.clone()),
            ("path", metrics_path),
            ("status", status.to_string()),
        ];

        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        info!(
            event = "http_request_finished",
            duration_ms = duration_ms,
            status_code = status,
            user_agent = %user_agent,
            outcome = %outcome,
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

/// Access rule that served a catch-all request, attached to its response.
#[derive(Debug, Clone)]
pub struct RuleLabel(pub String);

impl RuleLabel {
    #[must_use]
    pub fn new(rule_url: &str) -> Self {
        Self(format!("/{rule_url}"))
    }
}

const CATCH_ALL_ROUTE: &str = "/{*path}";

/// Site pages all share the catch-all route, so they are labelled by the
/// resolved rule. Paths that never resolved collapse into `other`.
fn metrics_path(matched: Option<&str>, rule: Option<&RuleLabel>) -> String {
    match (matched, rule) {
        (_, Some(RuleLabel(url))) => url.clone(),
        (Some(CATCH_ALL_ROUTE) | None, None) => "other".to_string(),
        (Some(route), None) => route.to_string(),
    }
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(
            "default-src 'self'; img-src 'self' data:; script-src 'self'; style-src 'self' 'unsafe-inline'; form-action 'self'; frame-ancestors 'none'; base-uri 'self'",
        ),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_path_is_bounded() {
        let rule = RuleLabel::new("users/activate");
        assert_eq!(metrics_path(Some(CATCH_ALL_ROUTE), Some(&rule)), "/users/activate");
        assert_eq!(metrics_path(Some("/metrics"), None), "/metrics");
        // Unresolved or denied paths share one label.
        assert_eq!(metrics_path(Some(CATCH_ALL_ROUTE), None), "other");
        assert_eq!(metrics_path(None, None), "other");
    }
}
