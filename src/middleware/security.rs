use axum::{
    extract::{Request, State},
    http::{header::HOST, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

/// Reject requests whose `Host` is not in `TRUSTED_HOSTS`. `*` disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if host_is_trusted(host, &state.config.trusted_hosts) {
        return next.run(request).await;
    }

    tracing::warn!(host = %host, "Rejected request from untrusted host");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": "Invalid host header." })),
    )
        .into_response()
}

fn host_is_trusted(host: &str, trusted_hosts: &[String]) -> bool {
    if trusted_hosts.is_empty() || trusted_hosts.iter().any(|entry| entry == "*") {
        return true;
    }
    let hostname = strip_port(host).to_ascii_lowercase();
    trusted_hosts
        .iter()
        .any(|entry| entry.trim().eq_ignore_ascii_case(&hostname))
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host
            .split_once(']')
            .map(|(addr, _)| addr.trim_start_matches('['))
            .unwrap_or(host);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}
