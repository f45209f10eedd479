use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;

pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let mut headers = vec![ACCEPT, AUTHORIZATION, CONTENT_TYPE];
    headers.push(HeaderName::from_static("x-request-id"));
    if config.auth_dev_overrides_enabled() {
        headers.push(HeaderName::from_static("x-user-id"));
        headers.push(HeaderName::from_static("x-user-role"));
    }

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers);

    if config.cors_origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any).allow_credentials(false);
    }

    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect::<Vec<_>>();
    layer.allow_origin(origins).allow_credentials(true)
}
