use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;

pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    // Browser-triggered manual sends pass the cron secret as a header.
    let headers = vec![
        ACCEPT,
        CONTENT_TYPE,
        HeaderName::from_static("x-cron-secret"),
        HeaderName::from_static("x-request-id"),
    ];

    let mut layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static("x-request-id")]);

    if config
        .cors_origins
        .iter()
        .any(|origin| origin.trim() == "*")
    {
        layer = layer.allow_origin(Any).allow_credentials(false);
    } else {
        let origins = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect::<Vec<_>>();
        layer = layer.allow_origin(origins).allow_credentials(true);
    }

    layer
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use super::build_cors_layer;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn preflight_allows_configured_origin() {
        let config = AppConfig::for_tests();
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(build_cors_layer(&config));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "x-cron-secret")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .map(|v| v.as_bytes()),
            Some(&b"http://localhost:3000"[..])
        );
    }
}
