//! Security headers, CORS, and input-validation helpers shared by every
//! mounted router.

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;

pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Production CORS policy; `cors_origins` comes from
/// `invoice_shared::config::ServerConfig`.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    let layer = if allowed.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(allowed)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(86400))
}

/// Defense-in-depth pattern checks for user-supplied free text fields
/// (e.g. purchase-order notes, supplier names) that get rendered back in
/// API responses. Every SQL query in this workspace uses bound
/// parameters already; this is a secondary net, not the primary defense.
pub mod validation {
    use regex::Regex;
    use std::sync::OnceLock;

    fn sql_injection_pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| {
            Regex::new(r"(?i)(union\s+select|;\s*drop\s+table|<script|</script)").unwrap()
        })
    }

    pub fn looks_malicious(input: &str) -> bool {
        sql_injection_pattern().is_match(input)
    }
}

#[cfg(test)]
mod tests {
    use super::validation::looks_malicious;

    #[test]
    fn flags_script_tags_and_union_select() {
        assert!(looks_malicious("<script>alert(1)</script>"));
        assert!(looks_malicious("1 UNION SELECT password FROM users"));
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        assert!(!looks_malicious("Acme Supply Co, net 30 terms"));
    }
}
