use axum::http::{header, HeaderName, HeaderValue};

pub const ALLOWED_METHODS: &str = "GET, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type";
pub const PREFLIGHT_MAX_AGE: &str = "86400";
pub const NO_STORE: &str = "no-cache, no-store, must-revalidate, private";

/// Headers carried by every `/api/me` response, errors included.
///
/// Caching is disabled so an edge cache cannot replay a response past the
/// rate limiter.
pub fn standard_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        (header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS)),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS)),
        (header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE)),
        (header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static("0")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_headers_disable_caching() {
        let headers = standard_headers();
        let cache_control = headers
            .iter()
            .find(|(name, _)| *name == header::CACHE_CONTROL)
            .map(|(_, value)| value.to_str().unwrap());

        assert_eq!(cache_control, Some("no-cache, no-store, must-revalidate, private"));
        assert_eq!(headers.len(), 7);
    }
}
