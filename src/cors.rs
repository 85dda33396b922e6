//! CORS policy for the operator endpoints
//!
//! Dashboards reading the stores run on the same machine, so only loopback
//! origins (`localhost`, `127.0.0.1`, `[::1]`, any port) are allowed. The
//! webhook endpoint is called server-to-server and never sends an Origin.

use http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Methods the operator endpoints use
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Preflight cache lifetime
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// CORS layer allowing loopback origins only
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            is_localhost_origin(origin)
        }))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// Whether `origin` is `http(s)://` followed by a loopback host and an
/// optional non-zero port.
pub fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let origin = origin.to_ascii_lowercase();
    let Some(authority) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };
    // an Origin has no path, but tolerate a trailing slash
    let authority = authority.strip_suffix('/').unwrap_or(authority);

    let (host, port) = match authority.strip_prefix("[::1]") {
        Some(rest) => ("[::1]", rest),
        None => match authority.find(':') {
            Some(i) => authority.split_at(i),
            None => (authority, ""),
        },
    };

    if !matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
        return false;
    }
    match port.strip_prefix(':') {
        None => port.is_empty(),
        Some(port) => port.parse::<u16>().map(|p| p > 0).unwrap_or(false),
    }
}
