//! Client IP extraction for rate limiting.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};

/// Extract the client IP address.
///
/// With `trust_forwarded_for` the first `X-Forwarded-For` entry is used and a
/// missing header is an error (no fallback to the socket address, which would
/// be the proxy). Otherwise the peer address from `ConnectInfo` is used.
pub fn extract_client_ip(
    request: &Request,
    trust_forwarded_for: bool,
) -> Result<String, &'static str> {
    if trust_forwarded_for {
        let value = request
            .headers()
            .get("x-forwarded-for")
            .ok_or("X-Forwarded-For header not present")?
            .to_str()
            .map_err(|_| "X-Forwarded-For header contains invalid characters")?;
        let first = value.split(',').next().unwrap_or("").trim();
        if first.is_empty() {
            return Err("X-Forwarded-For header is empty");
        }
        return Ok(first.to_string());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .ok_or("No client IP available")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_forwarded_for_first_entry() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&request, true), Ok("203.0.113.7".to_string()));
    }

    #[test]
    fn test_forwarded_for_required_when_trusted() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(extract_client_ip(&request, true).is_err());
    }

    #[test]
    fn test_connect_info() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));

        assert_eq!(extract_client_ip(&request, false), Ok("192.0.2.1".to_string()));
    }
}
