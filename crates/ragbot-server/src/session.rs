//! Session resolution from request metadata.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use ragbot_types::SessionId;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::ops::Deref;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Used when neither header nor peer address is available.
const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the session id: `Authorization` if present, else
/// `X-Forwarded-For`, else the peer address.
///
/// Header values are taken verbatim; no validation or normalization.
/// Non-ASCII bytes are decoded as latin-1 so distinct values stay distinct.
pub fn resolve_session(headers: &HeaderMap, remote: Option<IpAddr>) -> SessionId {
    let header = |name: &str| headers.get(name).map(|v| latin1(v.as_bytes()));

    if let Some(auth) = header(AUTHORIZATION.as_str()) {
        return SessionId::new(auth);
    }
    if let Some(forwarded) = header(X_FORWARDED_FOR) {
        return SessionId::new(forwarded);
    }
    match remote {
        Some(ip) => SessionId::new(ip.to_string()),
        None => SessionId::from(UNKNOWN_CLIENT),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Extractor yielding the caller's [`SessionId`].
#[derive(Debug, Clone)]
pub struct ResolvedSession(pub SessionId);

impl Deref for ResolvedSession {
    type Target = SessionId;

    fn deref(&self) -> &SessionId {
        &self.0
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ResolvedSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ResolvedSession(resolve_session(&parts.headers, remote)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn authorization_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t1"));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("198.51.100.4"));
        assert_eq!(resolve_session(&headers, ip("10.0.0.1")).as_str(), "Bearer t1");
    }

    #[test]
    fn forwarded_for_before_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("198.51.100.4, 10.0.0.2"));
        assert_eq!(
            resolve_session(&headers, ip("10.0.0.1")).as_str(),
            "198.51.100.4, 10.0.0.2"
        );
    }

    #[test]
    fn falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_session(&headers, ip("10.0.0.1")).as_str(), "10.0.0.1");
        assert_eq!(resolve_session(&headers, ip("::1")).as_str(), "::1");
        assert_eq!(resolve_session(&headers, None).as_str(), "unknown");
    }

    #[test]
    fn identical_headers_resolve_identically() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer same"));
        assert_eq!(
            resolve_session(&headers, ip("10.0.0.1")),
            resolve_session(&headers, ip("10.0.0.99"))
        );
    }

    #[test]
    fn non_ascii_header_keys_its_own_session() {
        let session = |auth: &[u8]| {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_bytes(auth).unwrap());
            resolve_session(&headers, ip("10.0.0.1"))
        };

        let a = session(b"Bearer caf\xe9-A");
        assert_eq!(a.as_str(), "Bearer caf\u{e9}-A");
        assert_ne!(a, session(b"Bearer caf\xe8-A"));
        assert_ne!(a, session(b"Bearer caf\xe9-C"));
        assert_ne!(a.as_str(), "10.0.0.1");
    }

    #[test]
    fn non_ascii_forwarded_for_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_bytes(b"h\xf6st").unwrap());
        assert_eq!(resolve_session(&headers, ip("10.0.0.1")).as_str(), "h\u{f6}st");
    }
}
