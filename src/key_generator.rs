//! Client identification for rate limiting.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Shared bucket for requests whose origin cannot be determined.
pub const ANONYMOUS_KEY: &str = "anonymous_clients";

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKey {
    /// A client identified by its address
    Ip(String),
    /// Every unidentifiable client shares one bucket
    Anonymous,
}

impl ClientKey {
    pub fn as_str(&self) -> &str {
        match self {
            ClientKey::Ip(ip) => ip,
            ClientKey::Anonymous => ANONYMOUS_KEY,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, ClientKey::Anonymous)
    }
}

pub struct KeyGenerator;

impl KeyGenerator {
    /// Rate limit key for a request.
    pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientKey {
        match Self::extract_client_ip(headers, peer) {
            Some(ip) => ClientKey::Ip(Self::sanitize_key(&ip)),
            None => ClientKey::Anonymous,
        }
    }

    /// Client address from proxy headers, then the peer socket.
    pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        };

        forwarded
            .or_else(real_ip)
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
    }

    /// Keep characters that are safe in a Redis key.
    pub fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
