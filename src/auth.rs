use std::net::SocketAddr;

use axum::http::{header, HeaderMap};

const BEARER_SCHEME: &str = "bearer";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Pulls the token out of an `Authorization` header value.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored. Any other scheme yields an empty string.
pub fn extract_bearer_token(auth_header: &str) -> &str {
    let auth_header = auth_header.trim();
    if auth_header.len() <= BEARER_SCHEME.len() {
        return "";
    }
    let Some(scheme) = auth_header.get(..BEARER_SCHEME.len()) else {
        return "";
    };
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return "";
    }
    auth_header[BEARER_SCHEME.len()..].trim()
}

/// Provenance of one API call, sealed into the outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerInfo {
    pub token: String,
    pub primary_addr: String,
    pub addr_chain: Vec<String>,
}

impl CallerInfo {
    pub fn capture(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(extract_bearer_token)
            .unwrap_or_default()
            .to_string();

        let addr_chain: Vec<String> = headers
            .get_all(FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let primary_addr = match addr_chain.first() {
            Some(first) => first.clone(),
            None => peer.map(|p| p.ip().to_string()).unwrap_or_default(),
        };

        Self {
            token,
            primary_addr,
            addr_chain,
        }
    }
}
