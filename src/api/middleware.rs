/// Request helpers shared by the extractors and middleware
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use std::net::{IpAddr, SocketAddr};

/// Extract the session token from the auth cookie, falling back to an
/// `Authorization: Bearer` header for non-browser clients
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    extract_bearer_token(headers)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
}

/// Client address used for per-address limits.
///
/// The socket peer is the client unless it is a trusted proxy. Behind a
/// trusted proxy the nearest `X-Forwarded-For` hop that is not itself a
/// trusted proxy is taken; hops further left are client-controlled.
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = peer?.ip();
    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let hops: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(','))
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    hops.into_iter()
        .rev()
        .find(|hop| !trusted_proxies.contains(hop))
        .or(Some(peer))
}
