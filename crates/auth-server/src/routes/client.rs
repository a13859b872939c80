use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header::USER_AGENT, request::Parts},
};

use crate::auth::RequestContext;

const UNKNOWN_IP: &str = "unknown";

/// Caller address and user agent as seen behind the reverse proxy.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            ip_address: client_ip(headers, peer),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }

    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            ip_address: Some(self.ip_address.clone()),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}

/// Proxy headers are client controlled, so only values that parse as an
/// address are trusted. Anything else falls through to the next source.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let forwarded = header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        .and_then(parse_ip);
    let real_ip = header("x-real-ip").and_then(parse_ip);

    forwarded
        .or(real_ip)
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    match value.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            tracing::debug!(value, "ignoring unparsable client address header");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn prefers_first_forwarded_address() {
        let headers = headers(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.2"),
            ("x-real-ip", "10.0.0.3"),
        ]);
        assert_eq!(client_ip(&headers, None), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        assert_eq!(
            client_ip(&headers(&[("x-real-ip", "10.0.0.3")]), Some(peer)),
            "10.0.0.3"
        );
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn garbage_forwarded_value_falls_through() {
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        let mut oversized = headers(&[("x-real-ip", "10.0.0.3")]);
        oversized.insert(
            "x-forwarded-for",
            HeaderValue::from_str(&"9".repeat(300)).unwrap(),
        );
        assert_eq!(client_ip(&oversized, Some(peer)), "10.0.0.3");

        assert_eq!(
            client_ip(
                &headers(&[("x-forwarded-for", "not-an-ip"), ("x-real-ip", "nope")]),
                Some(peer)
            ),
            "192.0.2.1"
        );
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "2001:db8::1")]), None),
            "2001:db8::1"
        );
    }

    #[test]
    fn reads_user_agent() {
        let info = ClientInfo::from_parts(&headers(&[("user-agent", "curl/8.0")]), None);
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(info.ip_address, "unknown");
    }
}
