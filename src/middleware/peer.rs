use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Best-effort caller address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        if let Some(ip) = header("x-forwarded-for").or_else(|| header("x-real-ip")) {
            return Ok(PeerAddr(ip));
        }
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(PeerAddr(addr.ip().to_string()));
        }
        Ok(PeerAddr("unknown".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn peer(req: Request<()>) -> String {
        let (mut parts, _) = req.into_parts();
        PeerAddr::from_request_parts(&mut parts, &()).await.unwrap().0
    }

    #[tokio::test]
    async fn forwarded_header_wins() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(peer(req).await, "203.0.113.9");
    }

    #[tokio::test]
    async fn socket_peer_then_unknown() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5000))));
        assert_eq!(peer(req).await, "192.0.2.4");
        assert_eq!(peer(Request::builder().body(()).unwrap()).await, "unknown");
    }
}
