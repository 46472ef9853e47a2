use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::{info, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware: tags each request with an id and logs start and end.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let request_id = Uuid::new_v4().to_string();

    let span = tracing::info_span!("request", request_id = %request_id);

    async move {
        info!(
            target: "imagegen_relay::middleware",
            method = %method,
            uri = %uri,
            client_ip = %client_ip,
            "Incoming request"
        );

        let mut response = next.run(request).await;

        let status = response.status();
        info!(
            target: "imagegen_relay::middleware",
            method = %method,
            uri = %uri,
            status = %status,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }
    .instrument(span)
    .await
}

fn get_client_ip(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string());

    let real_ip = || {
        request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    };

    forwarded
        .or_else(real_ip)
        .or_else(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );
        request.headers_mut().insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(get_client_ip(&request), "192.168.1.1");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 5555))));

        assert_eq!(get_client_ip(&request), "10.1.2.3");
    }

    #[test]
    fn test_client_ip_fallback() {
        let request = Request::new(axum::body::Body::empty());
        assert_eq!(get_client_ip(&request), "unknown");
    }
}
