//! Node health probe.
//!
//! One bounded-timeout HTTP GET against a node's health endpoint, decoded
//! into the node's seven submodule statuses. The probe never retries.

use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty, Limited};
use serde::Deserialize;
use tracing::debug;

use nautilus_core::config::{DEFAULT_HEALTH_PATH, DEFAULT_HEALTH_PORT};
use nautilus_state::NodeHealth;

use crate::error::{ProbeError, ProbeFailure};

/// Largest health document body accepted from a node.
pub const MAX_HEALTH_BODY: usize = 64 * 1024;

/// Health document served by a node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthDocument {
    pub submodules: Submodules,
}

/// Per-submodule statuses. Submodules missing from the document read as an
/// empty status, which is never live.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Submodules {
    pub directfs_initiator: SubmoduleStatus,
    pub director: SubmoduleStatus,
    pub kv: SubmoduleStatus,
    pub kv_write: SubmoduleStatus,
    pub nats: SubmoduleStatus,
    #[serde(rename = "fs")]
    pub presentation: SubmoduleStatus,
    #[serde(rename = "filesystem_driver")]
    pub rdb: SubmoduleStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmoduleStatus {
    pub status: String,
    pub message: String,
}

impl From<HealthDocument> for NodeHealth {
    fn from(doc: HealthDocument) -> Self {
        let s = doc.submodules;
        NodeHealth {
            directfs_initiator: s.directfs_initiator.status,
            director: s.director.status,
            kv: s.kv.status,
            kv_write: s.kv_write.status,
            nats: s.nats.status,
            presentation: s.presentation.status,
            rdb: s.rdb.status,
        }
    }
}

/// Fetches the health of a single node.
pub trait HealthProbe: Send + Sync + 'static {
    fn probe(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<NodeHealth, ProbeError>> + Send;
}

/// Probes `GET http://<address>:<port><path>` over HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    port: u16,
    path: String,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_PORT, DEFAULT_HEALTH_PATH)
    }
}

impl HttpProbe {
    pub fn new(port: u16, path: &str) -> Self {
        Self {
            port,
            path: path.to_string(),
        }
    }

    /// `host:port` to connect to. Addresses that already carry a port are
    /// used as-is; bare IPv6 literals are bracketed.
    pub fn authority(&self, address: &str) -> String {
        if address.parse::<SocketAddr>().is_ok() {
            return address.to_string();
        }
        if let Ok(ip) = address.parse::<Ipv6Addr>() {
            return format!("[{ip}]:{}", self.port);
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                address.to_string()
            }
            _ => format!("{address}:{}", self.port),
        }
    }

    async fn fetch(&self, authority: &str) -> Result<HealthDocument, ProbeFailure> {
        let stream = tokio::net::TcpStream::connect(authority)
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeFailure::Http(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "health probe connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(self.path.as_str())
            .header(HOST, authority)
            .header(USER_AGENT, "nautilus-health/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeFailure::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeFailure::Http(e.to_string()))?;
        let status = resp.status();
        let body = Limited::new(resp.into_body(), MAX_HEALTH_BODY)
            .collect()
            .await
            .map_err(|e| ProbeFailure::Http(e.to_string()))?
            .to_bytes();

        // The status code is not consulted: nodes answer 503 with a full
        // document when a submodule is down.
        serde_json::from_slice(&body).map_err(|e| {
            debug!(%status, %authority, "health document did not decode");
            ProbeFailure::Decode(e.to_string())
        })
    }
}

impl HealthProbe for HttpProbe {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<NodeHealth, ProbeError> {
        if address.trim().is_empty() {
            return Err(ProbeError::new(address, ProbeFailure::EmptyAddress));
        }
        if timeout.is_zero() {
            return Err(ProbeError::new(address, ProbeFailure::InvalidTimeout));
        }

        let authority = self.authority(address);
        match tokio::time::timeout(timeout, self.fetch(&authority)).await {
            Ok(Ok(doc)) => {
                debug!(%address, "health probe succeeded");
                Ok(NodeHealth::from(doc))
            }
            Ok(Err(failure)) => Err(ProbeError::new(address, failure)),
            Err(_) => Err(ProbeError::new(address, ProbeFailure::Timeout(timeout))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use nautilus_state::LIVE_STATUS;

    const ALL_ALIVE: &str = r#"{
        "submodules": {
            "directfs_initiator": {"status": "alive"},
            "director": {"status": "alive"},
            "kv": {"status": "alive"},
            "kv_write": {"status": "alive"},
            "nats": {"status": "alive"},
            "fs": {"status": "alive"},
            "filesystem_driver": {"status": "alive"},
            "scheduler": {"status": "alive"}
        }
    }"#;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn health_router(status: StatusCode, body: &'static str) -> Router {
        Router::new().route("/v1/health", get(move || async move { (status, body) }))
    }

    #[test]
    fn decode_all_alive_document() {
        let doc: HealthDocument = serde_json::from_str(ALL_ALIVE).unwrap();
        assert_eq!(NodeHealth::from(doc), NodeHealth::uniform(LIVE_STATUS));
    }

    #[test]
    fn decode_maps_renamed_submodules() {
        let doc: HealthDocument = serde_json::from_str(
            r#"{"submodules": {"fs": {"status": "alive"}, "filesystem_driver": {"status": "unknown", "message": "starting"}}}"#,
        )
        .unwrap();
        let health = NodeHealth::from(doc);
        assert_eq!(health.presentation, "alive");
        assert_eq!(health.rdb, "unknown");
    }

    #[test]
    fn decode_missing_submodule_is_empty_status() {
        let doc: HealthDocument =
            serde_json::from_str(r#"{"submodules": {"kv": {"status": "alive"}}}"#).unwrap();
        let health = NodeHealth::from(doc);
        assert_eq!(health.kv, "alive");
        assert_eq!(health.director, "");
    }

    #[test]
    fn decode_requires_submodules_object() {
        assert!(serde_json::from_str::<HealthDocument>(r#"{"ok": true}"#).is_err());
        assert!(
            serde_json::from_str::<HealthDocument>(r#"{"submodules": {"kv": {"status": 1}}}"#)
                .is_err()
        );
    }

    #[test]
    fn authority_appends_default_port() {
        let probe = HttpProbe::default();
        assert_eq!(probe.authority("10.0.0.1"), "10.0.0.1:5705");
        assert_eq!(probe.authority("node-a.internal"), "node-a.internal:5705");
    }

    #[test]
    fn authority_keeps_explicit_port() {
        let probe = HttpProbe::default();
        assert_eq!(probe.authority("10.0.0.1:15705"), "10.0.0.1:15705");
        assert_eq!(probe.authority("node-a:8000"), "node-a:8000");
        assert_eq!(probe.authority("[::1]:9000"), "[::1]:9000");
    }

    #[test]
    fn authority_brackets_ipv6() {
        let probe = HttpProbe::new(5705, "/v1/health");
        assert_eq!(probe.authority("fd00::1"), "[fd00::1]:5705");
    }

    #[tokio::test]
    async fn probe_reads_submodules_over_http() {
        let addr = serve(health_router(StatusCode::OK, ALL_ALIVE)).await;
        let probe = HttpProbe::new(addr.port(), "/v1/health");

        let health = probe
            .probe("127.0.0.1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(health, NodeHealth::uniform(LIVE_STATUS));
    }

    #[tokio::test]
    async fn probe_decodes_body_of_error_response() {
        let body = r#"{"submodules": {"kv": {"status": "dead"}}}"#;
        let addr = serve(health_router(StatusCode::SERVICE_UNAVAILABLE, body)).await;
        let probe = HttpProbe::default();

        let health = probe
            .probe(&addr.to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(health.kv, "dead");
    }

    #[tokio::test]
    async fn probe_undecodable_body_fails() {
        let addr = serve(health_router(StatusCode::OK, "<html>ok</html>")).await;
        let err = HttpProbe::default()
            .probe(&addr.to_string(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.address, addr.to_string());
        assert!(matches!(err.failure, ProbeFailure::Decode(_)));
    }

    #[tokio::test]
    async fn probe_wrong_path_fails_to_decode() {
        let addr = serve(health_router(StatusCode::OK, ALL_ALIVE)).await;
        let err = HttpProbe::new(addr.port(), "/v2/health")
            .probe("127.0.0.1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err.failure, ProbeFailure::Decode(_)));
    }

    #[tokio::test]
    async fn oversized_health_body_is_rejected() {
        // Valid JSON once the padding is skipped, but past the body limit.
        let body = format!("{}{ALL_ALIVE}", " ".repeat(MAX_HEALTH_BODY + 1024));
        let router = Router::new().route("/v1/health", get(move || async move { body }));
        let addr = serve(router).await;

        let err = HttpProbe::default()
            .probe(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err.failure, ProbeFailure::Http(_)));
    }

    #[tokio::test]
    async fn body_under_the_limit_decodes() {
        let body = format!("{}{ALL_ALIVE}", " ".repeat(MAX_HEALTH_BODY / 2));
        let router = Router::new().route("/v1/health", get(move || async move { body }));
        let addr = serve(router).await;

        let health = HttpProbe::default()
            .probe(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(health, NodeHealth::uniform(LIVE_STATUS));
    }

    #[tokio::test]
    async fn probe_closed_port_fails_to_connect() {
        let err = HttpProbe::default()
            .probe("127.0.0.1:1", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err.failure, ProbeFailure::Connect(_)));
    }

    #[tokio::test]
    async fn probe_times_out_on_slow_node() {
        let router = Router::new().route(
            "/v1/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ALL_ALIVE
            }),
        );
        let addr = serve(router).await;

        let started = std::time::Instant::now();
        let err = HttpProbe::default()
            .probe(&addr.to_string(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err.failure, ProbeFailure::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn probe_rejects_bad_input() {
        let probe = HttpProbe::default();
        let err = probe
            .probe("", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err.failure, ProbeFailure::EmptyAddress));

        let err = probe.probe("10.0.0.1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err.failure, ProbeFailure::InvalidTimeout));
    }
}
