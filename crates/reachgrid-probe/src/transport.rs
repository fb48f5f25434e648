//! HTTP transport: the single GET a probe issues.

use std::error::Error as StdError;
use std::time::Duration;

use tracing::debug;

use reachgrid_core::{BoxFuture, FailureCategory, Target};

/// The parts of a response a probe cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub server: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete before its deadline.
    DeadlineExceeded,
    Failed {
        category: FailureCategory,
        message: String,
    },
}

pub type TransportResult = Result<HttpResponse, TransportError>;

/// Issues an HTTP GET that should give up after `deadline`.
///
/// The executor enforces the deadline as well, so an implementation that
/// ignores it still cannot stall a worker.
pub trait ProbeTransport: Send + Sync + 'static {
    fn get<'a>(&'a self, target: &'a Target, deadline: Duration) -> BoxFuture<'a, TransportResult>;
}

/// reqwest-backed transport with a shared connection pool.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reachgrid/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, target: &Target, deadline: Duration) -> TransportResult {
        let request = self.client.get(target.url().clone()).timeout(deadline).send();
        let resp = match tokio::time::timeout(deadline, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(map_reqwest_error(&e)),
            Err(_) => return Err(TransportError::DeadlineExceeded),
        };

        let server = resp
            .headers()
            .get(reqwest::header::SERVER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(%target, status = resp.status().as_u16(), "probe response");
        Ok(HttpResponse {
            status: resp.status().as_u16(),
            server,
        })
    }
}

impl ProbeTransport for HttpTransport {
    fn get<'a>(&'a self, target: &'a Target, deadline: Duration) -> BoxFuture<'a, TransportResult> {
        Box::pin(self.fetch(target, deadline))
    }
}

fn map_reqwest_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::DeadlineExceeded;
    }
    // The outer message embeds the URL, so only the causes are inspected.
    let causes = source_chain(err);
    let category = if looks_like_tls(&causes) {
        FailureCategory::Tls
    } else if err.is_connect() {
        FailureCategory::Connection
    } else {
        FailureCategory::Other
    };
    let message = if causes.is_empty() {
        err.to_string()
    } else {
        format!("{err}: {causes}")
    };
    TransportError::Failed { category, message }
}

/// Join all sources of an error, outermost first.
fn source_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn looks_like_tls(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve(router: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn target(addr: std::net::SocketAddr, path: &str) -> Target {
        Target::parse(&format!("http://{addr}{path}")).unwrap()
    }

    #[tokio::test]
    async fn reports_status_and_server_header() {
        let router = Router::new()
            .route("/ok", get(|| async { ([("server", "unit-test")], "fine") }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let addr = serve(router).await;
        let transport = HttpTransport::new().unwrap();

        let ok = transport
            .get(&target(addr, "/ok"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(ok.server.as_deref(), Some("unit-test"));

        let missing = transport
            .get(&target(addr, "/missing"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn slow_response_exceeds_deadline() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(router).await;
        let transport = HttpTransport::new().unwrap();

        let result = transport
            .get(&target(addr, "/slow"), Duration::from_millis(100))
            .await;
        assert_eq!(result, Err(TransportError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_failure() {
        let transport = HttpTransport::new().unwrap();
        let t = Target::parse("http://127.0.0.1:1/").unwrap();
        match transport.get(&t, Duration::from_secs(2)).await {
            Err(TransportError::Failed { category, .. }) => {
                assert_eq!(category, FailureCategory::Connection)
            }
            other => panic!("expected connection failure, got {other:?}"),
        }
    }

    #[test]
    fn tls_messages_are_recognized() {
        assert!(looks_like_tls("error sending request: invalid peer certificate: Expired"));
        assert!(looks_like_tls("TLS handshake eof"));
        assert!(!looks_like_tls("connection refused"));
    }
}
