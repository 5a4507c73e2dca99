//! Active probing.
//!
//! # Responsibilities
//! - Execute one HTTP or TCP probe against one target
//! - Bound every probe by the target's timeout
//! - Classify every failure into the outcome; nothing is propagated

use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::time;

use crate::health::outcome::{ErrorKind, Outcome, ProbeError, ResponseMeta};
use crate::target::{CheckSpec, HttpCheck, Target};

/// Maximum number of body bytes read for validation and digesting.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Executes a single probe.
///
/// Implementations must return within `target.timeout` (or produce a
/// timeout-classified outcome) and must never panic on probe errors.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn probe(&self, target: &Target) -> Outcome;
}

/// Checker backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("api-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(&self, target: &Target) -> Result<ResponseMeta, Failed> {
        match &target.check {
            CheckSpec::Http(http) => self.execute_http(http).await,
            CheckSpec::Tcp { address } => {
                TcpStream::connect(address.as_str())
                    .await
                    .map_err(|e| ProbeError::new(classify_io_error(&e), e.to_string()))?;
                Ok(ResponseMeta::default())
            }
        }
    }

    async fn execute_http(&self, check: &HttpCheck) -> Result<ResponseMeta, Failed> {
        let method = Method::from_bytes(check.method.as_bytes())
            .map_err(|e| ProbeError::new(ErrorKind::Unknown, format!("invalid method: {}", e)))?;

        let mut request = self.client.request(method, check.url.clone());
        for (name, value) in &check.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &check.body {
            request = request.body(body.clone());
        }

        let mut response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            let room = MAX_BODY_BYTES.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_BODY_BYTES {
                break;
            }
        }

        let meta = ResponseMeta {
            status_code: Some(status),
            body_digest: Some(hex::encode(Sha256::digest(&body))),
            body_bytes: body.len(),
        };

        match validate_response(check, status, &String::from_utf8_lossy(&body)) {
            Ok(()) => Ok(meta),
            Err(error) => Err(Failed {
                error,
                meta: Some(meta),
            }),
        }
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, target: &Target) -> Outcome {
        let started = Instant::now();
        let result = time::timeout(target.timeout, self.execute(target)).await;
        let latency = started.elapsed();

        match result {
            Err(_) => Outcome::timeout(
                target.timeout,
                format!("no response within {:?}", target.timeout),
            ),
            Ok(Ok(meta)) => {
                let meta = match target.check {
                    CheckSpec::Http(_) => Some(meta),
                    CheckSpec::Tcp { .. } => None,
                };
                Outcome::success(latency, meta)
            }
            Ok(Err(error)) => {
                tracing::debug!(target_key = %target.key, error = %error.error, "Probe failed");
                Outcome::failure(error.error, latency, error.meta)
            }
        }
    }
}

/// A probe error together with whatever response metadata was captured.
#[derive(Debug)]
struct Failed {
    error: ProbeError,
    meta: Option<ResponseMeta>,
}

impl From<ProbeError> for Failed {
    fn from(error: ProbeError) -> Self {
        Self { error, meta: None }
    }
}

/// Check a received response against the expected-response predicate.
pub fn validate_response(check: &HttpCheck, status: u16, body: &str) -> Result<(), ProbeError> {
    if !check.status_accepted(status) {
        let expected = if check.expected_status.is_empty() {
            "2xx".to_string()
        } else {
            format!("{:?}", check.expected_status)
        };
        return Err(ProbeError::new(
            ErrorKind::UnexpectedStatus,
            format!("expected {}, got {}", expected, status),
        ));
    }

    if let Some(needle) = &check.body_contains {
        if !body.contains(needle.as_str()) {
            return Err(ProbeError::new(
                ErrorKind::ValidationFailed,
                format!("response body does not contain '{}'", needle),
            ));
        }
    }

    Ok(())
}

fn transport_error(err: reqwest::Error) -> ProbeError {
    ProbeError::new(classify_transport_error(&err), err.to_string())
}

/// Classify a `reqwest` transport error by walking its source chain.
pub fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        return ErrorKind::Timeout;
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return ErrorKind::DnsFailure;
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            let kind = classify_io_error(io_err);
            if kind != ErrorKind::Unknown {
                return kind;
            }
        }
        source = cause.source();
    }

    ErrorKind::Unknown
}

/// Classify an I/O error raised while connecting.
pub fn classify_io_error(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        _ => {
            let text = err.to_string();
            if text.contains("failed to lookup address")
                || text.contains("Name or service not known")
                || text.contains("nodename nor servname")
            {
                ErrorKind::DnsFailure
            } else {
                ErrorKind::Unknown
            }
        }
    }
}

/// Probe an arbitrary URL once with default settings.
pub async fn quick_check(checker: &dyn Checker, url: url::Url, timeout: Duration) -> Outcome {
    let target = Target::new(
        "adhoc",
        CheckSpec::Http(HttpCheck::get(url)),
        timeout.max(Duration::from_secs(1)),
        timeout,
    );
    checker.probe(&target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    async fn serve_once(status_line: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/health", addr)
    }

    fn checker() -> HttpChecker {
        HttpChecker::with_client(Client::builder().no_proxy().build().unwrap())
    }

    fn http_target(url: &str, timeout: Duration) -> Target {
        Target::new(
            "api",
            CheckSpec::Http(HttpCheck::get(Url::parse(url).unwrap())),
            Duration::from_secs(10),
            timeout,
        )
    }

    #[test]
    fn test_validate_response() {
        let mut check = HttpCheck::get(Url::parse("http://localhost/").unwrap());
        assert!(validate_response(&check, 200, "").is_ok());

        let err = validate_response(&check, 503, "").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedStatus);
        assert_eq!(err.message, "expected 2xx, got 503");

        check.body_contains = Some("slideshow".into());
        assert!(validate_response(&check, 200, "{\"slideshow\": {}}").is_ok());
        let err = validate_response(&check, 200, "{}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
    }

    #[test]
    fn test_classify_io_error() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(classify_io_error(&refused), ErrorKind::ConnectionRefused);

        let dns = io::Error::new(io::ErrorKind::Other, "failed to lookup address information");
        assert_eq!(classify_io_error(&dns), ErrorKind::DnsFailure);

        let other = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(classify_io_error(&other), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_http_success_records_metadata() {
        let url = serve_once("200 OK", "all good", Duration::ZERO).await;
        let checker = checker();

        let outcome = checker.probe(&http_target(&url, Duration::from_secs(2))).await;
        assert!(outcome.success, "unexpected failure: {:?}", outcome.error);
        let meta = outcome.response.unwrap();
        assert_eq!(meta.status_code, Some(200));
        assert_eq!(meta.body_bytes, 8);
        assert_eq!(meta.body_digest.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_http_unexpected_status() {
        let url = serve_once("500 Internal Server Error", "oops", Duration::ZERO).await;
        let checker = checker();

        let outcome = checker.probe(&http_target(&url, Duration::from_secs(2))).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::UnexpectedStatus));
        assert_eq!(outcome.response.unwrap().status_code, Some(500));
    }

    #[tokio::test]
    async fn test_http_timeout() {
        let url = serve_once("200 OK", "late", Duration::from_millis(800)).await;
        let checker = checker();

        let started = Instant::now();
        let outcome = checker.probe(&http_target(&url, Duration::from_millis(150))).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = checker();
        let http = checker
            .probe(&http_target(&format!("http://{}/", addr), Duration::from_secs(2)))
            .await;
        assert_eq!(http.error_kind(), Some(ErrorKind::ConnectionRefused));

        let tcp = Target::new(
            "tcp",
            CheckSpec::Tcp { address: addr.to_string() },
            Duration::from_secs(10),
            Duration::from_secs(2),
        );
        let outcome = checker.probe(&tcp).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_tcp_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let checker = checker();
        let target = Target::new(
            "tcp",
            CheckSpec::Tcp { address: addr.to_string() },
            Duration::from_secs(10),
            Duration::from_secs(2),
        );
        let outcome = checker.probe(&target).await;
        assert!(outcome.success);
        assert!(outcome.response.is_none());
    }
}
