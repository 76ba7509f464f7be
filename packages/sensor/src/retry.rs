//! HTTP send helper with a single bounded retry.
//!
//! Sensor fetches sit on the baseline request path, so a transient failure
//! gets exactly one more attempt after a short pause; anything else fails
//! fast and the caller falls back to synthetic-only data.

use std::time::Duration;

use crate::SensorError;

/// Retries after the first attempt.
const MAX_RETRIES: u32 = 1;

/// Pause before the retry.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// Connection errors, timeouts, HTTP 429, and HTTP 5xx are retried once.
/// Other 4xx responses and undecodable bodies are not retried.
///
/// # Errors
///
/// Returns [`SensorError`] if the request still fails after the retry, the
/// server returns a non-retryable status, or the body is not valid JSON.
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, SensorError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::debug!("JSON parse failed for {url}: {e}\n  body preview: {preview}");
        SensorError::Json(e)
    })
}

async fn send_inner<F>(build_request: &F) -> Result<reqwest::Response, SensorError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {RETRY_DELAY:?}...");
            tokio::time::sleep(RETRY_DELAY).await;
        }
        let can_retry = attempt < MAX_RETRIES;
        attempt += 1;

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && can_retry {
                    log::warn!("  transient error: {e}");
                    continue;
                }
                return Err(SensorError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if can_retry {
                        log::warn!("  HTTP {status}");
                        continue;
                    }
                    return Err(SensorError::Response {
                        message: format!("HTTP {status} after {MAX_RETRIES} retry"),
                    });
                }

                if status.is_client_error() {
                    return Err(SensorError::Response {
                        message: format!("HTTP {status}"),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `status` with `body` on every connection and counts requests.
    async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/"), hits)
    }

    #[tokio::test]
    async fn server_error_gets_exactly_one_retry() {
        let (url, hits) = serve("503 Service Unavailable", "").await;
        let client = reqwest::Client::new();

        let result = send_json(|| client.get(&url)).await;

        assert!(matches!(result, Err(SensorError::Response { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let (url, hits) = serve("404 Not Found", "").await;
        let client = reqwest::Client::new();

        let result = send_json(|| client.get(&url)).await;

        assert!(matches!(result, Err(SensorError::Response { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_parses_body() {
        let (url, hits) = serve("200 OK", r#"{"results": []}"#).await;
        let client = reqwest::Client::new();

        let value = send_json(|| client.get(&url)).await.unwrap();

        assert!(value["results"].as_array().is_some_and(Vec::is_empty));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
