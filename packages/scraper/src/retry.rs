//! Per-call retry for transient HTTP failures.
//!
//! [`send_with_retry`] retries connection failures, timeouts, HTTP 429 and
//! HTTP 5xx with exponential backoff (2s, 4s, 8s, ...). Other 4xx
//! responses are permanent and returned immediately as
//! [`TransportErrorKind::HttpError`].

use std::error::Error as _;
use std::time::Duration;

use crate::{TransportError, TransportErrorKind};

/// Default number of retries for a single fetch.
///
/// Kept low: the pagination controller applies its own backoff on top of
/// whatever this layer gives up on.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Sends the request built by `build_request`, retrying transient failures
/// up to `max_retries` times.
///
/// The closure is called once per attempt since request builders are
/// consumed by `.send()`. Returns the successful (2xx) response.
///
/// # Errors
///
/// Returns [`TransportError`] when the request fails after all retries or
/// the server answers with a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_with_retry<F>(
    build_request: F,
    max_retries: u32,
) -> Result<reqwest::Response, TransportError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<TransportError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                let error = TransportError::new(classify(&e), e.to_string());
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }
            Ok(response) => {
                let status = response.status();

                if is_retryable_status(status.as_u16()) && attempt < max_retries {
                    log::warn!("  HTTP {status} (retryable)");
                    last_error = Some(TransportError::new(
                        TransportErrorKind::HttpError(status.as_u16()),
                        format!("HTTP {status}"),
                    ));
                    continue;
                }

                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(TransportError::http(status.as_u16(), body));
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        TransportError::new(TransportErrorKind::Other, "request failed after all retries")
    }))
}

/// Returns `true` for statuses worth retrying: 429 and 5xx.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    status == 429 || (status >= 500 && status < 600)
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// Maps a `reqwest` error onto the transport error taxonomy.
///
/// Connection errors are told apart by walking the source chain: an
/// `io::ErrorKind::ConnectionRefused` means refused, resolver and TLS
/// failures are recognized by their messages.
#[must_use]
pub fn classify(e: &reqwest::Error) -> TransportErrorKind {
    if e.is_timeout() {
        return TransportErrorKind::Timeout;
    }
    if e.is_body() || e.is_decode() {
        return TransportErrorKind::InvalidBody;
    }

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return TransportErrorKind::ConnRefused,
                std::io::ErrorKind::TimedOut => return TransportErrorKind::Timeout,
                _ => {}
            }
        }
        if let Some(kind) = classify_message(&err.to_string()) {
            return kind;
        }
        source = err.source();
    }

    if e.is_connect() {
        TransportErrorKind::ConnRefused
    } else {
        TransportErrorKind::Other
    }
}

fn classify_message(message: &str) -> Option<TransportErrorKind> {
    let message = message.to_ascii_lowercase();
    if message.contains("dns") || message.contains("failed to lookup address") {
        Some(TransportErrorKind::DnsFailure)
    } else if message.contains("certificate")
        || message.contains("tls")
        || message.contains("handshake")
    {
        Some(TransportErrorKind::TlsError)
    } else if message.contains("connection refused") {
        Some(TransportErrorKind::ConnRefused)
    } else {
        None
    }
}
