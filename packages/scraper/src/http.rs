//! `reqwest`-backed [`Transport`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::retry::{DEFAULT_MAX_RETRIES, send_with_retry};
use crate::{FetchRequest, FetchResponse, Method, Transport, TransportError, TransportErrorKind};

/// Sends [`FetchRequest`]s over HTTP(S).
///
/// One client is built per distinct proxy URL and reused for every request
/// routed through it, so connection pools survive across pages.
pub struct HttpTransport {
    accept_invalid_certs: bool,
    max_retries: u32,
    clients: Mutex<BTreeMap<Option<String>, reqwest::Client>>,
}

impl HttpTransport {
    /// Creates a transport with the default retry budget.
    #[must_use]
    pub fn new(accept_invalid_certs: bool) -> Self {
        Self {
            accept_invalid_certs,
            max_retries: DEFAULT_MAX_RETRIES,
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    /// Sets how many times a single fetch is retried on transient failure.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client, TransportError> {
        let key = proxy.map(str::to_owned);
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(self.accept_invalid_certs);
        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url).map_err(|e| {
                TransportError::new(TransportErrorKind::Other, format!("invalid proxy: {e}"))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| {
            TransportError::new(TransportErrorKind::Other, format!("client build failed: {e}"))
        })?;

        clients.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let client = self.client(request.proxy.as_deref())?;

        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &request.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("invalid header name '{key}': {e}"),
                )
            })?;
            let val = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("invalid header value for '{key}': {e}"),
                )
            })?;
            header_map.insert(name, val);
        }

        log::debug!("{} {}", request.method, request.url);

        let response = send_with_retry(
            || {
                let builder = match request.method {
                    Method::Get => client.get(&request.url),
                    Method::Post => client.post(&request.url),
                };
                let builder = builder
                    .headers(header_map.clone())
                    .timeout(request.timeout);
                match &request.body {
                    Some(body) => builder.body(body.clone()),
                    None => builder,
                }
            },
            self.max_retries,
        )
        .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            TransportError::new(TransportErrorKind::InvalidBody, format!("body read failed: {e}"))
        })?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clients_are_cached_per_proxy() {
        let transport = HttpTransport::default();
        transport.client(None).unwrap();
        transport.client(None).unwrap();
        transport.client(Some("http://127.0.0.1:3128")).unwrap();

        let clients = transport.clients.lock().unwrap();
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let transport = HttpTransport::default();
        let err = transport.client(Some("not a url")).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Other);
    }

    #[tokio::test]
    async fn invalid_header_name_fails_before_sending() {
        let transport = HttpTransport::default().with_max_retries(0);
        let mut request = FetchRequest::new(Method::Get, "http://127.0.0.1:9/");
        request
            .headers
            .insert("bad header".to_string(), "x".to_string());

        let err = transport.fetch(&request).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Other);
        assert!(err.message.contains("invalid header name"));
    }
}
