//! HTTP transport seam for the API client.
//!
//! The client builds fully-formed [`ApiRequest`]s and interprets the raw
//! status and body itself, so a transport only has to move bytes. Tests plug
//! in a scripted transport; production uses [`ReqwestTransport`].

use std::future::Future;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// One outbound call: absolute URL (query included), method, headers and an
/// optional JSON body.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

// Headers carry the client secret.
impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("has_body", &self.body.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status code and body text as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Sends an [`ApiRequest`] and returns whatever the server answered.
///
/// Only failures to obtain a response at all (DNS, connect, timeout) are
/// errors, and they must be [`BridgeError::Connection`](crate::BridgeError::Connection).
/// Non-2xx statuses are returned as normal responses.
pub trait Transport: Send + Sync {
    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<RawResponse>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<RawResponse>> + Send {
        (**self).send(request)
    }
}

#[cfg(feature = "full")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "full")]
mod reqwest_transport {
    use std::future::Future;
    use std::time::Duration;

    use super::{ApiRequest, HttpMethod, RawResponse, Transport};
    use crate::constants::DEFAULT_TIMEOUT;
    use crate::error::{BridgeError, Result};

    /// [`Transport`] over a shared `reqwest::Client`.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        http: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(timeout: Duration) -> Result<Self> {
            let http = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;
            Ok(Self { http })
        }

        pub fn from_client(http: reqwest::Client) -> Self {
            Self { http }
        }
    }

    impl Default for ReqwestTransport {
        fn default() -> Self {
            Self::new(DEFAULT_TIMEOUT).unwrap_or_else(|_| Self::from_client(reqwest::Client::new()))
        }
    }

    impl Transport for ReqwestTransport {
        fn send(&self, request: ApiRequest) -> impl Future<Output = Result<RawResponse>> + Send {
            let http = self.http.clone();
            async move {
                let method = match request.method {
                    HttpMethod::Get => reqwest::Method::GET,
                    HttpMethod::Post => reqwest::Method::POST,
                };

                let mut builder = http.request(method, &request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if let Some(body) = request.body {
                    builder = builder.body(body);
                }

                let resp = builder
                    .send()
                    .await
                    .map_err(|e| BridgeError::Connection(format!("request failed: {e}")))?;
                let status = resp.status().as_u16();
                let body = resp
                    .text()
                    .await
                    .map_err(|e| BridgeError::Connection(format!("failed to read response: {e}")))?;

                Ok(RawResponse { status, body })
            }
        }
    }
}


/// Scripted transport for unit tests: replays queued responses in order and
/// records every request it was asked to send.
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{ApiRequest, RawResponse, Transport};
    use crate::error::{BridgeError, Result};

    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<Result<RawResponse>>>,
        requests: Mutex<Vec<ApiRequest>>,
        calls: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, status: u16, body: impl Into<String>) -> Self {
            self.responses.lock().unwrap().push_back(Ok(RawResponse {
                status,
                body: body.into(),
            }));
            self
        }

        pub fn respond_json(self, status: u16, body: serde_json::Value) -> Self {
            self.respond(status, body.to_string())
        }

        pub fn fail(self, message: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(BridgeError::Connection(message.to_string())));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, request: ApiRequest) -> impl Future<Output = Result<RawResponse>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BridgeError::Connection("no scripted response".into())));
            async move { next }
        }
    }
}
