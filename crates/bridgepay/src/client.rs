//! REST client for the Bridge provider API.
//!
//! A [`Client`] is built per call chain from the merchant's credentials. It
//! addresses one resource at a time and keeps the pagination cursor of the
//! last list call so callers can drain a result set with
//! [`Client::next_page`]:
//!
//! ```no_run
//! # async fn demo() -> bridgepay::Result<()> {
//! use bridgepay::{Client, Credentials, ProviderConfig, ReqwestTransport};
//!
//! let transport = ReqwestTransport::default();
//! let credentials = Credentials::new("id", "secret");
//! let mut client = Client::new(transport, credentials, ProviderConfig::default());
//! let mut page = client.resource("banks").list(vec![("limit".into(), "250".into())]).await?;
//! loop {
//!     // use page.body
//!     match client.next_page().await? {
//!         Some(next) => page = next,
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{ProviderConfig, VERSION_HEADER};
use crate::error::{BridgeError, Result};
use crate::transport::{ApiRequest, HttpMethod, RawResponse, Transport};

/// Ordered query parameters.
pub type Query = Vec<(String, String)>;

/// Build a [`Query`] from string pairs.
pub fn query<const N: usize>(pairs: [(&str, &str); N]) -> Query {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Provider application credentials. The secret is wiped on drop and never
/// shown by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    id: String,
    secret: String,
}

impl Credentials {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Both halves present.
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// A provider-side collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Banks,
    PaymentRequests,
    Other(String),
}

impl Resource {
    /// Map a resource name to its endpoint: `payment_requests` addresses
    /// `payment-requests`.
    pub fn from_name(name: &str) -> Self {
        let endpoint = name.replace('_', "-");
        match endpoint.as_str() {
            "banks" => Resource::Banks,
            "payment-requests" => Resource::PaymentRequests,
            _ => Resource::Other(endpoint),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Resource::Banks => "banks",
            Resource::PaymentRequests => "payment-requests",
            Resource::Other(endpoint) => endpoint,
        }
    }
}

/// Operations on the selected resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    List(Query),
    Get(String),
    Create(Value),
}

/// Query parameters of the next page, taken from `pagination.next_uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    params: Query,
}

impl PaginationCursor {
    /// Keep the query string after the first `?` of `next_uri`. A URI with
    /// no query yields an empty cursor, which still means "there is a next
    /// page".
    pub fn from_next_uri(next_uri: &str) -> Self {
        let raw = next_uri.split_once('?').map(|(_, q)| q).unwrap_or("");
        let params = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { params }
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn from_body(body: &Value) -> Option<Self> {
        body.get("pagination")
            .and_then(|p| p.get("next_uri"))
            .and_then(Value::as_str)
            .filter(|uri| !uri.is_empty())
            .map(Self::from_next_uri)
    }
}

/// A decoded 200 response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub body: Value,
    pub cursor: Option<PaginationCursor>,
}

impl ApiResponse {
    pub fn has_next_page(&self) -> bool {
        self.cursor.is_some()
    }

    /// The `resources` array of a list response, empty when absent.
    pub fn resources(&self) -> &[Value] {
        self.body
            .get("resources")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Turn a non-200 answer into the error the caller sees.
fn classify_error(raw: &RawResponse) -> BridgeError {
    let decoded = serde_json::from_str::<Value>(&raw.body)
        .ok()
        .filter(|v| !v.is_null());

    let Some(decoded) = decoded else {
        return BridgeError::Provider(raw.body.clone());
    };

    if let Some(message) = decoded.get("message").filter(|m| !m.is_null()) {
        return BridgeError::Provider(value_text(message));
    }

    if let Some(message) = decoded
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|first| first.get("message"))
        .filter(|m| !m.is_null())
    {
        return BridgeError::Provider(value_text(message));
    }

    BridgeError::Provider("Unknown Bridge API response".to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bridge API client over a [`Transport`].
///
/// Not shareable across concurrent requests: it holds the current endpoint
/// and cursor. Build one per call chain.
pub struct Client<T: Transport> {
    transport: T,
    credentials: Credentials,
    config: ProviderConfig,
    endpoint: Option<String>,
    cursor: Option<PaginationCursor>,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, credentials: Credentials, config: ProviderConfig) -> Self {
        Self {
            transport,
            credentials,
            config,
            endpoint: None,
            cursor: None,
        }
    }

    /// Select the resource subsequent verbs operate on. Resets any cursor.
    pub fn resource(&mut self, name: &str) -> &mut Self {
        self.select(Resource::from_name(name))
    }

    pub fn select(&mut self, resource: Resource) -> &mut Self {
        self.endpoint = Some(resource.endpoint().to_string());
        self.cursor = None;
        self
    }

    /// The currently addressed endpoint, `None` once pagination is exhausted.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn cursor(&self) -> Option<&PaginationCursor> {
        self.cursor.as_ref()
    }

    pub async fn list(&mut self, query: Query) -> Result<ApiResponse> {
        self.dispatch(Verb::List(query)).await
    }

    pub async fn get(&mut self, id: &str) -> Result<ApiResponse> {
        self.dispatch(Verb::Get(id.to_string())).await
    }

    pub async fn create(&mut self, body: Value) -> Result<ApiResponse> {
        self.dispatch(Verb::Create(body)).await
    }

    /// Fetch the page after the last list response, or `None` without any
    /// network call when there is no cursor.
    pub async fn next_page(&mut self) -> Result<Option<ApiResponse>> {
        let Some(cursor) = self.cursor.clone() else {
            return Ok(None);
        };
        self.dispatch(Verb::List(cursor.params)).await.map(Some)
    }

    /// Execute `verb` against the selected resource.
    pub async fn dispatch(&mut self, verb: Verb) -> Result<ApiResponse> {
        if !self.credentials.is_complete() {
            return Err(BridgeError::Config(
                "Please finalize the plugin configuration".to_string(),
            ));
        }
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| BridgeError::Config("no resource selected".to_string()))?;

        let (method, path, params, body) = match verb {
            Verb::List(params) => (HttpMethod::Get, endpoint, params, None),
            Verb::Get(id) => (HttpMethod::Get, format!("{endpoint}/{id}"), Vec::new(), None),
            Verb::Create(body) => (
                HttpMethod::Post,
                endpoint,
                Vec::new(),
                Some(serde_json::to_string_pretty(&body)?),
            ),
        };

        let request = self.build_request(method, &path, &params, body);
        let url = request.url.clone();

        let raw = match self.transport.send(request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    method = method.as_str(),
                    url = %url,
                    error = %e,
                    "provider call failed"
                );
                return Err(e);
            }
        };

        tracing::debug!(method = method.as_str(), url = %url, status = raw.status, "provider call");

        if raw.status != 200 {
            let err = classify_error(&raw);
            tracing::warn!(
                method = method.as_str(),
                url = %url,
                status = raw.status,
                error = %err,
                "provider rejected call"
            );
            return Err(err);
        }

        let body: Value = serde_json::from_str(&raw.body)
            .map_err(|_| BridgeError::Provider("Unknown Bridge API response".to_string()))?;

        let cursor = PaginationCursor::from_body(&body);
        if cursor.is_none() {
            self.endpoint = None;
        }
        self.cursor = cursor.clone();

        Ok(ApiResponse { body, cursor })
    }

    fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<String>,
    ) -> ApiRequest {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();

        ApiRequest {
            url: format!("{}/{}?{}", self.config.base_url, path, query),
            method,
            headers: vec![
                ("Client-Id".to_string(), self.credentials.id().to_string()),
                (
                    "Client-Secret".to_string(),
                    self.credentials.secret().to_string(),
                ),
                (VERSION_HEADER.to_string(), self.config.api_version.clone()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::transport::mock::MockTransport;

    fn client(transport: Arc<MockTransport>) -> Client<Arc<MockTransport>> {
        Client::new(
            transport,
            Credentials::new("app-id", "app-secret"),
            ProviderConfig::default().with_base_url("https://bridge.test/v2"),
        )
    }

    #[test]
    fn test_resource_naming() {
        assert_eq!(Resource::from_name("payment_requests").endpoint(), "payment-requests");
        assert_eq!(Resource::from_name("payment_requests"), Resource::PaymentRequests);
        assert_eq!(Resource::from_name("banks"), Resource::Banks);
        assert_eq!(
            Resource::from_name("user_accounts"),
            Resource::Other("user-accounts".to_string())
        );

        let mut c = client(Arc::new(MockTransport::new()));
        c.resource("payment_requests");
        assert_eq!(c.endpoint(), Some("payment-requests"));
    }

    #[tokio::test]
    async fn test_pagination_drains_three_pages() {
        let transport = Arc::new(
            MockTransport::new()
                .respond_json(
                    200,
                    json!({"resources": [{"id": 1}, {"id": 2}],
                           "pagination": {"next_uri": "/v2/banks?after=abc&limit=2"}}),
                )
                .respond_json(
                    200,
                    json!({"resources": [{"id": 3}, {"id": 4}],
                           "pagination": {"next_uri": "/v2/banks?after=def&limit=2"}}),
                )
                .respond_json(
                    200,
                    json!({"resources": [{"id": 5}], "pagination": {"next_uri": null}}),
                ),
        );
        let mut c = client(transport.clone());

        let first = c
            .resource("banks")
            .list(query([("limit", "2")]))
            .await
            .unwrap();
        let mut ids: Vec<i64> = first
            .resources()
            .iter()
            .filter_map(|r| r["id"].as_i64())
            .collect();

        let mut pages = 1;
        while let Some(page) = c.next_page().await.unwrap() {
            pages += 1;
            ids.extend(page.resources().iter().filter_map(|r| r["id"].as_i64()));
        }

        assert_eq!(pages, 3);
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(transport.calls(), 3);
        assert!(c.endpoint().is_none());
        assert!(c.next_page().await.unwrap().is_none());
        assert_eq!(transport.calls(), 3);

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls[0], "https://bridge.test/v2/banks?limit=2");
        assert_eq!(urls[1], "https://bridge.test/v2/banks?after=abc&limit=2");
        assert_eq!(urls[2], "https://bridge.test/v2/banks?after=def&limit=2");
    }

    #[tokio::test]
    async fn test_missing_credentials_never_touch_network() {
        let transport = Arc::new(MockTransport::new().respond(200, "{}"));
        for creds in [
            Credentials::new("", "secret"),
            Credentials::new("id", ""),
            Credentials::default(),
        ] {
            let mut c = Client::new(transport.clone(), creds, ProviderConfig::default());
            let err = c.resource("banks").list(Vec::new()).await.unwrap_err();
            assert!(matches!(err, BridgeError::Config(_)));
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_headers_and_get_path() {
        let transport = Arc::new(MockTransport::new().respond_json(200, json!({"id": "pr_1"})));
        let mut c = client(transport.clone());
        let resp = c.resource("payment_requests").get("pr_1").await.unwrap();
        assert_eq!(resp.body["id"], "pr_1");

        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "https://bridge.test/v2/payment-requests/pr_1?");
        assert_eq!(req.header("Client-Id"), Some("app-id"));
        assert_eq!(req.header("Client-Secret"), Some("app-secret"));
        assert_eq!(req.header("Bridge-Version"), Some("2021-06-01"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_create_sends_pretty_json_with_plain_slashes() {
        let transport = Arc::new(
            MockTransport::new().respond_json(200, json!({"consent_url": "https://pay.test/c"})),
        );
        let mut c = client(transport.clone());
        c.resource("payment_requests")
            .create(json!({"successful_callback_url": "https://shop.test/ok"}))
            .await
            .unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Post);
        let body = req.body.as_deref().unwrap();
        assert!(body.contains("https://shop.test/ok"));
        assert!(body.contains('\n'));
    }

    #[tokio::test]
    async fn test_error_classification() {
        let transport = Arc::new(
            MockTransport::new()
                .respond_json(400, json!({"message": "Invalid client"}))
                .respond_json(
                    422,
                    json!({"errors": [{"message": "first"}, {"message": "second"}]}),
                )
                .respond_json(500, json!({"code": 7}))
                .respond_json(
                    400,
                    json!({"message": null, "errors": [{"message": "from errors"}]}),
                )
                .respond_json(400, json!({"message": null}))
                .respond_json(422, json!({"errors": [{"code": "invalid"}]}))
                .respond(502, "Bad Gateway")
                .fail("connection reset"),
        );
        let mut c = client(transport);

        let expect = [
            "Bridge Error: Invalid client",
            "Bridge Error: first",
            "Bridge Error: Unknown Bridge API response",
            "Bridge Error: from errors",
            "Bridge Error: Unknown Bridge API response",
            "Bridge Error: Unknown Bridge API response",
            "Bridge Error: Bad Gateway",
        ];
        for msg in expect {
            let err = c.resource("banks").list(Vec::new()).await.unwrap_err();
            assert!(matches!(err, BridgeError::Provider(_)));
            assert_eq!(err.to_string(), msg);
        }
        let err = c.resource("banks").list(Vec::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cursor_from_next_uri() {
        let cursor = PaginationCursor::from_next_uri("/v2/banks?after=x%20y&limit=5");
        assert_eq!(
            cursor.params(),
            &[
                ("after".to_string(), "x y".to_string()),
                ("limit".to_string(), "5".to_string())
            ]
        );
        assert!(PaginationCursor::from_next_uri("/v2/banks").params().is_empty());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let rendered = format!("{:?}", Credentials::new("id-1", "topsecret"));
        assert!(rendered.contains("id-1"));
        assert!(!rendered.contains("topsecret"));
    }
}
