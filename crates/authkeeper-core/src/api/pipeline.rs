//! Authenticated request pipeline.
//!
//! Every request passes an outgoing stage that attaches the stored access
//! token as a bearer credential, then the transport, then an error stage.
//! In refreshing mode a first 401 triggers a single-flight refresh and one
//! replay of the request; anything after that is terminal.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{RefreshCoordinator, TokenStore};

/// Invoked with no arguments once session recovery has definitively failed.
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

/// A replayable outgoing request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Configuration(format!("Unserializable request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, ApiError> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| ApiError::Configuration(format!("Invalid value for header {}", name)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Whether this request has already been replayed after a 401
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Bearer token currently attached, if any
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    fn set_bearer(&mut self, token: &str) -> Result<(), ApiError> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::Configuration("Access token is not a valid header value".to_string()))?;
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }
}

/// A received HTTP response, any status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parse the body as JSON. An empty body parses as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    pub fn into_error(self) -> ApiError {
        ApiError::from_status(self.status, self.body)
    }
}

/// Request-sending capability the pipeline wraps.
///
/// Implementations return `Ok` for every HTTP response regardless of status
/// and `Err` only when no response was obtained.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Sends requests with the stored bearer token and handles 401 responses.
#[derive(Clone)]
pub struct AuthenticatedPipeline {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    refresh: Option<RefreshCoordinator>,
    on_unauthorized: Option<UnauthorizedCallback>,
}

impl AuthenticatedPipeline {
    /// Pipeline that refreshes and replays once on a first 401
    pub fn with_refresh(
        transport: Arc<dyn Transport>,
        tokens: TokenStore,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            tokens,
            refresh: Some(coordinator),
            on_unauthorized: None,
        }
    }

    /// Pipeline that reports every 401 as unauthorized without retrying
    pub fn without_refresh(transport: Arc<dyn Transport>, tokens: TokenStore) -> Self {
        Self {
            transport,
            tokens,
            refresh: None,
            on_unauthorized: None,
        }
    }

    pub fn on_unauthorized(mut self, callback: Option<UnauthorizedCallback>) -> Self {
        self.on_unauthorized = callback;
        self
    }

    /// Send a request, returning the successful response or the original error.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.authorize(&mut request)?;
        loop {
            let response = self.transport.send(request.clone()).await?;
            if response.is_success() {
                return Ok(response);
            }

            let error = response.into_error();
            if !error.is_unauthorized() {
                return Err(error);
            }

            let coordinator = match &self.refresh {
                Some(coordinator) if !request.is_retried() => coordinator,
                _ => {
                    debug!(url = %request.url, retried = request.is_retried(), "Unauthorized, not retrying");
                    self.notify_unauthorized();
                    return Err(error);
                }
            };

            request.retried = true;
            debug!(url = %request.url, "Unauthorized, awaiting token refresh");

            match coordinator.refresh_access_token().await {
                Some(token) => {
                    self.tokens.set_access_token(&token)?;
                    // The replay carries the refreshed token even if storage drops it
                    request.set_bearer(&token)?;
                    debug!(url = %request.url, "Replaying request with refreshed token");
                }
                None => {
                    warn!(url = %request.url, "Session could not be refreshed");
                    self.notify_unauthorized();
                    return Err(error);
                }
            }
        }
    }

    /// Send a request and parse the successful response body as JSON
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    /// Outgoing stage: anonymous requests pass through unmodified.
    fn authorize(&self, request: &mut ApiRequest) -> Result<(), ApiError> {
        match self.tokens.access_token() {
            Some(token) => request.set_bearer(&token),
            None => Ok(()),
        }
    }

    fn notify_unauthorized(&self) {
        if let Some(callback) = &self.on_unauthorized {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RefreshEndpoint, TokenPair};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync>;

    /// Transport that records bearer tokens and answers through a closure.
    struct ScriptedTransport {
        seen: Mutex<Vec<Option<String>>>,
        responder: Responder,
    }

    impl ScriptedTransport {
        fn new(
            responder: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            })
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            self.seen
                .lock()
                .unwrap()
                .push(request.bearer_token().map(str::to_string));
            (self.responder)(&request)
        }
    }

    /// Accepts only the given token; anything else is a 401.
    fn accept_token(token: &'static str) -> impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> {
        move |request: &ApiRequest| {
            if request.bearer_token() == Some(token) {
                Ok(ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#))
            } else {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"detail":"expired"}"#))
            }
        }
    }

    struct CountingEndpoint {
        calls: AtomicUsize,
        gate: Option<Notify>,
        response: Option<TokenPair>,
    }

    impl CountingEndpoint {
        fn ok(pair: TokenPair) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: None,
                response: Some(pair),
            })
        }

        fn gated(pair: TokenPair) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Some(Notify::new()),
                response: Some(pair),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: None,
                response: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshEndpoint for CountingEndpoint {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.response
                .clone()
                .ok_or_else(|| ApiError::from_status(StatusCode::UNAUTHORIZED, "refresh revoked"))
        }
    }

    fn session(access: &str, refresh: &str) -> TokenStore {
        let tokens = TokenStore::in_memory();
        tokens.set_access_token(access).unwrap();
        tokens.set_refresh_token(refresh).unwrap();
        tokens
    }

    fn counting_callback() -> (Arc<AtomicUsize>, UnauthorizedCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: UnauthorizedCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    fn refreshing(
        transport: Arc<ScriptedTransport>,
        tokens: &TokenStore,
        endpoint: Arc<CountingEndpoint>,
        callback: UnauthorizedCallback,
    ) -> AuthenticatedPipeline {
        let coordinator = RefreshCoordinator::new(tokens.clone(), endpoint);
        AuthenticatedPipeline::with_refresh(transport, tokens.clone(), coordinator)
            .on_unauthorized(Some(callback))
    }

    #[tokio::test]
    async fn test_attaches_bearer_when_token_stored() {
        let transport = ScriptedTransport::new(accept_token("at"));
        let tokens = session("at", "rt");
        let pipeline = AuthenticatedPipeline::without_refresh(transport.clone(), tokens);

        pipeline.send(ApiRequest::get("/me/")).await.unwrap();
        assert_eq!(transport.seen(), vec![Some("at".to_string())]);
    }

    #[tokio::test]
    async fn test_anonymous_request_passes_unmodified() {
        let transport = ScriptedTransport::new(|_| Ok(ApiResponse::new(StatusCode::OK, "{}")));
        let pipeline =
            AuthenticatedPipeline::without_refresh(transport.clone(), TokenStore::in_memory());

        pipeline.send(ApiRequest::get("/public/")).await.unwrap();
        assert_eq!(transport.seen(), vec![None]);
    }

    #[tokio::test]
    async fn test_refresh_and_replay_once() {
        let transport = ScriptedTransport::new(accept_token("new-at"));
        let tokens = session("old-at", "r1");
        let endpoint = CountingEndpoint::ok(TokenPair::new("new-at", "r2"));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport.clone(), &tokens, endpoint.clone(), callback);

        let value: Value = pipeline.send_json(ApiRequest::get("/me/")).await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(
            transport.seen(),
            vec![Some("old-at".to_string()), Some("new-at".to_string())]
        );
        assert_eq!(tokens.access_token().as_deref(), Some("new-at"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("r2"));
        assert_eq!(unauthorized.load(Ordering::SeqCst), 0);
    }

    /// Keeps the refresh token but never hands back an access token.
    struct AccessDroppingStore;

    impl crate::auth::KeyValueStore for AccessDroppingStore {
        fn get(&self, key: &str) -> Result<Option<String>, crate::auth::StorageError> {
            Ok((key == "refresh").then(|| "r1".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), crate::auth::StorageError> {
            Ok(())
        }

        fn remove(&self, _key: &str) -> Result<(), crate::auth::StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_replay_uses_refreshed_token_when_storage_drops_it() {
        let transport = ScriptedTransport::new(accept_token("new-at"));
        let tokens = TokenStore::new(Arc::new(AccessDroppingStore), "access", "refresh");
        let endpoint = CountingEndpoint::ok(TokenPair::new("new-at", ""));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport.clone(), &tokens, endpoint.clone(), callback);

        pipeline.send(ApiRequest::get("/me/")).await.unwrap();

        assert_eq!(transport.seen(), vec![None, Some("new-at".to_string())]);
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_terminal() {
        // Rejects every token, including the refreshed one
        let transport = ScriptedTransport::new(accept_token("never"));
        let tokens = session("old-at", "r1");
        let endpoint = CountingEndpoint::ok(TokenPair::new("new-at", ""));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport.clone(), &tokens, endpoint.clone(), callback);

        let error = pipeline.send(ApiRequest::get("/me/")).await.unwrap_err();

        assert!(error.is_unauthorized());
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(transport.seen().len(), 2);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_reports_unauthorized_with_original_error() {
        let transport = ScriptedTransport::new(accept_token("new-at"));
        let tokens = session("old-at", "r1");
        let endpoint = CountingEndpoint::failing();
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport.clone(), &tokens, endpoint.clone(), callback);

        let error = pipeline.send(ApiRequest::get("/me/")).await.unwrap_err();

        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(error.body(), Some(r#"{"detail":"expired"}"#));
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(transport.seen().len(), 1);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
        assert_eq!(tokens.access_token().as_deref(), Some("old-at"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_reports_unauthorized() {
        let transport = ScriptedTransport::new(accept_token("new-at"));
        let tokens = TokenStore::in_memory();
        tokens.set_access_token("old-at").unwrap();
        let endpoint = CountingEndpoint::ok(TokenPair::new("new-at", ""));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport, &tokens, endpoint.clone(), callback);

        assert!(pipeline.send(ApiRequest::get("/me/")).await.is_err());
        assert_eq!(endpoint.calls(), 0);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let transport = ScriptedTransport::new(|_| {
            Ok(ApiResponse::new(StatusCode::FORBIDDEN, r#"{"detail":"forbidden"}"#))
        });
        let tokens = session("at", "r1");
        let endpoint = CountingEndpoint::ok(TokenPair::new("new-at", ""));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport, &tokens, endpoint.clone(), callback);

        let error = pipeline.send(ApiRequest::get("/admin/")).await.unwrap_err();

        assert_eq!(error.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(error.body(), Some(r#"{"detail":"forbidden"}"#));
        assert_eq!(endpoint.calls(), 0);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_failure_pass_through() {
        let transport = ScriptedTransport::new(|_| Err(ApiError::Network("refused".to_string())));
        let tokens = session("at", "r1");
        let endpoint = CountingEndpoint::ok(TokenPair::new("new-at", ""));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport, &tokens, endpoint.clone(), callback);

        let error = pipeline.send(ApiRequest::get("/me/")).await.unwrap_err();

        assert!(matches!(error, ApiError::Network(ref msg) if msg == "refused"));
        assert_eq!(endpoint.calls(), 0);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_refreshing_pipeline_reports_without_retry() {
        let transport = ScriptedTransport::new(accept_token("new-at"));
        let tokens = session("old-at", "r1");
        let (unauthorized, callback) = counting_callback();
        let pipeline = AuthenticatedPipeline::without_refresh(transport.clone(), tokens)
            .on_unauthorized(Some(callback));

        let error = pipeline.send(ApiRequest::get("/me/")).await.unwrap_err();

        assert!(error.is_unauthorized());
        assert_eq!(transport.seen().len(), 1);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_requests_share_refresh() {
        let transport = ScriptedTransport::new(accept_token("new-at"));
        let tokens = session("old-at", "r1");
        let endpoint = CountingEndpoint::gated(TokenPair::new("new-at", "r2"));
        let (unauthorized, callback) = counting_callback();
        let pipeline = refreshing(transport.clone(), &tokens, endpoint.clone(), callback);

        let release = async {
            tokio::task::yield_now().await;
            if let Some(gate) = &endpoint.gate {
                gate.notify_one();
            }
        };
        let (first, second, ()) = tokio::join!(
            pipeline.send(ApiRequest::get("/me/")),
            pipeline.send(ApiRequest::get("/profiles/")),
            release
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(endpoint.calls(), 1);

        let seen = transport.seen();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.iter().filter(|t| t.as_deref() == Some("new-at")).count(), 2);
        assert_eq!(unauthorized.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::post("/login/")
            .json(&serde_json::json!({ "login": "user" }))
            .unwrap()
            .header(header::ACCEPT, "application/json")
            .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body.as_ref().unwrap()["login"], "user");
        assert!(!request.is_retried());
        assert_eq!(request.bearer_token(), None);
    }
}
