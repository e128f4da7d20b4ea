//! Client for the token-authenticated auth API.
//!
//! `AuthClient` owns the endpoint table, the token store, and the refresh
//! coordinator, and hands out authenticated pipelines that share them.
//! Public calls (login, OTP, refresh) go straight to the transport.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use reqwest::header::HeaderName;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::endpoints::{join_url, AuthEndpoints};
use super::pipeline::{
    ApiRequest, ApiResponse, AuthenticatedPipeline, Transport, UnauthorizedCallback,
};
use super::transport::ReqwestTransport;
use super::types::{
    AccountConfirmationPayload, AccountConfirmationResendPayload, AccountUpdatePayload,
    ApiDetailResponse, AuthResponse, ClientPayload, CreateAdminUserPayload, DeleteAccountPayload,
    LinkSocialPayload, LoginBasicPayload, LoginSocialPayload, PasswordChangePayload,
    PasswordResetConfirmPayload, PasswordResetRequestPayload, ProfilePicturePayload,
    RegisterPayload, RequestOtpPayload, SwitchProfilePayload, UnlinkSocialPayload, UpdateMethod,
    VerifyOtpPayload,
};
use super::ApiError;
use crate::auth::{is_token_valid, RefreshCoordinator, RefreshEndpoint, StorageError, TokenPair, TokenStore};
use crate::config::{AuthConfig, ClientKind};

/// Header that authorizes admin creation before any admin exists
const ADMIN_BOOTSTRAP_HEADER: &str = "x-admin-bootstrap-token";

/// Calls the refresh endpoint without touching the token store.
struct HttpRefreshEndpoint {
    transport: Arc<dyn Transport>,
    url: String,
}

#[async_trait]
impl RefreshEndpoint for HttpRefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let request = ApiRequest::post(self.url.clone()).json(&json!({ "refresh": refresh_token }))?;
        let body: Value = check_response(self.transport.send(request).await?)?.json()?;
        Ok(TokenPair::from_response(&body))
    }
}

fn check_response(response: ApiResponse) -> Result<ApiResponse, ApiError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(response.into_error())
    }
}

/// Builder for [`AuthClient`]. Transport and token store default to the
/// ones described by the config.
pub struct AuthClientBuilder {
    config: AuthConfig,
    transport: Option<Arc<dyn Transport>>,
    tokens: Option<TokenStore>,
    endpoints: Option<AuthEndpoints>,
    on_unauthorized: Option<UnauthorizedCallback>,
}

impl AuthClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_store(mut self, tokens: TokenStore) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Replace the endpoint table derived from the configured base path
    pub fn endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn on_unauthorized(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<AuthClient, ApiError> {
        let base_url = self.config.api_base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Configuration("api_base_url is required".to_string()));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.config.request_timeout())?),
        };
        let tokens = self
            .tokens
            .unwrap_or_else(|| self.config.open_token_store());
        let endpoints = self
            .endpoints
            .unwrap_or_else(|| AuthEndpoints::new(Some(&self.config.api_base_path)));

        let refresh_endpoint = Arc::new(HttpRefreshEndpoint {
            transport: Arc::clone(&transport),
            url: join_url(&base_url, &endpoints.refresh),
        });
        let coordinator = RefreshCoordinator::with_timeout(
            tokens.clone(),
            refresh_endpoint,
            self.config.refresh_timeout(),
        );

        Ok(AuthClient {
            base_url,
            endpoints,
            default_client: self.config.default_client,
            transport,
            tokens,
            coordinator,
            on_unauthorized: self.on_unauthorized,
        })
    }
}

/// Clone is cheap; clones share the transport, token store, and refresh slot.
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    endpoints: AuthEndpoints,
    default_client: ClientKind,
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    coordinator: RefreshCoordinator,
    on_unauthorized: Option<UnauthorizedCallback>,
}

impl AuthClient {
    pub fn builder(config: AuthConfig) -> AuthClientBuilder {
        AuthClientBuilder {
            config,
            transport: None,
            tokens: None,
            endpoints: None,
            on_unauthorized: None,
        }
    }

    /// Client over reqwest and the configured token store
    pub fn new(config: AuthConfig) -> Result<Self, ApiError> {
        Self::builder(config).build()
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.access_token()
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.tokens.set_access_token(token)
    }

    /// Drop the access token only; the refresh token survives
    pub fn clear_session(&self) -> Result<(), StorageError> {
        self.tokens.remove_access_token()
    }

    /// Pipeline that reports 401s to the unauthorized callback without retrying
    pub fn authenticated(&self) -> AuthenticatedPipeline {
        AuthenticatedPipeline::without_refresh(Arc::clone(&self.transport), self.tokens.clone())
            .on_unauthorized(self.on_unauthorized.clone())
    }

    /// Pipeline that refreshes once and replays on a first 401
    pub fn authenticated_with_refresh(&self) -> AuthenticatedPipeline {
        AuthenticatedPipeline::with_refresh(
            Arc::clone(&self.transport),
            self.tokens.clone(),
            self.coordinator.clone(),
        )
        .on_unauthorized(self.on_unauthorized.clone())
    }

    async fn post_public<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = ApiRequest::post(self.url(path)).json(body)?;
        check_response(self.transport.send(request).await?)?.json()
    }

    async fn send_with_refresh<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.authenticated_with_refresh().send_json(request).await
    }

    fn persist_tokens(&self, pair: &TokenPair) -> Result<(), StorageError> {
        if let Some(access) = pair.access() {
            self.tokens.set_access_token(access)?;
        }
        self.tokens.set_refresh_token(&pair.refresh_token)
    }

    fn persist_session(&self, response: &AuthResponse) -> Result<(), StorageError> {
        self.persist_tokens(&response.token_pair())
    }

    // ===== Public Calls =====

    /// Log in with a login (email, username, or phone) and password
    pub async fn login_basic(&self, payload: &LoginBasicPayload) -> Result<AuthResponse, ApiError> {
        let mut payload = payload.clone();
        payload.apply_client(self.default_client);
        debug!(login = %payload.login, "Signing in");

        let response: AuthResponse = self.post_public(&self.endpoints.login_basic, &payload).await?;
        self.persist_session(&response)?;
        info!("Sign in successful");
        Ok(response)
    }

    /// Log in with provider credentials
    pub async fn login_social(&self, payload: &LoginSocialPayload) -> Result<AuthResponse, ApiError> {
        let mut payload = payload.clone();
        payload.apply_client(self.default_client);
        debug!(provider = ?payload.provider, "Signing in with social provider");

        let response: AuthResponse = self.post_public(&self.endpoints.login_social, &payload).await?;
        self.persist_session(&response)?;
        info!("Social sign in successful");
        Ok(response)
    }

    /// Ask whether social credentials map to an existing account. Stores nothing.
    pub async fn login_social_precheck(&self, payload: &LoginSocialPayload) -> Result<Value, ApiError> {
        let mut payload = payload.clone();
        payload.apply_client(self.default_client);
        self.post_public(&self.endpoints.login_social_precheck, &payload).await
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<ApiDetailResponse, ApiError> {
        let body: Value = self.post_public(&self.endpoints.register, payload).await?;
        Ok(ApiDetailResponse::from(body))
    }

    pub async fn confirm_account_email(
        &self,
        payload: &AccountConfirmationPayload,
    ) -> Result<ApiDetailResponse, ApiError> {
        let body: Value = self.post_public(&self.endpoints.account_confirmation, payload).await?;
        Ok(ApiDetailResponse::from(body))
    }

    pub async fn resend_account_confirmation(
        &self,
        payload: &AccountConfirmationResendPayload,
    ) -> Result<ApiDetailResponse, ApiError> {
        let body: Value = self
            .post_public(&self.endpoints.account_confirmation_resend, payload)
            .await?;
        Ok(ApiDetailResponse::from(body))
    }

    pub async fn request_password_reset(
        &self,
        payload: &PasswordResetRequestPayload,
    ) -> Result<ApiDetailResponse, ApiError> {
        let body: Value = self.post_public(&self.endpoints.password_reset_request, payload).await?;
        Ok(ApiDetailResponse::from(body))
    }

    pub async fn confirm_password_reset(
        &self,
        payload: &PasswordResetConfirmPayload,
    ) -> Result<Value, ApiError> {
        self.post_public(&self.endpoints.password_reset_confirm, payload).await
    }

    pub async fn request_otp(&self, payload: &RequestOtpPayload) -> Result<Value, ApiError> {
        self.post_public(&self.endpoints.otp_request, payload).await
    }

    pub async fn verify_otp(&self, payload: &VerifyOtpPayload) -> Result<AuthResponse, ApiError> {
        let mut payload = payload.clone();
        payload.apply_client(self.default_client);

        let response: AuthResponse = self.post_public(&self.endpoints.otp_verify, &payload).await?;
        self.persist_session(&response)?;
        info!("OTP verification successful");
        Ok(response)
    }

    /// Exchange a refresh token (explicit, or the stored one) for a new pair.
    ///
    /// With no refresh token available this returns an empty pair without a
    /// network call. Unlike the coordinator, failures are returned as errors.
    pub async fn refresh_token(&self, refresh_token: Option<&str>) -> Result<TokenPair, ApiError> {
        let stored;
        let refresh_token = match refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => match self.tokens.refresh_token() {
                Some(token) => {
                    stored = token;
                    stored.as_str()
                }
                None => return Ok(TokenPair::default()),
            },
        };

        let body: Value = self
            .post_public(&self.endpoints.refresh, &json!({ "refresh": refresh_token }))
            .await?;
        let pair = TokenPair::from_response(&body);
        self.persist_tokens(&pair)?;
        Ok(pair)
    }

    // ===== Authenticated Calls =====

    pub async fn get_me(&self) -> Result<AuthResponse, ApiError> {
        self.send_with_refresh(ApiRequest::get(self.url(&self.endpoints.me))).await
    }

    pub async fn update_profile_picture(&self, payload: &ProfilePicturePayload) -> Result<Value, ApiError> {
        let request = ApiRequest::patch(self.url(&self.endpoints.profile_picture)).json(payload)?;
        self.send_with_refresh(request).await
    }

    pub async fn update_account(
        &self,
        payload: &AccountUpdatePayload,
        method: UpdateMethod,
    ) -> Result<Value, ApiError> {
        let url = self.url(&self.endpoints.account_update);
        let request = match method {
            UpdateMethod::Patch => ApiRequest::patch(url),
            UpdateMethod::Put => ApiRequest::put(url),
        };
        self.send_with_refresh(request.json(payload)?).await
    }

    /// Delete the account. The confirmation travels in the DELETE body.
    pub async fn delete_account(&self, payload: &DeleteAccountPayload) -> Result<Value, ApiError> {
        let request = ApiRequest::delete(self.url(&self.endpoints.account_delete)).json(payload)?;
        self.send_with_refresh(request).await
    }

    /// Either a bare list of profiles or a paginated `{ "results": [...] }` object
    pub async fn get_profiles(&self) -> Result<Value, ApiError> {
        self.send_with_refresh(ApiRequest::get(self.url(&self.endpoints.profiles)))
            .await
    }

    pub async fn get_profile_by_id(&self, profile_id: impl Display) -> Result<Value, ApiError> {
        self.send_with_refresh(ApiRequest::get(self.url(&self.endpoints.profile(profile_id))))
            .await
    }

    pub async fn create_profile<B: Serialize>(&self, payload: &B) -> Result<Value, ApiError> {
        let request = ApiRequest::post(self.url(&self.endpoints.profiles)).json(payload)?;
        self.send_with_refresh(request).await
    }

    pub async fn update_profile<B: Serialize>(
        &self,
        profile_id: impl Display,
        payload: &B,
    ) -> Result<Value, ApiError> {
        let request = ApiRequest::patch(self.url(&self.endpoints.profile(profile_id))).json(payload)?;
        self.send_with_refresh(request).await
    }

    pub async fn delete_profile(&self, profile_id: impl Display) -> Result<Value, ApiError> {
        self.send_with_refresh(ApiRequest::delete(self.url(&self.endpoints.profile(profile_id))))
            .await
    }

    pub async fn change_password(&self, payload: &PasswordChangePayload) -> Result<Value, ApiError> {
        let request = ApiRequest::post(self.url(&self.endpoints.password_change)).json(payload)?;
        self.send_with_refresh(request).await
    }

    pub async fn link_social(&self, payload: &LinkSocialPayload) -> Result<Value, ApiError> {
        let request = ApiRequest::post(self.url(&self.endpoints.login_social_link)).json(payload)?;
        self.send_with_refresh(request).await
    }

    pub async fn unlink_social(&self, payload: &UnlinkSocialPayload) -> Result<Value, ApiError> {
        let request = ApiRequest::post(self.url(&self.endpoints.login_social_unlink)).json(payload)?;
        self.send_with_refresh(request).await
    }

    // ===== Admin =====

    /// Create a superuser. With a bootstrap token the call is public and
    /// carries the token header; otherwise the current session authorizes it.
    pub async fn create_superuser(
        &self,
        payload: &CreateAdminUserPayload,
        bootstrap_token: Option<&str>,
    ) -> Result<Value, ApiError> {
        self.create_admin_user(&self.endpoints.admin_create_superuser, payload, bootstrap_token)
            .await
    }

    /// Create a staff user; authorization works as in [`Self::create_superuser`]
    pub async fn create_staff_user(
        &self,
        payload: &CreateAdminUserPayload,
        bootstrap_token: Option<&str>,
    ) -> Result<Value, ApiError> {
        self.create_admin_user(&self.endpoints.admin_create_staff, payload, bootstrap_token)
            .await
    }

    async fn create_admin_user(
        &self,
        path: &str,
        payload: &CreateAdminUserPayload,
        bootstrap_token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let request = ApiRequest::post(self.url(path)).json(payload)?;
        match bootstrap_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                let request = request.header(HeaderName::from_static(ADMIN_BOOTSTRAP_HEADER), token)?;
                check_response(self.transport.send(request).await?)?.json()
            }
            None => self.send_with_refresh(request).await,
        }
    }

    /// Switch the active profile. Uses the non-refreshing pipeline since the
    /// response replaces the session tokens anyway.
    pub async fn switch_profile(&self, payload: &SwitchProfilePayload) -> Result<AuthResponse, ApiError> {
        let mut payload = payload.clone();
        payload.apply_client(self.default_client);

        let request = ApiRequest::post(self.url(&self.endpoints.switch_profile)).json(&payload)?;
        let response: AuthResponse = self.authenticated().send_json(request).await?;
        self.persist_session(&response)?;
        Ok(response)
    }

    // ===== Session Lifecycle =====

    /// Return a locally valid access token, refreshing first if the stored
    /// one is missing, malformed, or expired.
    pub async fn ensure_access_token(&self) -> Result<Option<String>, StorageError> {
        let current = self.tokens.access_token();
        if is_token_valid(current.as_deref()) {
            return Ok(current);
        }

        debug!("Stored access token is not valid, attempting refresh");
        match self.coordinator.refresh_access_token().await {
            Some(token) => {
                self.tokens.set_access_token(&token)?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Restore a previous session from storage.
    ///
    /// Returns `None` when no usable token remains. A session the server
    /// rejects is logged out; network failures are returned as errors and
    /// leave storage untouched.
    pub async fn restore_session(&self) -> Result<Option<AuthResponse>, ApiError> {
        if self.ensure_access_token().await?.is_none() {
            return Ok(None);
        }

        match self.get_me().await {
            Ok(response) => Ok(Some(response)),
            Err(e @ ApiError::Status { .. }) => {
                warn!(error = %e, "Stored session rejected, logging out");
                self.logout()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove both tokens from storage
    pub fn logout(&self) -> Result<(), StorageError> {
        self.tokens.clear()?;
        info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_base_url() {
        let result = AuthClient::builder(AuthConfig::default())
            .token_store(TokenStore::in_memory())
            .build();
        assert!(matches!(result, Err(ApiError::Configuration(_))));
    }

    #[test]
    fn test_url_joins_base_and_endpoint() {
        let client = AuthClient::builder(AuthConfig::new("https://api.example.com/"))
            .token_store(TokenStore::in_memory())
            .build()
            .unwrap();
        assert_eq!(
            client.url(&client.endpoints().refresh),
            "https://api.example.com/authentication/token/refresh/"
        );
    }

    #[test]
    fn test_custom_base_path() {
        let mut config = AuthConfig::new("https://api.example.com");
        config.api_base_path = "auth/".to_string();
        let client = AuthClient::builder(config)
            .token_store(TokenStore::in_memory())
            .build()
            .unwrap();
        assert_eq!(client.endpoints().me, "/auth/me/?client=web");
    }

    #[test]
    fn test_clear_session_keeps_refresh_token() {
        let tokens = TokenStore::in_memory();
        tokens.set_access_token("at").unwrap();
        tokens.set_refresh_token("rt").unwrap();
        let client = AuthClient::builder(AuthConfig::new("https://api.example.com"))
            .token_store(tokens.clone())
            .build()
            .unwrap();

        client.clear_session().unwrap();
        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.refresh_token().as_deref(), Some("rt"));

        client.logout().unwrap();
        assert_eq!(tokens.refresh_token(), None);
    }
}
