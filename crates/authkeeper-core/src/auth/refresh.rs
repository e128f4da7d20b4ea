//! Single-flight access token refresh.
//!
//! Any number of callers may ask for a refresh at once. Only the first one
//! starts a network call; the rest await the same shared future and receive
//! the identical outcome. The shared slot is cleared as soon as the refresh
//! settles, so the next caller starts a fresh cycle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::storage::TokenStore;
use super::types::TokenPair;
use crate::api::ApiError;

/// Default bound on a single refresh call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// The remote call that exchanges a refresh token for a new token pair.
#[async_trait]
pub trait RefreshEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;
}

type PendingRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// Serializes token refreshes so at most one is in flight per coordinator.
///
/// Clone is cheap and clones share the same in-flight slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    tokens: TokenStore,
    endpoint: Arc<dyn RefreshEndpoint>,
    timeout: Duration,
    pending: Mutex<Option<PendingRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(tokens: TokenStore, endpoint: Arc<dyn RefreshEndpoint>) -> Self {
        Self::with_timeout(tokens, endpoint, DEFAULT_REFRESH_TIMEOUT)
    }

    pub fn with_timeout(
        tokens: TokenStore,
        endpoint: Arc<dyn RefreshEndpoint>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                endpoint,
                timeout,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Obtain a new access token, joining an in-flight refresh if there is one.
    ///
    /// Never fails: a missing refresh token, an endpoint error, or a timeout
    /// all resolve to `None`.
    pub async fn refresh_access_token(&self) -> Option<String> {
        let pending = {
            let mut slot = self.inner.pending.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let pending = Self::start(Arc::downgrade(&self.inner));
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Whether a refresh is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        self.inner.pending.lock().await.is_some()
    }

    fn start(inner: Weak<Inner>) -> PendingRefresh {
        async move {
            let inner = inner.upgrade()?;
            let outcome = inner.run().await;
            inner.pending.lock().await.take();
            outcome
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn run(&self) -> Option<String> {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            debug!("No stored refresh token, skipping refresh");
            return None;
        };

        debug!("Starting token refresh");
        let result = tokio::time::timeout(self.timeout, self.endpoint.refresh(&refresh_token)).await;

        match result {
            Ok(Ok(pair)) => {
                if let Err(e) = self.tokens.set_refresh_token(&pair.refresh_token) {
                    warn!(error = %e, "Failed to persist rotated refresh token");
                }
                match pair.access() {
                    Some(token) => {
                        info!("Token refresh successful");
                        Some(token.to_string())
                    }
                    None => {
                        warn!("Refresh response did not contain an access token");
                        None
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Token refresh failed");
                None
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Token refresh timed out");
                None
            }
        }
    }
}
