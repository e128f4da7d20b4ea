//! Core library for authkeeper.
//!
//! Provides a client for a token-authenticated REST auth API:
//! - `auth`: token storage, session claim decoding, single-flight refresh
//! - `api`: the authenticated request pipeline, transport, and `AuthClient`
//! - `config`: client configuration loading

pub mod api;
pub mod auth;
pub mod config;

pub use api::{
    ApiError, ApiRequest, ApiResponse, AuthClient, AuthEndpoints, AuthenticatedPipeline,
    ReqwestTransport, Transport, UnauthorizedCallback,
};
pub use auth::{
    is_token_valid, DecodedSessionClaims, KeyValueStore, RefreshCoordinator, RefreshEndpoint,
    StorageError, TokenPair, TokenStore,
};
pub use config::{AuthConfig, ClientKind, StorageBackend};
