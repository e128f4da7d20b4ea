//! Authentication module for managing tokens and sessions.
//!
//! This module provides:
//! - `TokenStore`: access/refresh token persistence over a pluggable `KeyValueStore`
//! - `KeyringStore`: OS keychain medium for the token store
//! - `session`: unverified JWT claim decoding for local expiry gating
//! - `RefreshCoordinator`: single-flight access token refresh
//!
//! Nothing here verifies token signatures. Trust decisions belong to the server.

pub mod credentials;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod types;

pub use credentials::KeyringStore;
pub use refresh::{RefreshCoordinator, RefreshEndpoint};
pub use session::{decode_claims, is_token_valid, is_token_valid_at};
pub use storage::{FileStore, KeyValueStore, MemoryStore, NullStore, StorageError, TokenStore};
pub use types::{DecodedSessionClaims, TokenPair};
