use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field names tried, in order, for the access token in auth responses.
pub const ACCESS_TOKEN_ALIASES: &[&str] = &["accessToken", "access_token", "access"];

/// Field names tried, in order, for the refresh token in auth responses.
pub const REFRESH_TOKEN_ALIASES: &[&str] = &["refreshToken", "refresh_token", "refresh"];

/// Nested object some auth responses wrap their tokens in.
const NESTED_TOKENS_FIELD: &str = "tokens";

/// Access and refresh token pair. An empty string means the token is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Resolve a token pair from an arbitrary auth response body.
    ///
    /// Each token is looked up through its alias table, first at the top
    /// level and then inside a nested `tokens` object. The first non-empty
    /// string wins. Missing tokens resolve to empty strings.
    pub fn from_response(body: &Value) -> Self {
        Self {
            access_token: resolve_alias(body, ACCESS_TOKEN_ALIASES)
                .unwrap_or_default()
                .to_string(),
            refresh_token: resolve_alias(body, REFRESH_TOKEN_ALIASES)
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn access(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    pub fn refresh(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && self.refresh_token.is_empty()
    }
}

/// Claims read from an access token payload. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct DecodedSessionClaims {
    pub expires_at_epoch_seconds: i64,
}

impl DecodedSessionClaims {
    pub fn is_expired_at(&self, now_epoch_seconds: i64) -> bool {
        self.expires_at_epoch_seconds <= now_epoch_seconds
    }
}

/// Look up the first non-empty string field named by `aliases`.
pub fn resolve_alias<'a>(body: &'a Value, aliases: &[&str]) -> Option<&'a str> {
    lookup(body, aliases).or_else(|| {
        body.get(NESTED_TOKENS_FIELD)
            .and_then(|nested| lookup(nested, aliases))
    })
}

fn lookup<'a>(scope: &'a Value, aliases: &[&str]) -> Option<&'a str> {
    let object = scope.as_object()?;
    aliases
        .iter()
        .filter_map(|alias| object.get(*alias).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
