//! Request and response payloads for the auth API. Field names follow the
//! API's camelCase convention.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::TokenPair;
use crate::config::ClientKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_token: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBasicPayload {
    pub login: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DevicePayload>,
}

impl LoginBasicPayload {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            client: None,
            device: None,
        }
    }
}

impl std::fmt::Debug for LoginBasicPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginBasicPayload")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("client", &self.client)
            .field("device", &self.device)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannel {
    Sms,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpPayload {
    pub channel: OtpChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpPayload {
    pub channel: OtpChannel,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DevicePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchProfilePayload {
    pub profile: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DevicePayload>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangePayload {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Google,
    Facebook,
    Apple,
}

/// Provider credentials for social login. Which fields are needed depends
/// on the provider's flow (ID token, access token, or authorization code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSocialPayload {
    pub provider: SocialProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_and_conditions_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DevicePayload>,
}

impl LoginSocialPayload {
    pub fn new(provider: SocialProvider) -> Self {
        Self {
            provider,
            id_token: None,
            access_token: None,
            authorization_code: None,
            redirect_uri: None,
            code_verifier: None,
            client_id: None,
            role: None,
            client: None,
            terms_and_conditions_accepted: None,
            device: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSocialPayload {
    pub provider: SocialProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkSocialPayload {
    pub provider: SocialProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_confirm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "lastName1")]
    pub last_name_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "lastName2")]
    pub last_name_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_and_conditions_accepted: Option<bool>,
}

impl std::fmt::Debug for RegisterPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterPayload")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfirmationPayload {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub email: String,
}

/// Body of the confirmation-resend and password-reset request calls
pub type AccountConfirmationResendPayload = EmailPayload;
pub type PasswordResetRequestPayload = EmailPayload;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirmPayload {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// Account fields to update. Unlisted fields go through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_and_conditions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// HTTP method for account updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateMethod {
    #[default]
    Patch,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccountPayload {
    pub confirmation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePicturePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<i64>,
    pub picture: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CreateAdminUserPayload {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for CreateAdminUserPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateAdminUserPayload")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Response of registration, confirmation, and password reset requests.
///
/// `email_sent` is read from either `emailSent` or `email_sent`; the full
/// body stays available in `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDetailResponse {
    pub detail: Option<String>,
    pub email_sent: Option<bool>,
    #[serde(skip)]
    pub data: Map<String, Value>,
}

impl From<Value> for ApiDetailResponse {
    fn from(value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let detail = data.get("detail").and_then(Value::as_str).map(str::to_string);
        let email_sent = data
            .get("emailSent")
            .and_then(Value::as_bool)
            .or_else(|| data.get("email_sent").and_then(Value::as_bool));
        Self {
            detail,
            email_sent,
            data,
        }
    }
}

/// Response of login, OTP verification, profile switch, and `me`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthResponse {
    pub user: Value,
    pub active_profile: Value,
    pub terms_and_conditions: Option<String>,
    pub tokens: Option<Value>,
}

impl AuthResponse {
    /// Tokens carried by the response, resolved through the alias tables
    pub fn token_pair(&self) -> TokenPair {
        self.tokens
            .as_ref()
            .map(TokenPair::from_response)
            .unwrap_or_default()
    }
}

/// Payloads that report which kind of client is logging in.
pub(crate) trait ClientPayload {
    fn client_slot(&mut self) -> &mut Option<ClientKind>;
    fn device_slot(&mut self) -> &mut Option<DevicePayload>;

    /// Fill in the default client kind. Web clients never send device info.
    fn apply_client(&mut self, default: ClientKind) {
        let client = *self.client_slot().get_or_insert(default);
        if client == ClientKind::Web {
            *self.device_slot() = None;
        }
    }
}

macro_rules! impl_client_payload {
    ($($ty:ty),+) => {
        $(impl ClientPayload for $ty {
            fn client_slot(&mut self) -> &mut Option<ClientKind> {
                &mut self.client
            }

            fn device_slot(&mut self) -> &mut Option<DevicePayload> {
                &mut self.device
            }
        })+
    };
}

impl_client_payload!(
    LoginBasicPayload,
    LoginSocialPayload,
    VerifyOtpPayload,
    SwitchProfilePayload
);
