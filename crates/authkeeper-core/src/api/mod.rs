//! REST API client module for the auth service.
//!
//! This module provides the `AuthClient` covering every auth endpoint, and
//! the `AuthenticatedPipeline` that attaches bearer tokens and recovers from
//! expired sessions.
//!
//! The API uses JWT bearer token authentication; refresh tokens are
//! exchanged at `{base}/token/refresh/`.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod pipeline;
pub mod transport;
pub mod types;

pub use client::{AuthClient, AuthClientBuilder};
pub use endpoints::AuthEndpoints;
pub use error::{api_error_message, ApiError};
pub use pipeline::{ApiRequest, ApiResponse, AuthenticatedPipeline, Transport, UnauthorizedCallback};
pub use reqwest::StatusCode;
pub use transport::ReqwestTransport;
pub use types::{
    AccountConfirmationPayload, AccountConfirmationResendPayload, AccountUpdatePayload,
    ApiDetailResponse, AuthResponse, CreateAdminUserPayload, DeleteAccountPayload, DevicePayload,
    EmailPayload, Gender, LinkSocialPayload, LoginBasicPayload, LoginSocialPayload, OtpChannel,
    PasswordChangePayload, PasswordResetConfirmPayload, PasswordResetRequestPayload,
    ProfilePicturePayload, RegisterPayload, RequestOtpPayload, SocialProvider,
    SwitchProfilePayload, UnlinkSocialPayload, UpdateMethod, VerifyOtpPayload,
};
