use serde::{Deserialize, Serialize};

/// Base path used when none (or a blank one) is configured
pub const DEFAULT_AUTH_BASE_PATH: &str = "/authentication";

/// Paths of the auth API, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    pub login_basic: String,
    pub login_social: String,
    pub login_social_precheck: String,
    pub login_social_link: String,
    pub login_social_unlink: String,
    pub otp_request: String,
    pub otp_verify: String,
    pub register: String,
    pub account_confirmation: String,
    pub account_confirmation_resend: String,
    pub me: String,
    pub profile_picture: String,
    pub refresh: String,
    pub switch_profile: String,
    /// Collection path; a single profile lives at `{profiles}{id}/`
    pub profiles: String,
    pub account_update: String,
    pub account_delete: String,
    pub password_reset_request: String,
    pub password_reset_confirm: String,
    pub password_change: String,
    pub admin_create_superuser: String,
    pub admin_create_staff: String,
}

impl AuthEndpoints {
    pub fn new(base_path: Option<&str>) -> Self {
        let root = normalize_base_path(base_path);
        let at = |path: &str| format!("{}{}", root, path);
        Self {
            login_basic: at("/login/basic/"),
            login_social: at("/login/social/"),
            login_social_precheck: at("/login/social/precheck/"),
            login_social_link: at("/login/social/link/"),
            login_social_unlink: at("/login/social/unlink/"),
            otp_request: at("/otp/request/"),
            otp_verify: at("/otp/verify/"),
            register: at("/register/"),
            account_confirmation: at("/registration/account-confirmation-email/"),
            account_confirmation_resend: at("/registration/account-confirmation-email/resend/"),
            me: at("/me/?client=web"),
            profile_picture: at("/profile/picture/"),
            refresh: at("/token/refresh/"),
            switch_profile: at("/profile/switch/"),
            profiles: at("/profiles/"),
            account_update: at("/account/update/"),
            account_delete: at("/account/delete/"),
            password_reset_request: at("/password-reset/request/"),
            password_reset_confirm: at("/password-reset/confirm/"),
            password_change: at("/password-reset/change/"),
            admin_create_superuser: at("/admin/create-superuser/"),
            admin_create_staff: at("/admin/create-staff/"),
        }
    }

    /// Path of a single profile
    pub fn profile(&self, profile_id: impl std::fmt::Display) -> String {
        format!("{}{}/", self.profiles, profile_id)
    }
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Force a leading slash and strip trailing ones; blank means the default.
pub fn normalize_base_path(base_path: Option<&str>) -> String {
    let trimmed = base_path.map(str::trim).unwrap_or(DEFAULT_AUTH_BASE_PATH);
    if trimmed.is_empty() {
        return DEFAULT_AUTH_BASE_PATH.to_string();
    }
    let with_leading = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    with_leading.trim_end_matches('/').to_string()
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(None), "/authentication");
        assert_eq!(normalize_base_path(Some("")), "/authentication");
        assert_eq!(normalize_base_path(Some("   ")), "/authentication");
        assert_eq!(normalize_base_path(Some("auth")), "/auth");
        assert_eq!(normalize_base_path(Some("/auth///")), "/auth");
        assert_eq!(normalize_base_path(Some(" /api/v2/auth/ ")), "/api/v2/auth");
    }

    #[test]
    fn test_root_base_path_collapses() {
        // "/" strips to an empty root, so paths hang off the API root
        let endpoints = AuthEndpoints::new(Some("/"));
        assert_eq!(endpoints.refresh, "/token/refresh/");
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = AuthEndpoints::default();
        assert_eq!(endpoints.refresh, "/authentication/token/refresh/");
        assert_eq!(endpoints.me, "/authentication/me/?client=web");
        assert_eq!(endpoints.login_basic, "/authentication/login/basic/");
        assert_eq!(
            endpoints.account_confirmation_resend,
            "/authentication/registration/account-confirmation-email/resend/"
        );
        assert_eq!(endpoints.admin_create_staff, "/authentication/admin/create-staff/");
    }

    #[test]
    fn test_profile_path() {
        let endpoints = AuthEndpoints::new(Some("auth"));
        assert_eq!(endpoints.profile(42), "/auth/profiles/42/");
        assert_eq!(endpoints.profile("abc"), "/auth/profiles/abc/");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://api.example.com/", "/me/"), "https://api.example.com/me/");
        assert_eq!(join_url("https://api.example.com", "me/"), "https://api.example.com/me/");
        assert_eq!(join_url("https://api.example.com//", "/me/"), "https://api.example.com/me/");
    }
}
