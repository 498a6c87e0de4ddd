//! Endpoint and client configuration for the identity provider.
//!
//! Mirrors the deployed user pool the web clients were pointed at. Every
//! value can be overridden with an `OPENGLOT_*` environment variable, and
//! tests construct the struct directly to aim at a mock server.

/// Configuration for the auth gateway.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// User-pool app client id sent with every provider call.
    pub client_id: String,
    /// OAuth2 token endpoint (`POST`, form-encoded).
    pub token_url: String,
    /// Hosted-UI authorize endpoint used for browser navigation.
    pub authorize_url: String,
    /// User-pool operations endpoint (`x-amz-json-1.1`).
    pub idp_url: String,
    /// Backend REST API base URL, trailing slash included.
    pub api_url: String,
    /// Redirect URI registered for sign-in.
    pub redirect_sign_in: String,
    /// Redirect target after sign-out.
    pub redirect_sign_out: String,
}

impl AuthConfig {
    /// Default user-pool region.
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    /// Default hosted-UI domain.
    pub const DEFAULT_DOMAIN: &'static str = "openglot01.auth.us-east-1.amazoncognito.com";

    /// Default app client id.
    pub const DEFAULT_CLIENT_ID: &'static str = "30dhm1r5vef2pgqm5aljrk1qsg";

    /// Default sign-in redirect URI.
    pub const DEFAULT_REDIRECT_SIGN_IN: &'static str = "http://localhost:3000/oauth2/callback";

    /// Default sign-out redirect target.
    pub const DEFAULT_REDIRECT_SIGN_OUT: &'static str = "http://localhost:3000/";

    /// Default backend API base URL.
    pub const DEFAULT_API_URL: &'static str = "http://localhost:5270/";

    /// Builds a config from a region, hosted-UI domain, and client id,
    /// deriving the endpoint URLs.
    pub fn new(region: &str, domain: &str, client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            token_url: format!("https://{domain}/oauth2/token"),
            authorize_url: format!("https://{domain}/oauth2/authorize"),
            idp_url: format!("https://cognito-idp.{region}.amazonaws.com/"),
            api_url: Self::DEFAULT_API_URL.to_string(),
            redirect_sign_in: Self::DEFAULT_REDIRECT_SIGN_IN.to_string(),
            redirect_sign_out: Self::DEFAULT_REDIRECT_SIGN_OUT.to_string(),
        }
    }

    /// Builds a config from defaults, applying `OPENGLOT_*` environment
    /// overrides.
    pub fn from_env() -> Self {
        let region = env_or("OPENGLOT_REGION", Self::DEFAULT_REGION);
        let domain = env_or("OPENGLOT_OAUTH_DOMAIN", Self::DEFAULT_DOMAIN);
        let client_id = env_or("OPENGLOT_CLIENT_ID", Self::DEFAULT_CLIENT_ID);

        let mut config = Self::new(&region, &domain, &client_id);
        config.api_url = env_or("OPENGLOT_API_URL", Self::DEFAULT_API_URL);
        config.redirect_sign_in =
            env_or("OPENGLOT_REDIRECT_SIGN_IN", Self::DEFAULT_REDIRECT_SIGN_IN);
        config.redirect_sign_out =
            env_or("OPENGLOT_REDIRECT_SIGN_OUT", Self::DEFAULT_REDIRECT_SIGN_OUT);
        config
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_REGION,
            Self::DEFAULT_DOMAIN,
            Self::DEFAULT_CLIENT_ID,
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
