//! Calls against the identity provider and the backend first-login hook.
//!
//! Two provider surfaces are involved:
//!
//! - the OAuth2 token endpoint (`POST {token_url}`, form-encoded) for
//!   authorization-code exchange and refresh;
//! - the user-pool operations endpoint (`POST {idp_url}`,
//!   `application/x-amz-json-1.1` with an `X-Amz-Target` header) for
//!   sign-up, confirmation, credential sign-in, and password recovery.
//!
//! Every operation is a single attempt: no retries, no backoff. Provider
//! failures are classified into [`AuthError`] variants here, once, so
//! nothing downstream matches on message strings.

use serde::Deserialize;
use serde_json::json;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token_store::TokenTriple;

/// Service prefix for user-pool operation targets.
const IDP_SERVICE: &str = "AWSCognitoIdentityProviderService";

/// Third-party identity providers the hosted UI can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityProvider {
    Google,
    Facebook,
}

impl IdentityProvider {
    /// Value of the `identity_provider` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Facebook => "Facebook",
        }
    }
}

/// New id/access pair from a refresh call. The refresh token itself is not
/// rotated by the provider and stays as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub id_token: String,
    pub access_token: String,
}

/// Outcome of the backend first-login hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostLoginStatus {
    /// Backend knows this user.
    Ok,
    /// Backend returned 404: the profile has not been created yet, the
    /// caller should route to profile completion.
    ProfileMissing,
}

/// Wire shape of the token endpoint's success body.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    id_token: String,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Wire shape of a user-pool error body.
#[derive(Debug, Deserialize)]
struct IdpErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// Stateless client for all provider and backend calls.
pub struct AuthGateway {
    client: reqwest::Client,
    config: AuthConfig,
}

impl AuthGateway {
    /// Creates a gateway over a shared HTTP client.
    pub fn new(client: reqwest::Client, config: AuthConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Exchanges a hosted-UI authorization code for a full token triple.
    ///
    /// Fails with a tagged error on any non-success response; never yields
    /// a partial triple.
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<TokenTriple, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", &self.config.client_id),
            ("code", code),
            ("redirect_uri", &self.config.redirect_sign_in),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(net_err)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider(body));
        }

        let tokens: TokenEndpointResponse = response.json().await.map_err(net_err)?;
        let refresh_token = tokens
            .refresh_token
            .ok_or_else(|| AuthError::Provider("token response missing refresh_token".to_string()))?;

        Ok(TokenTriple {
            id_token: tokens.id_token,
            access_token: tokens.access_token,
            refresh_token,
        })
    }

    /// Exchanges a refresh token for a new id/access pair.
    ///
    /// Fail-soft: every failure mode (transport, non-2xx, bad body) logs and
    /// returns `None`. The session controller treats `None` as "session
    /// lost" and signs out silently.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Option<RefreshedTokens> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", &self.config.client_id),
            ("refresh_token", refresh_token),
        ];

        let response = match self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("token refresh failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("token refresh rejected: {}", response.status());
            return None;
        }

        match response.json::<TokenEndpointResponse>().await {
            Ok(tokens) => Some(RefreshedTokens {
                id_token: tokens.id_token,
                access_token: tokens.access_token,
            }),
            Err(e) => {
                tracing::warn!("token refresh returned malformed body: {e}");
                None
            }
        }
    }

    /// Resource-owner-credential sign-in (`InitiateAuth`,
    /// `USER_PASSWORD_AUTH`).
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenTriple, AuthError> {
        let body = json!({
            "AuthFlow": "USER_PASSWORD_AUTH",
            "ClientId": self.config.client_id,
            "AuthParameters": {
                "USERNAME": email,
                "PASSWORD": password,
            },
        });

        let result = self.idp_call("InitiateAuth", &body).await?;
        let auth = result
            .get("AuthenticationResult")
            .cloned()
            .ok_or_else(|| AuthError::Provider("sign-in response missing tokens".to_string()))?;

        let token = |key: &str| -> Result<String, AuthError> {
            auth.get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AuthError::Provider(format!("sign-in response missing {key}")))
        };

        Ok(TokenTriple {
            id_token: token("IdToken")?,
            access_token: token("AccessToken")?,
            refresh_token: token("RefreshToken")?,
        })
    }

    /// Registers a new user with email and display-name attributes.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), AuthError> {
        let body = json!({
            "ClientId": self.config.client_id,
            "Username": email,
            "Password": password,
            "UserAttributes": [
                { "Name": "email", "Value": email },
                { "Name": "name", "Value": name },
            ],
        });
        self.idp_call("SignUp", &body).await.map(drop)
    }

    /// Confirms a sign-up with the emailed verification code.
    pub async fn confirm_sign_up(&self, username: &str, code: &str) -> Result<(), AuthError> {
        let body = json!({
            "ClientId": self.config.client_id,
            "Username": username,
            "ConfirmationCode": code,
        });
        self.idp_call("ConfirmSignUp", &body).await.map(drop)
    }

    /// Requests a fresh confirmation code for an unconfirmed account.
    pub async fn resend_confirmation_code(&self, username: &str) -> Result<(), AuthError> {
        let body = json!({
            "ClientId": self.config.client_id,
            "Username": username,
        });
        self.idp_call("ResendConfirmationCode", &body).await.map(drop)
    }

    /// Starts password recovery: the provider emails a reset code.
    pub async fn forgot_password(&self, username: &str) -> Result<(), AuthError> {
        let body = json!({
            "ClientId": self.config.client_id,
            "Username": username,
        });
        self.idp_call("ForgotPassword", &body).await.map(drop)
    }

    /// Completes password recovery with the emailed code.
    pub async fn confirm_forgot_password(
        &self,
        username: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let body = json!({
            "ClientId": self.config.client_id,
            "Username": username,
            "ConfirmationCode": code,
            "Password": new_password,
        });
        self.idp_call("ConfirmForgotPassword", &body).await.map(drop)
    }

    /// Notifies the backend of a completed sign-in.
    ///
    /// A 404 is a defined signal, not a failure: the user authenticated with
    /// the provider but has no backend profile yet (first social sign-in).
    pub async fn post_login(&self, id_token: &str) -> Result<PostLoginStatus, AuthError> {
        let url = format!("{}users/login", self.config.api_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(id_token)
            .send()
            .await
            .map_err(net_err)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PostLoginStatus::ProfileMissing);
        }
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "post-login failed: {}",
                response.status()
            )));
        }
        Ok(PostLoginStatus::Ok)
    }

    /// Builds the hosted-UI authorize URL with a third-party provider hint.
    /// Pure string construction; the caller navigates the browser there.
    pub fn provider_redirect_url(&self, provider: IdentityProvider) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&identity_provider={}",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_sign_in),
            provider.as_str(),
        )
    }

    /// Issues one user-pool operation and maps any error body onto the
    /// tagged error taxonomy.
    async fn idp_call(
        &self,
        target: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AuthError> {
        let response = self
            .client
            .post(&self.config.idp_url)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", format!("{IDP_SERVICE}.{target}"))
            .json(body)
            .send()
            .await
            .map_err(net_err)?;

        if response.status().is_success() {
            return response.json().await.map_err(net_err);
        }

        let error: IdpErrorBody = response.json().await.unwrap_or(IdpErrorBody {
            error_type: String::new(),
            message: String::new(),
        });
        Err(map_idp_error(&error.error_type, &error.message))
    }
}

/// Classifies a user-pool error body. The `__type` may carry a service
/// prefix (`service#ExceptionName`); only the final segment matters.
fn map_idp_error(error_type: &str, message: &str) -> AuthError {
    let name = error_type.rsplit('#').next().unwrap_or(error_type);
    match name {
        "NotAuthorizedException" => AuthError::InvalidCredentials,
        "UserNotConfirmedException" => AuthError::NotConfirmed,
        "CodeMismatchException" => AuthError::CodeMismatch,
        "ExpiredCodeException" => AuthError::CodeExpired,
        "TooManyRequestsException" | "LimitExceededException" => AuthError::RateLimited,
        _ => AuthError::Provider(if message.is_empty() {
            error_type.to_string()
        } else {
            message.to_string()
        }),
    }
}

fn net_err(e: reqwest::Error) -> AuthError {
    AuthError::Network(e.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_uri: &str) -> AuthConfig {
        AuthConfig {
            client_id: "client-1".to_string(),
            token_url: format!("{server_uri}/oauth2/token"),
            authorize_url: format!("{server_uri}/oauth2/authorize"),
            idp_url: format!("{server_uri}/"),
            api_url: format!("{server_uri}/api/"),
            redirect_sign_in: "http://localhost:3000/oauth2/callback".to_string(),
            redirect_sign_out: "http://localhost:3000/".to_string(),
        }
    }

    fn gateway(server: &MockServer) -> AuthGateway {
        AuthGateway::new(reqwest::Client::new(), test_config(&server.uri()))
    }

    #[test]
    fn redirect_url_carries_provider_hint() {
        let config = test_config("https://pool.example.com");
        let gateway = AuthGateway::new(reqwest::Client::new(), config);

        let url = gateway.provider_redirect_url(IdentityProvider::Google);
        assert!(url.starts_with("https://pool.example.com/oauth2/authorize?response_type=code"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foauth2%2Fcallback"));
        assert!(url.ends_with("identity_provider=Google"));

        let url = gateway.provider_redirect_url(IdentityProvider::Facebook);
        assert!(url.ends_with("identity_provider=Facebook"));
    }

    #[test]
    fn idp_error_mapping() {
        assert_eq!(
            map_idp_error("NotAuthorizedException", "Incorrect username or password."),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            map_idp_error("UserNotConfirmedException", "User is not confirmed."),
            AuthError::NotConfirmed
        );
        assert_eq!(
            map_idp_error("service#CodeMismatchException", "bad code"),
            AuthError::CodeMismatch
        );
        assert_eq!(map_idp_error("ExpiredCodeException", ""), AuthError::CodeExpired);
        assert_eq!(map_idp_error("TooManyRequestsException", ""), AuthError::RateLimited);
        assert_eq!(map_idp_error("LimitExceededException", ""), AuthError::RateLimited);
        assert_eq!(
            map_idp_error("UsernameExistsException", "User already exists"),
            AuthError::Provider("User already exists".to_string())
        );
        assert_eq!(
            map_idp_error("SomethingOddException", ""),
            AuthError::Provider("SomethingOddException".to_string())
        );
    }

    #[tokio::test]
    async fn exchange_code_posts_form_and_parses_triple() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code-1"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_token": "id-1",
                "access_token": "access-1",
                "refresh_token": "refresh-1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let triple = gateway(&server)
            .exchange_code_for_tokens("auth-code-1")
            .await
            .unwrap();
        assert_eq!(triple.id_token, "id-1");
        assert_eq!(triple.access_token, "access-1");
        assert_eq!(triple.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn exchange_code_failure_is_tagged_not_partial() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .exchange_code_for_tokens("stale-code")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Provider("invalid_grant".to_string()));
    }

    #[tokio::test]
    async fn refresh_returns_new_pair() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_token": "id-2",
                "access_token": "access-2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refreshed = gateway(&server).refresh_tokens("refresh-1").await.unwrap();
        assert_eq!(refreshed.id_token, "id-2");
        assert_eq!(refreshed.access_token, "access-2");
    }

    #[tokio::test]
    async fn refresh_fails_soft() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        assert!(gateway(&server).refresh_tokens("dead").await.is_none());
    }

    #[tokio::test]
    async fn refresh_fails_soft_on_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        assert!(gateway(&server).refresh_tokens("refresh-1").await.is_none());
    }

    #[tokio::test]
    async fn sign_in_parses_authentication_result() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-amz-target", "AWSCognitoIdentityProviderService.InitiateAuth"))
            .and(body_string_contains("USER_PASSWORD_AUTH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "AuthenticationResult": {
                    "IdToken": "id-1",
                    "AccessToken": "access-1",
                    "RefreshToken": "refresh-1",
                },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let triple = gateway(&server).sign_in("a@b.com", "hunter2").await.unwrap();
        assert_eq!(triple.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn sign_in_unconfirmed_user_maps_to_tagged_variant() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "__type": "UserNotConfirmedException",
                "message": "User is not confirmed.",
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).sign_in("a@b.com", "hunter2").await.unwrap_err();
        assert_eq!(err, AuthError::NotConfirmed);
    }

    #[tokio::test]
    async fn sign_up_targets_the_right_operation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-amz-target", "AWSCognitoIdentityProviderService.SignUp"))
            .and(body_string_contains("\"Username\":\"a@b.com\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "UserConfirmed": false,
            })))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server).sign_up("a@b.com", "hunter2", "A B").await.unwrap();
    }

    #[tokio::test]
    async fn confirm_forgot_password_sends_code_and_password() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header(
                "x-amz-target",
                "AWSCognitoIdentityProviderService.ConfirmForgotPassword",
            ))
            .and(body_string_contains("\"ConfirmationCode\":\"123456\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server)
            .confirm_forgot_password("a@b.com", "123456", "n3w-pass")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_login_distinguishes_missing_profile() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/users/login"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let status = gateway(&server).post_login("id-1").await.unwrap();
        assert_eq!(status, PostLoginStatus::ProfileMissing);
    }

    #[tokio::test]
    async fn post_login_ok_on_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/users/login"))
            .and(header("authorization", "Bearer id-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let status = gateway(&server).post_login("id-1").await.unwrap();
        assert_eq!(status, PostLoginStatus::Ok);
    }
}
