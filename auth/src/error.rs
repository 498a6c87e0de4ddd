//! Error types for the auth subsystem.

use thiserror::Error;

/// Tagged failure value for every auth operation.
///
/// Provider failures are classified once, at the gateway boundary, so callers
/// match on variants instead of comparing provider message strings. The enum
/// is clonable because the current session snapshot carries the last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Sign-up or password-reset form submitted with mismatched passwords.
    /// Local validation; never reaches the network layer.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// A confirmation step was attempted with no pending sign-up email.
    #[error("Email not found")]
    MissingPendingEmail,

    /// The OAuth redirect URL carried no `code` query parameter.
    #[error("authorization code missing from redirect URL")]
    MissingAuthorizationCode,

    /// Wrong username or password.
    #[error("incorrect username or password")]
    InvalidCredentials,

    /// The account exists but the email address was never confirmed.
    #[error("user is not confirmed")]
    NotConfirmed,

    /// The submitted confirmation code does not match.
    #[error("invalid confirmation code")]
    CodeMismatch,

    /// The confirmation code has expired and must be resent.
    #[error("confirmation code has expired")]
    CodeExpired,

    /// The provider throttled the request.
    #[error("too many attempts, try again later")]
    RateLimited,

    /// Any other provider-reported failure, message surfaced verbatim.
    #[error("provider error: {0}")]
    Provider(String),

    /// Transport failure reaching the provider or backend.
    #[error("network error: {0}")]
    Network(String),

    /// Token storage could not be written.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// True for failures produced by local validation, before any network
    /// call is attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::PasswordMismatch
                | AuthError::MissingPendingEmail
                | AuthError::MissingAuthorizationCode
        )
    }
}
