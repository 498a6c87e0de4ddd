//! Session orchestration over the token store, codec, and gateway.
//!
//! One [`SessionController`] is constructed at startup and owns all mutable
//! auth state. Consumers receive it by injection and observe the current
//! [`Session`] through a `watch` channel instead of ambient globals.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};

use crate::codec::{self, UserProfile};
use crate::error::AuthError;
use crate::gateway::{AuthGateway, PostLoginStatus};
use crate::token_store::{TokenStore, TokenTriple};

/// Snapshot of the current auth state, re-derived from stored tokens.
/// Never persisted itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Profile decoded from the identity token, when signed in.
    pub user: Option<UserProfile>,
    /// True exactly when `user` is present.
    pub authenticated: bool,
    /// Last failure, shown inline by the UI layer.
    pub error: Option<AuthError>,
    /// True while a network operation is in flight.
    pub loading: bool,
}

/// Result of a completed sign-in or OAuth callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    /// Signed in; route home.
    SignedIn,
    /// Signed in, but the backend has no profile for this user yet; route
    /// to profile completion.
    ProfileIncomplete,
    /// A sign-out superseded this operation while its response was in
    /// flight; the response was dropped and no state changed.
    Superseded,
}

/// The only stateful orchestrator in the subsystem.
pub struct SessionController {
    gateway: AuthGateway,
    store: TokenStore,
    state: watch::Sender<Session>,
    /// Serializes bootstrap/refresh so concurrent callers share one refresh
    /// network call instead of racing.
    bootstrap_lock: Mutex<()>,
    /// Bumped by sign-out; snapshots taken before network calls let stale
    /// responses be detected and dropped.
    generation: AtomicU64,
}

impl SessionController {
    pub fn new(gateway: AuthGateway, store: TokenStore) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            gateway,
            store,
            state,
            bootstrap_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    /// Establishes the session from stored tokens at app start.
    ///
    /// Missing or partial triple: signed out, no network. Valid unexpired
    /// tokens: signed in, no network. Expired tokens: one refresh attempt;
    /// on failure the store is cleared so a dead refresh token is not
    /// retried on every start.
    ///
    /// Concurrent bootstraps serialize on an internal lock; the second
    /// caller re-reads the freshly stored tokens and issues no request.
    pub async fn bootstrap(&self) {
        let _guard = self.bootstrap_lock.lock().await;

        let Some(triple) = self.store.get() else {
            self.set_signed_out();
            return;
        };

        if !codec::is_expired(&triple.id_token) && !codec::is_expired(&triple.access_token) {
            self.set_signed_in(codec::extract_profile(&triple.id_token));
            return;
        }

        let generation = self.generation_snapshot();
        self.set_loading();
        match self.gateway.refresh_tokens(&triple.refresh_token).await {
            Some(refreshed) if self.is_current(generation) => {
                if let Err(e) =
                    self.store
                        .store(&refreshed.id_token, &refreshed.access_token, &triple.refresh_token)
                {
                    tracing::warn!("failed to persist refreshed tokens: {e}");
                }
                self.set_signed_in(codec::extract_profile(&refreshed.id_token));
            }
            Some(_) => {
                tracing::debug!("dropping refresh result superseded by sign-out");
            }
            None => {
                tracing::debug!("token refresh failed, signing out");
                if let Err(e) = self.store.clear() {
                    tracing::warn!("failed to clear stale tokens: {e}");
                }
                self.set_signed_out();
            }
        }
    }

    /// Registers a new account. The password confirmation is checked
    /// locally first; a mismatch never reaches the network.
    ///
    /// On success the email is recorded for the confirmation step.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
        name: &str,
    ) -> Result<(), AuthError> {
        if password != confirm_password {
            return Err(self.fail(AuthError::PasswordMismatch));
        }

        self.set_loading();
        match self.gateway.sign_up(email, password, name).await {
            Ok(()) => {
                self.store.set_pending_email(email)?;
                self.clear_loading();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Confirms a pending sign-up with the emailed code. Requires the
    /// pending email recorded by [`Self::sign_up`]; its absence is a local
    /// error with no network call. Success leaves the session signed out,
    /// ready for sign-in.
    pub async fn confirm_sign_up(&self, code: &str) -> Result<(), AuthError> {
        let Some(email) = self.store.pending_email() else {
            return Err(self.fail(AuthError::MissingPendingEmail));
        };

        self.set_loading();
        match self.gateway.confirm_sign_up(&email, code).await {
            Ok(()) => {
                self.store.clear_pending_email()?;
                self.clear_loading();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Requests a fresh confirmation code for the pending sign-up. With no
    /// pending email this is a no-op surfacing a user-facing notice; the
    /// session is left untouched and nothing is sent.
    pub async fn resend_confirmation_code(&self) -> Result<(), AuthError> {
        let Some(email) = self.store.pending_email() else {
            return Err(AuthError::MissingPendingEmail);
        };
        self.gateway.resend_confirmation_code(&email).await
    }

    /// Credential sign-in: authenticate, persist the triple, derive the
    /// profile, then run the backend first-login hook.
    ///
    /// Gateway failures land in the session error as a tagged variant, so
    /// the UI can offer code-resend on [`AuthError::NotConfirmed`] without
    /// string matching. Hook transport failures are logged, not fatal.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, AuthError> {
        let generation = self.generation_snapshot();
        self.set_loading();

        match self.gateway.sign_in(email, password).await {
            Ok(triple) => self.complete_sign_in(triple, generation).await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Completes the hosted-UI flow from the provider's redirect URL.
    ///
    /// A redirect without a `code` query parameter leaves the session
    /// unchanged and makes no gateway call.
    pub async fn handle_oauth_callback(&self, redirect_url: &str) -> Result<SignInOutcome, AuthError> {
        let Some(code) = extract_authorization_code(redirect_url) else {
            return Err(AuthError::MissingAuthorizationCode);
        };

        let generation = self.generation_snapshot();
        self.set_loading();

        match self.gateway.exchange_code_for_tokens(&code).await {
            Ok(triple) => self.complete_sign_in(triple, generation).await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Starts password recovery for the given email.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        self.gateway.forgot_password(email).await
    }

    /// Completes password recovery. The confirmation is checked locally
    /// before anything is sent.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        self.gateway
            .confirm_forgot_password(email, code, new_password)
            .await
    }

    /// Signs out unconditionally: tokens cleared, session reset, no network
    /// call. In-flight operations from before the sign-out are dropped when
    /// they complete.
    pub fn sign_out(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            tracing::warn!("failed to clear tokens on sign-out: {e}");
        }
        self.state.send_replace(Session::default());
    }

    async fn complete_sign_in(
        &self,
        triple: TokenTriple,
        generation: u64,
    ) -> Result<SignInOutcome, AuthError> {
        if !self.is_current(generation) {
            tracing::debug!("dropping sign-in result superseded by sign-out");
            return Ok(SignInOutcome::Superseded);
        }

        self.store
            .store(&triple.id_token, &triple.access_token, &triple.refresh_token)?;
        self.set_signed_in(codec::extract_profile(&triple.id_token));

        match self.gateway.post_login(&triple.id_token).await {
            Ok(PostLoginStatus::ProfileMissing) => Ok(SignInOutcome::ProfileIncomplete),
            Ok(PostLoginStatus::Ok) => Ok(SignInOutcome::SignedIn),
            Err(e) => {
                // The user is authenticated either way; the hook is advisory.
                tracing::warn!("post-login hook failed: {e}");
                Ok(SignInOutcome::SignedIn)
            }
        }
    }

    fn set_signed_in(&self, profile: UserProfile) {
        self.state.send_replace(Session {
            user: Some(profile),
            authenticated: true,
            error: None,
            loading: false,
        });
    }

    fn set_signed_out(&self) {
        self.state.send_modify(|s| {
            s.user = None;
            s.authenticated = false;
            s.loading = false;
        });
    }

    fn set_loading(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn clear_loading(&self) {
        self.state.send_modify(|s| s.loading = false);
    }

    /// Records the error in the session and hands it back to the caller.
    fn fail(&self, error: AuthError) -> AuthError {
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(error.clone());
        });
        error
    }

    fn generation_snapshot(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Pulls the `code` query parameter out of an OAuth redirect URL.
fn extract_authorization_code(redirect_url: &str) -> Option<String> {
    let url = url::Url::parse(redirect_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
}
