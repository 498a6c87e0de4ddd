//! Client-side session and auth subsystem for the OpenGlot language-learning
//! app: token persistence, display-only identity-token decoding, the
//! identity-provider gateway, and the session state machine.
//!
//! The decoded identity-token claims are **not** a security boundary; the
//! backend validates every bearer token it receives. See [`codec`].

pub mod codec;
pub mod config;
mod error;
pub mod gateway;
pub mod session;
pub mod token_store;

pub use codec::UserProfile;
pub use config::AuthConfig;
pub use error::AuthError;
pub use gateway::{AuthGateway, IdentityProvider, PostLoginStatus, RefreshedTokens};
pub use session::{Session, SessionController, SignInOutcome};
pub use token_store::{TokenStore, TokenTriple};
