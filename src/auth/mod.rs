//! Authentication module
//!
//! This module provides:
//! - The loopback callback server for browser-based OAuth2 sign-in
//! - The Google OAuth2 provider client (consent URL, code exchange)
//! - The identity service client (password sign-in, federated exchange,
//!   token refresh)
//! - Account reconciliation between federated logins and stored profiles
//! - The AuthGateway facade tying the paths together

mod callback_server;
mod consent;
mod gateway;
mod identity;
mod oauth;
mod reconcile;
mod session;

#[cfg(test)]
mod stub;

pub use callback_server::{CallbackServer, CancelSignal, DEFAULT_CALLBACK_PORT};
pub use consent::{ConsentLauncher, SystemBrowser};
pub use gateway::AuthGateway;
pub use identity::{AuthenticatedUser, FederatedIdentity, FederatedSignIn, IdentityClient};
pub use oauth::GoogleOAuthClient;
pub use reconcile::reconcile;
pub use session::{SessionHandle, SessionState, SessionTokens};
