//! Auth gateway facade
//!
//! Single entry point for every way into a TableHop account: email/password
//! login and registration, the browser-driven Google flow, logout, and the
//! current-user query. Owns the session slot and makes sure only one Google
//! flow can hold the callback port at a time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use crate::Result;
use crate::config::Config;
use crate::error::Error;
use crate::profile::{ProfileStore, UserProfile};
use super::callback_server::{CallbackServer, CancelSignal};
use super::consent::{ConsentLauncher, SystemBrowser};
use super::identity::IdentityClient;
use super::oauth::GoogleOAuthClient;
use super::reconcile::{persist_new_profile, reconcile};
use super::session::{SessionHandle, SessionState};

/// Facade over the authentication paths of the app
pub struct AuthGateway {
    oauth: GoogleOAuthClient,
    identity: IdentityClient,
    store: Arc<dyn ProfileStore>,
    session: SessionHandle,
    launcher: Box<dyn ConsentLauncher>,
    callback_port: u16,
    consent_timeout: Duration,
    active_flow: Mutex<Option<CancelSignal>>,
}

/// Clears the active-flow slot when a Google login finishes, however it
/// finishes
struct FlowGuard<'a> {
    slot: &'a Mutex<Option<CancelSignal>>,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        *lock_flow(self.slot) = None;
    }
}

fn lock_flow(slot: &Mutex<Option<CancelSignal>>) -> MutexGuard<'_, Option<CancelSignal>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl AuthGateway {
    pub fn new(config: &Config, store: Arc<dyn ProfileStore>, session: SessionHandle) -> Self {
        Self {
            oauth: GoogleOAuthClient::new(
                config.oauth.client_id.clone(),
                config.oauth.client_secret.clone(),
            ),
            identity: IdentityClient::new(config.api_key.clone()),
            store,
            session,
            launcher: Box::new(SystemBrowser),
            callback_port: config.callback_port,
            consent_timeout: Duration::from_secs(config.consent_timeout_secs),
            active_flow: Mutex::new(None),
        }
    }

    /// Replace the consent launcher (headless embeddings, tests)
    pub fn with_launcher(mut self, launcher: Box<dyn ConsentLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the network clients (emulators, tests)
    pub fn with_clients(mut self, oauth: GoogleOAuthClient, identity: IdentityClient) -> Self {
        self.oauth = oauth;
        self.identity = identity;
        self
    }

    /// Sign in an existing account with email and password
    pub async fn login_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String> {
        let user = self.identity.sign_in_with_password(email, password).await?;
        let uid = user.uid.clone();
        self.session
            .establish(SessionState::new(user.uid, user.tokens));
        tracing::info!(uid = %uid, "email login complete");
        Ok(uid)
    }

    /// Create an account with email and password and its profile
    pub async fn register_with_email_and_password(
        &self,
        email: &str,
        password: &str,
        nickname: &str,
    ) -> Result<UserProfile> {
        let user = self.identity.sign_up(email, password).await?;
        self.session
            .establish(SessionState::new(user.uid.clone(), user.tokens));

        let profile = UserProfile::new(&user.uid, &user.email, nickname);
        let profile = persist_new_profile(self.store.as_ref(), &self.session, profile).await?;
        tracing::info!(uid = %profile.uid, "registration complete");
        Ok(profile)
    }

    /// Sign in with Google through the system browser
    ///
    /// Binds the local callback listener, opens the consent page, waits for
    /// the redirect, runs the two token-exchange hops, and reconciles the
    /// resulting identity against the profile store. Only one flow may be in
    /// flight; a second call fails with [`Error::LoginInProgress`] while the
    /// first still holds the callback port.
    pub async fn login_with_google(&self) -> Result<UserProfile> {
        let (cancel, _guard) = self.begin_google_flow()?;
        self.run_google_flow(&cancel).await
    }

    /// Cancel an in-flight Google login, if any
    ///
    /// The waiting `login_with_google` call resolves with
    /// [`Error::Cancelled`] and releases the callback port.
    pub fn cancel_google_login(&self) {
        if let Some(cancel) = lock_flow(&self.active_flow).as_ref() {
            tracing::info!("cancelling google login");
            cancel.cancel();
        }
    }

    /// Sign out locally
    ///
    /// The identity service issues no logout call for REST sessions; callers
    /// holding per-user state must clear it themselves.
    pub fn logout(&self) {
        self.session.clear();
        tracing::info!("logged out");
    }

    /// Uid of the currently signed-in user, if any
    pub fn current_user_uid(&self) -> Option<String> {
        self.session.current_uid()
    }

    fn begin_google_flow(&self) -> Result<(CancelSignal, FlowGuard<'_>)> {
        let mut slot = lock_flow(&self.active_flow);
        if slot.is_some() {
            return Err(Error::LoginInProgress);
        }

        let cancel = CancelSignal::new();
        *slot = Some(cancel.clone());
        drop(slot);

        Ok((
            cancel,
            FlowGuard {
                slot: &self.active_flow,
            },
        ))
    }

    async fn run_google_flow(&self, cancel: &CancelSignal) -> Result<UserProfile> {
        let mut server = CallbackServer::bind(self.callback_port).await?;
        let redirect_uri = server.redirect_uri();

        let auth_url = match self.oauth.authorization_url(&redirect_uri) {
            Ok(url) => url,
            Err(e) => {
                server.stop();
                return Err(e);
            }
        };

        if let Err(e) = self.launcher.launch(&auth_url) {
            server.stop();
            return Err(e);
        }

        tracing::info!("waiting for consent redirect on {}", redirect_uri);
        let code = match server.wait_for_code(self.consent_timeout, cancel).await {
            Ok(code) => code,
            Err(e) => {
                server.stop();
                return Err(e);
            }
        };

        let exchange = async {
            let access_token = self.oauth.exchange_code(&code, &redirect_uri).await?;
            self.identity.sign_in_with_idp(&access_token).await
        }
        .await;
        server.stop();
        let signed_in = exchange?;

        self.session.establish(SessionState::new(
            signed_in.identity.uid.clone(),
            signed_in.tokens.clone(),
        ));

        let profile = reconcile(self.store.as_ref(), &self.session, &signed_in.identity).await?;
        tracing::info!(uid = %profile.uid, "google login complete");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::stub::spawn_http_stub;
    use crate::config::OAuthConfig;
    use crate::profile::MemoryProfileStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use url::Url;

    const IDP_RESPONSE: &str = r#"{"localId":"g-001","email":"a@gmail.com","displayName":"Alice","idToken":"id","refreshToken":"rt","expiresIn":"3600"}"#;

    fn test_config() -> Config {
        Config {
            api_key: "api-key".to_string(),
            oauth: OAuthConfig {
                client_id: "cid".to_string(),
                client_secret: "cs".to_string(),
            },
            // port 0 lets each test grab its own ephemeral port
            callback_port: 0,
            consent_timeout_secs: 5,
            data_dir: "unused".into(),
        }
    }

    fn clients(token_addr: String, identity_addr: String) -> (GoogleOAuthClient, IdentityClient) {
        (
            GoogleOAuthClient::new("cid".to_string(), "cs".to_string())
                .with_endpoints("https://accounts.google.com/o/oauth2/v2/auth".to_string(), token_addr),
            IdentityClient::new("api-key".to_string())
                .with_endpoints(identity_addr.clone(), identity_addr),
        )
    }

    /// Launcher that plays the browser: follows the redirect URI straight
    /// back to the callback listener with a canned code
    struct CallbackDriver;

    impl ConsentLauncher for CallbackDriver {
        fn launch(&self, url: &str) -> Result<()> {
            let parsed = Url::parse(url).expect("auth url");
            let redirect = parsed
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.to_string())
                .expect("redirect_uri param");

            tokio::spawn(async move {
                let target = Url::parse(&redirect).expect("redirect uri");
                let port = target.port().expect("redirect port");
                let mut socket = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
                socket
                    .write_all(b"GET /callback?code=abc123 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                    .await
                    .expect("write");
                let mut response = Vec::new();
                let _ = socket.read_to_end(&mut response).await;
            });

            Ok(())
        }
    }

    /// Launcher for flows that are never completed by a redirect
    struct NoopLauncher;

    impl ConsentLauncher for NoopLauncher {
        fn launch(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Launcher with no browser available at all
    struct BrokenLauncher;

    impl ConsentLauncher for BrokenLauncher {
        fn launch(&self, _url: &str) -> Result<()> {
            Err(Error::ConsentUi("no display".to_string()))
        }
    }

    #[tokio::test]
    async fn test_google_login_first_time() {
        let token_addr = spawn_http_stub("200 OK", r#"{"access_token":"ya29.tok"}"#).await;
        let identity_addr = spawn_http_stub("200 OK", IDP_RESPONSE).await;

        let store = Arc::new(MemoryProfileStore::new());
        let session = SessionHandle::new();
        let (oauth, identity) = clients(token_addr, identity_addr);
        let gateway = AuthGateway::new(&test_config(), store.clone(), session.clone())
            .with_clients(oauth, identity)
            .with_launcher(Box::new(CallbackDriver));

        let profile = gateway.login_with_google().await.unwrap();

        assert_eq!(profile.uid, "g-001");
        assert_eq!(profile.email, "a@gmail.com");
        assert_eq!(profile.nickname, "Alice");
        assert_eq!(gateway.current_user_uid(), Some("g-001".to_string()));
        assert!(store.exists("g-001").await.unwrap());
    }

    #[tokio::test]
    async fn test_google_login_returning_user_keeps_stored_profile() {
        let token_addr = spawn_http_stub("200 OK", r#"{"access_token":"ya29.tok"}"#).await;
        let identity_addr = spawn_http_stub("200 OK", IDP_RESPONSE).await;

        let store = Arc::new(MemoryProfileStore::new());
        store
            .save(&UserProfile::new("g-001", "a@gmail.com", "Alice Original"))
            .await
            .unwrap();

        let (oauth, identity) = clients(token_addr, identity_addr);
        let gateway = AuthGateway::new(&test_config(), store.clone(), SessionHandle::new())
            .with_clients(oauth, identity)
            .with_launcher(Box::new(CallbackDriver));

        let profile = gateway.login_with_google().await.unwrap();
        assert_eq!(profile.nickname, "Alice Original");
    }

    #[tokio::test]
    async fn test_google_login_code_exchange_failure_identifies_hop() {
        let token_addr = spawn_http_stub("400 Bad Request", r#"{"error":"invalid_grant"}"#).await;
        // identity endpoint is unreachable; it must never be contacted
        let (oauth, identity) = clients(token_addr, "http://127.0.0.1:9".to_string());

        let gateway = AuthGateway::new(
            &test_config(),
            Arc::new(MemoryProfileStore::new()),
            SessionHandle::new(),
        )
        .with_clients(oauth, identity)
        .with_launcher(Box::new(CallbackDriver));

        let err = gateway.login_with_google().await.unwrap_err();
        assert!(matches!(err, Error::CodeExchange(_)));
        assert!(err.to_string().contains("invalid_grant"));
        assert_eq!(gateway.current_user_uid(), None);
    }

    #[tokio::test]
    async fn test_google_login_browser_failure_releases_port() {
        let gateway = AuthGateway::new(
            &test_config(),
            Arc::new(MemoryProfileStore::new()),
            SessionHandle::new(),
        )
        .with_launcher(Box::new(BrokenLauncher));

        let err = gateway.login_with_google().await.unwrap_err();
        assert!(matches!(err, Error::ConsentUi(_)));

        // the guard must have released the flow slot again
        let err = gateway.login_with_google().await.unwrap_err();
        assert!(matches!(err, Error::ConsentUi(_)));
    }

    #[tokio::test]
    async fn test_google_login_can_be_cancelled() {
        let gateway = Arc::new(
            AuthGateway::new(
                &test_config(),
                Arc::new(MemoryProfileStore::new()),
                SessionHandle::new(),
            )
            .with_launcher(Box::new(NoopLauncher)),
        );

        let flow = gateway.clone();
        let handle = tokio::spawn(async move { flow.login_with_google().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        gateway.cancel_google_login();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_second_concurrent_google_login_is_rejected() {
        let gateway = Arc::new(
            AuthGateway::new(
                &test_config(),
                Arc::new(MemoryProfileStore::new()),
                SessionHandle::new(),
            )
            .with_launcher(Box::new(NoopLauncher)),
        );

        let flow = gateway.clone();
        let first = tokio::spawn(async move { flow.login_with_google().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = gateway.login_with_google().await.unwrap_err();
        assert!(matches!(err, Error::LoginInProgress));

        gateway.cancel_google_login();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_email_login_sets_session() {
        let addr = spawn_http_stub(
            "200 OK",
            r#"{"localId":"u-9","email":"b@example.com","idToken":"id","refreshToken":"rt","expiresIn":"3600"}"#,
        )
        .await;

        let gateway = AuthGateway::new(
            &test_config(),
            Arc::new(MemoryProfileStore::new()),
            SessionHandle::new(),
        )
        .with_clients(
            GoogleOAuthClient::new("cid".to_string(), "cs".to_string()),
            IdentityClient::new("api-key".to_string()).with_endpoints(addr.clone(), addr),
        );

        let uid = gateway
            .login_with_email_and_password("b@example.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(uid, "u-9");
        assert_eq!(gateway.current_user_uid(), Some("u-9".to_string()));
    }

    #[tokio::test]
    async fn test_register_creates_profile() {
        let addr = spawn_http_stub(
            "200 OK",
            r#"{"localId":"u-10","email":"c@example.com","idToken":"id","refreshToken":"rt","expiresIn":"3600"}"#,
        )
        .await;

        let store = Arc::new(MemoryProfileStore::new());
        let gateway = AuthGateway::new(&test_config(), store.clone(), SessionHandle::new())
            .with_clients(
                GoogleOAuthClient::new("cid".to_string(), "cs".to_string()),
                IdentityClient::new("api-key".to_string()).with_endpoints(addr.clone(), addr),
            );

        let profile = gateway
            .register_with_email_and_password("c@example.com", "hunter2", "Carol")
            .await
            .unwrap();

        assert_eq!(profile.uid, "u-10");
        assert_eq!(profile.nickname, "Carol");
        assert_eq!(store.get("u-10").await.unwrap(), Some(profile));
        assert_eq!(gateway.current_user_uid(), Some("u-10".to_string()));
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let addr = spawn_http_stub(
            "200 OK",
            r#"{"localId":"u-9","email":"b@example.com","idToken":"id","refreshToken":"rt","expiresIn":"3600"}"#,
        )
        .await;

        let gateway = AuthGateway::new(
            &test_config(),
            Arc::new(MemoryProfileStore::new()),
            SessionHandle::new(),
        )
        .with_clients(
            GoogleOAuthClient::new("cid".to_string(), "cs".to_string()),
            IdentityClient::new("api-key".to_string()).with_endpoints(addr.clone(), addr),
        );

        gateway
            .login_with_email_and_password("b@example.com", "hunter2")
            .await
            .unwrap();
        assert!(gateway.current_user_uid().is_some());

        gateway.logout();
        assert_eq!(gateway.current_user_uid(), None);
    }
}
