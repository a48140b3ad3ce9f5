//! Identity Token Service client
//!
//! REST client for the hosted identity service backing TableHop accounts:
//! email/password sign-in and sign-up, the federated sign-in exchange that
//! turns a provider access token into a TableHop identity, and id-token
//! refresh. Every call is a single request with no retry; failures carry the
//! raw response body for diagnosis.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::session::{SessionState, SessionTokens};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Provider id embedded in the federated sign-in envelope
const PROVIDER_ID: &str = "google.com";

/// Display name used when the provider reports none
const DEFAULT_DISPLAY_NAME: &str = "Guest";

/// The identity triple derived from a validated provider access token
#[derive(Debug, Clone, PartialEq)]
pub struct FederatedIdentity {
    pub uid: String,
    pub email: String,
    pub display_name: String,
}

/// Result of the federated sign-in exchange
#[derive(Debug, Clone)]
pub struct FederatedSignIn {
    pub identity: FederatedIdentity,
    pub tokens: SessionTokens,
}

/// Result of an email/password sign-in or sign-up
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub email: String,
    pub tokens: SessionTokens,
}

#[derive(Debug, Serialize)]
struct SignInWithIdpRequest {
    #[serde(rename = "postBody")]
    post_body: String,
    #[serde(rename = "requestUri")]
    request_uri: String,
    #[serde(rename = "returnIdpCredential")]
    return_idp_credential: bool,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct SignInWithIdpResponse {
    #[serde(rename = "localId")]
    local_id: Option<String>,
    email: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "fullName")]
    full_name: Option<String>,
    #[serde(rename = "firstName")]
    first_name: Option<String>,
    #[serde(rename = "idToken")]
    id_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
struct PasswordAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct PasswordAuthResponse {
    #[serde(rename = "localId")]
    local_id: Option<String>,
    email: Option<String>,
    #[serde(rename = "idToken")]
    id_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

// The secure-token endpoint answers in snake_case, unlike the rest
#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    user_id: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// Client for the hosted identity service
#[derive(Clone)]
pub struct IdentityClient {
    api_key: String,
    base_url: String,
    token_url: String,
    http: Client,
}

impl IdentityClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: IDENTITY_TOOLKIT_URL.to_string(),
            token_url: SECURE_TOKEN_URL.to_string(),
            http: Client::new(),
        }
    }

    /// Point the client at a different identity service deployment (tests,
    /// emulators)
    pub fn with_endpoints(mut self, base_url: String, token_url: String) -> Self {
        self.base_url = base_url;
        self.token_url = token_url;
        self
    }

    fn account_endpoint(&self, operation: &str) -> String {
        format!("{}/accounts:{}?key={}", self.base_url, operation, self.api_key)
    }

    /// Trade a provider access token for a TableHop identity
    pub async fn sign_in_with_idp(&self, access_token: &str) -> Result<FederatedSignIn> {
        let request = SignInWithIdpRequest {
            post_body: format!("access_token={}&providerId={}", access_token, PROVIDER_ID),
            request_uri: "http://localhost".to_string(),
            return_idp_credential: true,
            return_secure_token: true,
        };

        let response = self
            .http
            .post(self.account_endpoint("signInWithIdp"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::IdentityExchange(format!("Identity service unreachable: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::IdentityExchange(format!("Failed to read federated sign-in response: {}", e))
        })?;

        if !status.is_success() {
            return Err(Error::IdentityExchange(format!(
                "Federated sign-in returned {}: {}",
                status, body
            )));
        }

        parse_federated_sign_in(&body)
    }

    /// Sign in an existing account with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser> {
        self.password_auth("signInWithPassword", email, password)
            .await
    }

    /// Create a new account with email and password
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthenticatedUser> {
        self.password_auth("signUp", email, password).await
    }

    async fn password_auth(
        &self,
        operation: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser> {
        let request = PasswordAuthRequest {
            email,
            password,
            return_secure_token: true,
        };

        let response = self
            .http
            .post(self.account_endpoint(operation))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Identity service unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("Failed to read {} response: {}", operation, e)))?;

        if !status.is_success() {
            return Err(Error::Auth(format!(
                "{} returned {}: {}",
                operation, status, body
            )));
        }

        let parsed: PasswordAuthResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("Malformed {} response ({}): {}", operation, e, body)))?;

        let uid = parsed.local_id.ok_or_else(|| {
            Error::Auth(format!("{} response missing localId: {}", operation, body))
        })?;
        let expires_in = parsed.expires_in.as_deref().and_then(|s| s.parse::<i64>().ok());

        Ok(AuthenticatedUser {
            uid,
            email: parsed.email.unwrap_or_else(|| email.to_string()),
            tokens: SessionTokens::new(parsed.id_token, parsed.refresh_token, expires_in),
        })
    }

    /// Refresh an expired id token
    pub async fn refresh_id_token(&self, refresh_token: &str) -> Result<SessionState> {
        let request = RefreshTokenRequest {
            grant_type: "refresh_token",
            refresh_token,
        };

        let response = self
            .http
            .post(format!("{}?key={}", self.token_url, self.api_key))
            .form(&request)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token refresh unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("Failed to read refresh response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Auth(format!(
                "Token refresh returned {}: {}",
                status, body
            )));
        }

        let parsed: RefreshTokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("Malformed refresh response ({}): {}", e, body)))?;

        let uid = parsed
            .user_id
            .ok_or_else(|| Error::Auth(format!("Refresh response missing user_id: {}", body)))?;
        let expires_in = parsed.expires_in.as_deref().and_then(|s| s.parse::<i64>().ok());

        Ok(SessionState::new(
            uid,
            SessionTokens::new(parsed.id_token, parsed.refresh_token, expires_in),
        ))
    }
}

/// Parse the federated sign-in response body into an identity
///
/// `localId` is the one hard requirement. A missing email is synthesized
/// from the uid, and the display name falls through `displayName`,
/// `fullName`, `firstName` before settling on a placeholder.
fn parse_federated_sign_in(body: &str) -> Result<FederatedSignIn> {
    let response: SignInWithIdpResponse = serde_json::from_str(body).map_err(|e| {
        Error::IdentityExchange(format!("Malformed federated sign-in response ({}): {}", e, body))
    })?;

    let uid = response.local_id.ok_or_else(|| {
        Error::IdentityExchange(format!("Federated sign-in response missing localId: {}", body))
    })?;

    let email = match response.email {
        Some(email) => email,
        None => {
            tracing::warn!(uid = %uid, "federated sign-in carried no email, synthesizing one");
            format!("{}@{}", uid, PROVIDER_ID)
        }
    };

    let display_name = response
        .display_name
        .or(response.full_name)
        .or(response.first_name)
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

    let expires_in = response.expires_in.as_deref().and_then(|s| s.parse::<i64>().ok());

    Ok(FederatedSignIn {
        identity: FederatedIdentity {
            uid,
            email,
            display_name,
        },
        tokens: SessionTokens::new(response.id_token, response.refresh_token, expires_in),
    })
}
