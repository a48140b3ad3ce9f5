//! Google OAuth2 provider client
//!
//! Builds the authorization URL for the browser consent step and trades the
//! resulting authorization code for a provider access token. The exchange is
//! a single form POST with no retry; a failure here aborts the whole Google
//! login.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::Result;
use crate::error::Error;

/// Google OAuth2 endpoints
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for a TableHop sign-in
const SIGN_IN_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// Google OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Client for the provider's authorization and token endpoints
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    http: Client,
}

impl GoogleOAuthClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            http: Client::new(),
        }
    }

    /// Point the client at different provider endpoints (tests, self-hosted
    /// gateways)
    pub fn with_endpoints(mut self, auth_url: String, token_url: String) -> Self {
        self.auth_url = auth_url;
        self.token_url = token_url;
        self
    }

    /// Build the authorization URL for the consent step
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| Error::Config(format!("Invalid authorization endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &SIGN_IN_SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true");

        Ok(url.to_string())
    }

    /// Exchange the authorization code for a provider access token
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let request = TokenExchangeRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
            redirect_uri,
            grant_type: "authorization_code",
        };

        let response = self
            .http
            .post(&self.token_url)
            .form(&request)
            .send()
            .await
            .map_err(|e| Error::CodeExchange(format!("Token endpoint unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::CodeExchange(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::CodeExchange(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::CodeExchange(format!("Malformed token response ({}): {}", e, body)))?;

        match token.access_token {
            Some(token) => Ok(token),
            None => Err(Error::CodeExchange(format!(
                "Token response missing access_token: {}",
                body
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::stub::spawn_http_stub;
    use std::collections::HashMap;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new("client-1".to_string(), "secret-1".to_string())
    }

    #[test]
    fn test_authorization_url_parameters() {
        let url = client()
            .authorization_url("http://127.0.0.1:8787/callback")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:8787/callback");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["include_granted_scopes"], "true");
        assert!(params["scope"].contains("userinfo.email"));
        assert!(params["scope"].contains("userinfo.profile"));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let addr = spawn_http_stub("200 OK", r#"{"access_token":"ya29.token"}"#).await;
        let client = client().with_endpoints(GOOGLE_AUTH_URL.to_string(), addr);

        let token = client
            .exchange_code("abc123", "http://127.0.0.1:8787/callback")
            .await
            .unwrap();
        assert_eq!(token, "ya29.token");
    }

    #[tokio::test]
    async fn test_exchange_code_rejected_by_provider() {
        let addr = spawn_http_stub("400 Bad Request", r#"{"error":"invalid_grant"}"#).await;
        let client = client().with_endpoints(GOOGLE_AUTH_URL.to_string(), addr);

        let err = client
            .exchange_code("stale", "http://127.0.0.1:8787/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CodeExchange(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_exchange_code_missing_access_token() {
        let addr = spawn_http_stub("200 OK", r#"{"token_type":"Bearer"}"#).await;
        let client = client().with_endpoints(GOOGLE_AUTH_URL.to_string(), addr);

        let err = client
            .exchange_code("abc123", "http://127.0.0.1:8787/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CodeExchange(_)));
        assert!(err.to_string().contains("access_token"));
    }
}
