//! OAuth 2.0 Authorization Flow Manager with PKCE Support
//!
//! Implements RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE) for the installed-app
//! flow against the Google authorization server.
//!
//! # Overview
//!
//! The flow manager handles:
//! - Building authorization URLs with a PKCE challenge and CSRF `state`
//! - Exchanging authorization codes for tokens
//! - Refreshing access tokens, retrying transient token endpoint failures
//!
//! # Security
//!
//! - PKCE S256 challenge; the verifier never leaves the process until the
//!   code exchange
//! - `state` is checked before any code is exchanged
//! - Tokens, codes and verifiers are never logged
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use std::sync::Arc;
//!
//! # fn example(http_client: Arc<dyn bridge_traits::HttpClient>) -> core_auth::Result<()> {
//! let config = OAuthConfig {
//!     client_id: "your-client-id".to_string(),
//!     client_secret: Some("your-client-secret".to_string()),
//!     scopes: vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
//!     auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
//!     token_url: "https://oauth2.googleapis.com/token".to_string(),
//! };
//!
//! let flow_manager = OAuthFlowManager::new(config, http_client);
//! let (auth_url, pkce_verifier) = flow_manager.build_auth_url("http://127.0.0.1:8080/")?;
//! // Send the user to auth_url, then exchange the returned code
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::TokenGrant;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::ClientRegistration;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Attempts made against the token endpoint when it answers 5xx.
const MAX_REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_BASE_DELAY_MS: u64 = 100;

/// OAuth 2.0 client configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Installed-app secret; absent for public clients
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn from_registration(registration: &ClientRegistration, scopes: Vec<String>) -> Self {
        Self {
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            scopes,
            auth_url: registration.auth_uri.clone(),
            token_url: registration.token_uri.clone(),
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// PKCE (Proof Key for Code Exchange) verifier plus the CSRF `state`.
///
/// Only the challenge derived from the verifier is sent with the
/// authorization request; the verifier itself goes with the code exchange.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Generate a 32-byte verifier and a 16-byte state, both base64url without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 method: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// OAuth 2.0 authorization code flow with PKCE.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent URL for `redirect_uri`.
    ///
    /// Requests offline access with a forced consent prompt so the reply
    /// always carries a refresh token. The returned verifier must be kept
    /// for [`exchange_code`](Self::exchange_code).
    #[instrument(skip(self))]
    pub fn build_auth_url(&self, redirect_uri: &str) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", verifier.state())
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        debug!("Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for tokens after checking `state`.
    #[instrument(skip(self, code, state, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        if state != verifier.state() {
            warn!("OAuth state mismatch on authorization callback");
            return Err(AuthError::StateMismatch);
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(ref client_secret) = self.config.client_secret {
            params.push(("client_secret", client_secret.as_str()));
        }

        debug!("Exchanging authorization code for tokens");

        let response = self
            .http_client
            .execute(self.token_request(&params)?)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let error_body = error_text(&response);
            warn!(status = status, "Token endpoint rejected the authorization code");
            return Err(AuthError::InvalidAuthCode(format!(
                "Token endpoint returned {}: {}",
                status, error_body
            )));
        }

        let grant = parse_grant(&response)?;
        info!(
            expires_in = grant.expires_in,
            has_refresh_token = grant.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );
        Ok(grant)
    }

    /// Mint a new access token from `refresh_token`.
    ///
    /// 4xx replies mean the refresh token is no longer accepted and map to
    /// [`AuthError::RefreshRejected`] at once. 5xx replies are retried with
    /// exponential backoff before [`AuthError::TokenRefreshFailed`].
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(ref client_secret) = self.config.client_secret {
            params.push(("client_secret", client_secret.as_str()));
        }

        debug!("Refreshing access token");

        let mut attempts = 0;
        loop {
            attempts += 1;

            let response = self
                .http_client
                .execute(self.token_request(&params)?)
                .await
                .map_err(|e| AuthError::NetworkError(e.to_string()))?;

            if response.is_success() {
                let grant = parse_grant(&response)?;
                info!(expires_in = grant.expires_in, "Refreshed access token");
                return Ok(grant);
            }

            let status = response.status;

            if response.is_client_error() {
                let error_body = error_text(&response);
                warn!(status = status, "Token endpoint rejected the refresh token");
                return Err(AuthError::RefreshRejected(format!(
                    "Token endpoint returned {}: {}",
                    status, error_body
                )));
            }

            if attempts >= MAX_REFRESH_ATTEMPTS {
                let error_body = error_text(&response);
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {} - {}",
                    attempts, status, error_body
                )));
            }

            let delay = Duration::from_millis(REFRESH_BASE_DELAY_MS * 2u64.pow(attempts - 1));
            warn!(
                status = status,
                attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }

    fn token_request(&self, params: &[(&str, &str)]) -> Result<HttpRequest> {
        HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .form(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))
    }
}

fn parse_grant(response: &HttpResponse) -> Result<TokenGrant> {
    response
        .json::<TokenGrant>()
        .map_err(|e| AuthError::SerializationFailed(format!("Failed to parse token response: {}", e)))
}

fn error_text(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::StreamingResponse;
    use bytes::Bytes;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays canned responses and records request bodies.
    #[derive(Default)]
    struct ScriptedHttpClient {
        responses: Mutex<VecDeque<HttpResponse>>,
        bodies: Mutex<Vec<String>>,
    }

    impl ScriptedHttpClient {
        fn with(responses: Vec<(u16, &str)>) -> Self {
            let responses = responses
                .into_iter()
                .map(|(status, body)| HttpResponse {
                    status,
                    headers: HashMap::new(),
                    body: Bytes::from(body.to_string()),
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            let body = request
                .body
                .map(|b| String::from_utf8_lossy(&b).to_string())
                .unwrap_or_default();
            self.bodies.lock().unwrap().push(body);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| BridgeError::OperationFailed("no scripted response".to_string()))
        }

        async fn open_stream(&self, _request: HttpRequest) -> BridgeResult<StreamingResponse> {
            Err(BridgeError::NotAvailable("streaming".to_string()))
        }
    }

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: Some("secret".to_string()),
            scopes: vec!["scope1".to_string(), "scope2".to_string()],
            auth_url: "https://provider.com/auth".to_string(),
            token_url: "https://provider.com/token".to_string(),
        }
    }

    fn manager(client: Arc<ScriptedHttpClient>) -> OAuthFlowManager {
        OAuthFlowManager::new(config(), client)
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();
        assert!(verifier.verifier().len() >= 43);
        assert!(!verifier.state().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());

        let other = PkceVerifier::new();
        assert_ne!(verifier.verifier(), other.verifier());
        assert_ne!(verifier.state(), other.state());
    }

    #[test]
    fn test_pkce_challenge_known_vector() {
        // RFC 7636 appendix B
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "s".to_string(),
        };
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_build_auth_url() {
        let manager = manager(Arc::new(ScriptedHttpClient::default()));
        let (url, verifier) = manager.build_auth_url("http://127.0.0.1:5000/").unwrap();

        let parsed = Url::parse(&url).unwrap();
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "test-client");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:5000/");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "scope1 scope2");
        assert_eq!(params["state"], verifier.state());
        assert_eq!(params["code_challenge"], verifier.challenge());
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
    }

    #[test]
    fn test_build_auth_url_invalid_url() {
        let mut bad = config();
        bad.auth_url = "not a valid url".to_string();
        let manager = OAuthFlowManager::new(bad, Arc::new(ScriptedHttpClient::default()));

        assert!(manager.build_auth_url("http://127.0.0.1:1/").is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_rejects_state_mismatch_without_request() {
        let client = Arc::new(ScriptedHttpClient::default());
        let manager = manager(client.clone());
        let verifier = PkceVerifier::new();

        let result = manager
            .exchange_code("code", "forged", &verifier, "http://127.0.0.1:1/")
            .await;

        assert_eq!(result.unwrap_err(), AuthError::StateMismatch);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let client = Arc::new(ScriptedHttpClient::with(vec![(
            200,
            r#"{"access_token":"ya29.a","refresh_token":"1//r","expires_in":3599,"token_type":"Bearer"}"#,
        )]));
        let manager = manager(client.clone());
        let verifier = PkceVerifier::new();

        let grant = manager
            .exchange_code("4/code", verifier.state(), &verifier, "http://127.0.0.1:1/")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "ya29.a");
        assert_eq!(grant.refresh_token.as_deref(), Some("1//r"));
        assert_eq!(grant.expires_in, Some(3599));

        let body = client.bodies.lock().unwrap()[0].clone();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code_verifier="));
        assert!(body.contains("client_secret=secret"));
    }

    #[tokio::test]
    async fn test_exchange_code_error_status() {
        let client = Arc::new(ScriptedHttpClient::with(vec![(
            400,
            r#"{"error":"invalid_grant"}"#,
        )]));
        let manager = manager(client);
        let verifier = PkceVerifier::new();

        let result = manager
            .exchange_code("bad", verifier.state(), &verifier, "http://127.0.0.1:1/")
            .await;
        assert!(matches!(result, Err(AuthError::InvalidAuthCode(_))));
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let client = Arc::new(ScriptedHttpClient::with(vec![(
            200,
            r#"{"access_token":"fresh","expires_in":3600}"#,
        )]));
        let manager = manager(client.clone());

        let grant = manager.refresh_access_token("1//r").await.unwrap();

        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(client.calls(), 1);
        assert!(client.bodies.lock().unwrap()[0].contains("grant_type=refresh_token"));
    }

    #[tokio::test]
    async fn test_refresh_rejected_on_client_error() {
        let client = Arc::new(ScriptedHttpClient::with(vec![(
            400,
            r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#,
        )]));
        let manager = manager(client.clone());

        let result = manager.refresh_access_token("revoked").await;

        assert!(matches!(result, Err(AuthError::RefreshRejected(_))));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_retries_server_errors() {
        let client = Arc::new(ScriptedHttpClient::with(vec![
            (503, "unavailable"),
            (500, "oops"),
            (200, r#"{"access_token":"third-time"}"#),
        ]));
        let manager = manager(client.clone());

        let grant = manager.refresh_access_token("1//r").await.unwrap();

        assert_eq!(grant.access_token, "third-time");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_refresh_gives_up_after_max_attempts() {
        let client = Arc::new(ScriptedHttpClient::with(vec![
            (500, "a"),
            (502, "b"),
            (503, "c"),
        ]));
        let manager = manager(client.clone());

        let result = manager.refresh_access_token("1//r").await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
        assert_eq!(client.calls(), MAX_REFRESH_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_is_network_error() {
        let manager = manager(Arc::new(ScriptedHttpClient::default()));
        let result = manager.refresh_access_token("1//r").await;
        assert!(matches!(result, Err(AuthError::NetworkError(_))));
    }
}
