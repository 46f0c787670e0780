//! Loopback redirect listener
//!
//! Receives the authorization redirect on `127.0.0.1` at an ephemeral port.
//! `tiny_http` is blocking, so the wait runs on the blocking pool and is
//! bounded by a deadline.

use crate::error::{AuthError, Result};
use core_runtime::config::MAX_AUTH_TIMEOUT;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, info, warn};
use url::Url;

const SUCCESS_PAGE: &str = "<html><body style=\"font-family: sans-serif; text-align: center\">\
<h1>Authorization complete</h1>\
<p>You can close this window and return to the application.</p>\
</body></html>";

/// Code and state carried by a successful redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub state: String,
}

impl std::fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCode")
            .field("code", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// One-shot HTTP listener for the authorization redirect.
pub struct LoopbackListener {
    server: Server,
    port: u16,
}

impl LoopbackListener {
    /// Bind `127.0.0.1` on a port chosen by the OS.
    pub fn bind() -> Result<Self> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|e| AuthError::CallbackListenerFailed(e.to_string()))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| {
                AuthError::CallbackListenerFailed("listener has no TCP address".to_string())
            })?;

        debug!(port = port, "Loopback listener bound");
        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Wait for the redirect that carries `expected_state`.
    ///
    /// Requests without `code` or `error` (favicon probes and the like) get a
    /// 404 and the wait continues. The browser always gets a page back.
    pub async fn wait_for_code(
        self,
        expected_state: String,
        timeout: Duration,
    ) -> Result<AuthorizationCode> {
        let port = self.port;
        info!(port = port, timeout_secs = timeout.as_secs(), "Waiting for authorization redirect");

        tokio::task::spawn_blocking(move || self.accept_until(&expected_state, timeout))
            .await
            .map_err(|e| AuthError::CallbackListenerFailed(e.to_string()))?
    }

    fn accept_until(&self, expected_state: &str, timeout: Duration) -> Result<AuthorizationCode> {
        let timeout = timeout.min(MAX_AUTH_TIMEOUT);
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("No authorization redirect before the deadline");
                return Err(AuthError::Timeout {
                    seconds: timeout.as_secs(),
                });
            }

            let request = match self.server.recv_timeout(remaining) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => return Err(AuthError::CallbackListenerFailed(e.to_string())),
            };

            if let Some(outcome) = handle_redirect(request, expected_state) {
                return outcome;
            }
        }
    }
}

/// Answer one request. `None` means it was not an authorization redirect.
fn handle_redirect(request: Request, expected_state: &str) -> Option<Result<AuthorizationCode>> {
    let params = match Url::parse(&format!("http://127.0.0.1{}", request.url())) {
        Ok(url) => url
            .query_pairs()
            .into_owned()
            .collect::<HashMap<String, String>>(),
        Err(_) => HashMap::new(),
    };

    if let Some(error) = params.get("error") {
        warn!(error = %error, "Authorization server returned an error");
        respond(request, 200, failure_page("Authorization was not granted."));
        let outcome = if error == "access_denied" {
            AuthError::UserDenied
        } else {
            AuthError::Other(format!("Authorization failed: {}", error))
        };
        return Some(Err(outcome));
    }

    let Some(code) = params.get("code") else {
        respond(request, 404, "Not Found".to_string());
        return None;
    };

    let state = params.get("state").cloned().unwrap_or_default();
    if state != expected_state {
        warn!("Authorization redirect carried an unexpected state");
        respond(request, 400, failure_page("Invalid state parameter."));
        return Some(Err(AuthError::StateMismatch));
    }

    respond(request, 200, SUCCESS_PAGE.to_string());
    info!("Authorization code received");
    Some(Ok(AuthorizationCode {
        code: code.clone(),
        state,
    }))
}

fn failure_page(reason: &str) -> String {
    format!(
        "<html><body style=\"font-family: sans-serif; text-align: center\">\
         <h1>Authorization failed</h1><p>{}</p></body></html>",
        reason
    )
}

fn respond(request: Request, status: u16, body: String) {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = "Content-Type: text/html; charset=utf-8".parse::<Header>() {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        debug!(error = %e, "Browser closed the connection before the reply");
    }
}
