//! OAuth2 callback server
//!
//! A temporary local HTTP server that captures the OAuth2 authorization code
//! from the browser redirect. The accept loop runs as a background task and
//! hands the first code it sees to the waiting login flow through a one-shot
//! channel; requests without a `code` parameter are answered and ignored so
//! stray probes cannot end the wait early.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use url::Url;
use crate::Result;
use crate::error::Error;

/// Default callback port
///
/// Registered with the OAuth provider as part of the redirect URI, so it is
/// fixed per deployment. Only one listener can hold it at a time.
pub const DEFAULT_CALLBACK_PORT: u16 = 8787;

/// Confirmation page shown after the code arrives
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>TableHop | Sign-in Complete</title>
    <style>
        body {
            background-color: #faf6f0;
            color: #2d2a26;
            font-family: 'Inter', -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        .container { max-width: 400px; padding: 40px; }
        .icon { font-size: 64px; margin-bottom: 24px; }
        h1 { font-size: 24px; font-weight: 700; margin: 0 0 12px; color: #c0392b; }
        p { font-size: 15px; color: #6b655d; line-height: 1.6; }
    </style>
</head>
<body>
    <div class="container">
        <div class="icon">🍽️</div>
        <h1>Sign-in Complete</h1>
        <p>TableHop has received your authorization.<br>You can close this window and return to the app.</p>
    </div>
</body>
</html>"#;

/// Page shown for requests that do not carry an authorization code
const WAITING_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>TableHop | Waiting for Sign-in</title>
</head>
<body>
    <p>TableHop is still waiting for the sign-in redirect. You can close this window.</p>
</body>
</html>"#;

/// Cancellation signal for an in-flight login
///
/// Firing it resolves the waiting side with a cancelled outcome even if the
/// wait has not started yet.
#[derive(Clone, Default)]
pub struct CancelSignal {
    notify: std::sync::Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn cancelled(&self) {
        self.notify.notified().await;
    }
}

/// A bound callback listener with its background accept loop
#[derive(Debug)]
pub struct CallbackServer {
    port: u16,
    code_rx: oneshot::Receiver<String>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Bind the local callback port and start accepting requests
    ///
    /// Fails fast with [`Error::ListenerUnavailable`] if the port is taken,
    /// before any browser is opened.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            Error::ListenerUnavailable(format!("Failed to bind {}: {}", addr, e))
        })?;

        // Recover the real port so tests can bind port 0
        let port = listener
            .local_addr()
            .map_err(|e| Error::ListenerUnavailable(format!("Failed to read local addr: {}", e)))?
            .port();

        tracing::debug!("callback listener on http://127.0.0.1:{}", port);

        let (code_tx, code_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, code_tx));

        Ok(Self {
            port,
            code_rx,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI registered for this listener
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.port)
    }

    /// Block until the browser redirect delivers an authorization code
    ///
    /// Resolves with [`Error::ConsentTimeout`] when the user abandons the
    /// browser tab, and [`Error::Cancelled`] when `cancel` fires.
    pub async fn wait_for_code(
        &mut self,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<String> {
        tokio::select! {
            received = &mut self.code_rx => received.map_err(|_| {
                Error::ListenerUnavailable(
                    "Callback listener stopped before a code arrived".to_string(),
                )
            }),
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(Error::ConsentTimeout),
        }
    }

    /// Stop the listener and release the port
    pub fn stop(self) {
        self.task.abort();
        tracing::debug!("callback listener on port {} stopped", self.port);
    }
}

/// Accept connections until the first request carrying a code
///
/// The sender is consumed on first use, so later codes are never delivered
/// even if more requests race in before shutdown.
async fn accept_loop(listener: TcpListener, code_tx: oneshot::Sender<String>) {
    let mut code_tx = Some(code_tx);

    loop {
        let (mut socket, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("callback accept failed: {}", e);
                continue;
            }
        };

        let mut buffer = vec![0u8; 4096];
        let n = match socket.read(&mut buffer).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("failed to read callback request: {}", e);
                continue;
            }
        };

        let request = String::from_utf8_lossy(&buffer[..n]);

        match extract_code(&request) {
            Some(code) => {
                respond(&mut socket, "200 OK", SUCCESS_HTML).await;
                if let Some(tx) = code_tx.take() {
                    let _ = tx.send(code);
                }
                break;
            }
            None => {
                tracing::debug!("callback request without a code, still waiting");
                respond(&mut socket, "200 OK", WAITING_HTML).await;
            }
        }
    }
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Pull the `code` query parameter out of a raw HTTP request, if present
fn extract_code(request: &str) -> Option<String> {
    // Request line: GET /callback?code=xxx HTTP/1.1
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;

    let url = Url::parse(&format!("http://localhost{}", path)).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.to_string())
}
