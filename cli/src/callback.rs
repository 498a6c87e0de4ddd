//! Loopback HTTP listener for the hosted-UI redirect.
//!
//! The hosted UI redirects the browser to the registered redirect URI after
//! the user authenticates with a third-party provider. This listener binds
//! the redirect URI's port, accepts that single request, and hands the full
//! redirect URL back so the session layer can extract the authorization
//! code from it.

use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::anyhow;
use url::Url;

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>OpenGlot</title></head>\
    <body><h1>Signed in</h1><p>You can close this tab and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>OpenGlot</title></head>\
    <body><h1>Sign-in failed</h1><p>Return to the terminal and try again.</p></body></html>";

/// One-shot listener on the redirect URI's host and port.
pub struct CallbackListener {
    listener: TcpListener,
    redirect_uri: Url,
}

impl CallbackListener {
    /// Binds the port named by the redirect URI. The provider only accepts
    /// registered redirect URIs, so the port is fixed rather than ephemeral.
    pub fn bind(redirect_uri: &str) -> anyhow::Result<Self> {
        let redirect_uri = Url::parse(redirect_uri)
            .with_context(|| format!("invalid redirect URI: {redirect_uri}"))?;
        let port = redirect_uri
            .port_or_known_default()
            .ok_or_else(|| anyhow!("redirect URI has no port: {redirect_uri}"))?;

        let listener = TcpListener::bind(format!("127.0.0.1:{port}"))
            .with_context(|| format!("failed to bind callback port {port}"))?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            redirect_uri,
        })
    }

    /// Blocks until the provider redirects the browser here, then returns
    /// the full redirect URL (the configured URI plus the provider's query
    /// string). Does not inspect the query itself; a redirect carrying an
    /// `error` instead of a `code` is still returned and classified by the
    /// session layer.
    pub fn wait_for_redirect(&self, timeout: Duration) -> anyhow::Result<String> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(100);

        let (mut stream, _) = loop {
            match self.listener.accept() {
                Ok(conn) => break conn,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(anyhow!("timed out waiting for the sign-in redirect"));
                    }
                    std::thread::sleep(poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        };

        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;

        let mut request_line = String::new();
        BufReader::new(&stream).read_line(&mut request_line)?;

        let path = request_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("malformed callback request: {request_line:?}"))?;

        let mut redirect_url = self.redirect_uri.clone();
        redirect_url.set_query(path.split_once('?').map(|(_, query)| query));

        let page = if redirect_url.query_pairs().any(|(key, _)| key == "code") {
            SUCCESS_PAGE
        } else {
            FAILURE_PAGE
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
            page.len(),
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()?;

        Ok(redirect_url.to_string())
    }
}
