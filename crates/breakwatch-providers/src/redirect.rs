//! One-shot loopback HTTP listener for the OAuth redirect.
//!
//! The browser is sent back to `http://<host>:<port><path>?code=..&state=..`
//! (or `?error=..`). Each connection is handled on its own task so an idle
//! pre-connect socket from the browser cannot stall the real redirect.
//! Requests to any other path get a 404 and the listener keeps waiting.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

/// How long a single connection may take to send its request head.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>breakwatch</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">\
<h1>Calendar connected</h1><p>You can close this tab and return to breakwatch.</p>\
</body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>breakwatch</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">\
<h1>Authorization failed</h1><p>breakwatch was not granted access. You can close this tab.</p>\
</body></html>";

/// What the identity provider sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The user consented.
    Code { code: String, state: Option<String> },
    /// The provider reported an error (user cancelled, consent refused...).
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// Accepts connections on `listener` and, if given, `secondary` until one
/// carries a redirect, then reports it and returns, dropping both listeners.
pub async fn serve(
    listener: TcpListener,
    secondary: Option<TcpListener>,
    path: String,
    tx: oneshot::Sender<Redirect>,
) {
    let path: Arc<str> = path.into();
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            accepted = accept_on(secondary.as_ref()) => accepted,
            Some(joined) = connections.join_next() => {
                if let Ok(Some(redirect)) = joined {
                    let _ = tx.send(redirect);
                    return;
                }
                continue;
            }
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "redirect connection");
                let path = Arc::clone(&path);
                connections.spawn(async move {
                    tokio::time::timeout(REQUEST_TIMEOUT, handle(stream, &path))
                        .await
                        .ok()
                        .flatten()
                });
            }
            Err(e) => warn!(error = %e, "redirect listener accept failed"),
        }
    }
}

/// Accepts on `listener`, or never resolves when there is none.
async fn accept_on(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn handle(mut stream: TcpStream, path: &str) -> Option<Redirect> {
    let (read, mut write) = stream.split();
    let mut reader = BufReader::new(read);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;

    // Drain headers; the request has no body we care about.
    let mut header = String::new();
    loop {
        header.clear();
        match reader.read_line(&mut header).await {
            Ok(0) => break,
            Ok(_) if header == "\r\n" || header == "\n" => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    let target = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{target}")).ok()?;

    if url.path() != path {
        debug!(path = %url.path(), "ignoring request to unexpected path");
        respond(&mut write, "404 Not Found", "not found").await;
        return None;
    }

    let redirect = parse_redirect(&url);
    let (status, page) = match redirect {
        Some(Redirect::Code { .. }) => ("200 OK", SUCCESS_PAGE),
        _ => ("400 Bad Request", FAILURE_PAGE),
    };
    respond(&mut write, status, page).await;
    redirect
}

fn parse_redirect(url: &Url) -> Option<Redirect> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Redirect::Denied { error, description });
    }
    code.map(|code| Redirect::Code { code, state })
}

async fn respond<W>(write: &mut W, status: &str, body: &str)
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = write.write_all(response.as_bytes()).await;
    let _ = write.flush().await;
}
