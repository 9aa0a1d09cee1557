//! Interactive fallback flow.
//!
//! When automated trust store installation is impossible, the root
//! certificate is served over a short-lived local HTTP listener so the
//! operator can import it through a browser's certificate manager. The flow
//! suspends until the operator signals completion.

use std::fs;
use std::future::IntoFuture;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::thread;

use axum::http::header;
use axum::Router;
use tracing::debug;

use crate::error::Result;

const CERT_MIME: &str = "application/x-x509-ca-cert";

/// Operator signal abstraction.
///
/// Interactive prompts are injected through this trait so automated callers
/// can supply a synthetic signal instead of real terminal input.
pub trait Operator: Send + Sync {
    /// Present guidance to the operator.
    fn instruct(&self, message: &str);
    /// Suspend until the operator acknowledges the prompt.
    fn acknowledge(&self, prompt: &str) -> Result<()>;
}

/// Default operator: guidance on stderr, acknowledgment as one line of
/// input on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn instruct(&self, message: &str) {
        eprintln!("{message}");
    }

    fn acknowledge(&self, prompt: &str) -> Result<()> {
        eprint!("{prompt} ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

/// Serve the root certificate locally and walk the operator through a
/// manual import.
///
/// The browser launch is best-effort; the operator can always navigate to
/// the printed URL by hand. The listener is not torn down here, it dies
/// with the process.
pub fn present_certificate(cert_path: &Path, operator: &dyn Operator) -> Result<()> {
    let bytes = fs::read(cert_path)?;
    let port = serve_certificate(bytes)?;
    let url = format!("http://localhost:{port}");

    operator.instruct(&format!(
        "Automatic trust store installation was not possible.\n\
         The root certificate is being served at {url}\n\
         Open that address and import the certificate through your browser's\n\
         certificate manager, trusting it to identify websites."
    ));
    if let Err(e) = launch_browser(&url) {
        debug!(error = %e, "could not launch a browser, import manually");
    }
    operator.acknowledge("Press <Enter> once the certificate has been imported")?;
    Ok(())
}

/// Bind an ephemeral local port that answers every request with the raw
/// certificate bytes, and return the port.
pub(crate) fn serve_certificate(bytes: Vec<u8>) -> Result<u16> {
    let runtime = tokio::runtime::Runtime::new()?;
    let listener = runtime.block_on(tokio::net::TcpListener::bind(("127.0.0.1", 0)))?;
    let port = listener.local_addr()?.port();

    let body = Arc::new(bytes);
    let app = Router::new().fallback(move || {
        let body = Arc::clone(&body);
        async move { ([(header::CONTENT_TYPE, CERT_MIME)], body.as_ref().clone()) }
    });

    thread::spawn(move || {
        if let Err(e) = runtime.block_on(axum::serve(listener, app).into_future()) {
            debug!(error = %e, "fallback listener terminated");
        }
    });

    Ok(port)
}

fn launch_browser(url: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        Command::new("open").arg(url).spawn()?;
        return Ok(());
    }

    #[cfg(target_os = "windows")]
    {
        Command::new("cmd").args(["/C", "start", ""]).arg(url).spawn()?;
        return Ok(());
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if Command::new("firefox").arg(url).spawn().is_ok() {
            return Ok(());
        }
        Command::new("xdg-open").arg(url).spawn()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;

    #[test]
    fn listener_serves_certificate_bytes_to_any_request() {
        let payload = b"-----BEGIN CERTIFICATE-----\nfake\n-----END CERTIFICATE-----\n";
        let port = serve_certificate(payload.to_vec()).unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .write_all(b"GET /anything HTTP/1.0\r\nHost: localhost\r\n\r\n")
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        let response = String::from_utf8_lossy(&response);

        assert!(response.starts_with("HTTP/1.0 200") || response.starts_with("HTTP/1.1 200"));
        assert!(response
            .to_ascii_lowercase()
            .contains("content-type: application/x-x509-ca-cert"));
        assert!(response.contains("BEGIN CERTIFICATE"));
    }
}
