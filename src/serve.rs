//! Development server: the watch loop plus HTTP over the output directory.
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────┐
//! │   Main Thread    │        │   scribe-http    │
//! │  watch::watch()  │        │   tiny_http      │
//! └────────┬─────────┘        └────────┬─────────┘
//!          │                           │
//!          ▼                           ▼
//!    Build, rebuild              Serve files from
//!    on change                   the output dir
//! ```
//!
//! The output directory is taken from the config at startup. Requests map to
//! files under it; a directory answers with its `index.html`. Anything that
//! would leave the output directory is a 404.

use crate::build::{BuildReport, INDEX_FILE};
use crate::config::{self, ConfigError};
use crate::watch::{self, WatchError};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to listen on port {port}: {message}")]
    Bind { port: u16, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Build, watch and serve until the watcher stops.
pub fn serve(
    site_root: &Path,
    port: u16,
    caching: bool,
    on_build: impl FnMut(&BuildReport),
) -> Result<(), ServeError> {
    let site_config = config::load_config(site_root)?;
    let output = site_config.paths(site_root).output;
    fs::create_dir_all(&output)?;

    let server = Arc::new(bind(port)?);
    tracing::info!(output = %output.display(), "serving at http://localhost:{port}/");

    let http = {
        let server = Arc::clone(&server);
        thread::Builder::new()
            .name("scribe-http".into())
            .spawn(move || serve_requests(&server, &output))?
    };

    let watched = watch::watch(site_root, caching, on_build);
    server.unblock();
    if http.join().is_err() {
        tracing::warn!("http thread panicked");
    }
    Ok(watched?)
}

/// Listen on localhost. Port 0 picks a free port.
fn bind(port: u16) -> Result<Server, ServeError> {
    Server::http((Ipv4Addr::LOCALHOST, port)).map_err(|e| ServeError::Bind {
        port,
        message: e.to_string(),
    })
}

/// Answer requests until the server is unblocked.
fn serve_requests(server: &Server, root: &Path) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, root) {
            tracing::warn!("failed to answer request: {e}");
        }
    }
}

fn handle_request(request: Request, root: &Path) -> std::io::Result<()> {
    if !matches!(request.method(), Method::Get | Method::Head) {
        let response =
            Response::from_string("405 Method Not Allowed").with_status_code(StatusCode(405));
        return request.respond(with_content_type(response, "text/plain; charset=utf-8"));
    }

    let found = resolve(root, request.url())
        .and_then(|path| fs::read(&path).ok().map(|data| (path, data)));
    match found {
        Some((path, data)) => {
            tracing::debug!(url = request.url(), "200");
            let response = Response::from_data(data);
            request.respond(with_content_type(response, content_type(&path)))
        }
        None => {
            tracing::debug!(url = request.url(), "404");
            let response =
                Response::from_string("404 Not Found").with_status_code(StatusCode(404));
            request.respond(with_content_type(response, "text/plain; charset=utf-8"))
        }
    }
}

fn with_content_type<R: std::io::Read>(response: Response<R>, value: &str) -> Response<R> {
    match Header::from_bytes("Content-Type", value) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

/// The file a request URL maps to under `root`.
///
/// Query and fragment are dropped and percent-escapes decoded. A directory
/// resolves to its `index.html`. `None` when the file does not exist or a
/// segment is `.`, `..` or holds a backslash.
pub fn resolve(root: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let decoded = urlencoding::decode(path).ok()?;

    let mut local = root.to_path_buf();
    for segment in decoded.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        local.push(segment);
    }
    if local.is_dir() {
        local.push(INDEX_FILE);
    }
    local.is_file().then_some(local)
}

/// MIME type from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
