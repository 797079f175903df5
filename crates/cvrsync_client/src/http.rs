//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`], so any
//! library (or no network at all) can carry the JSON bodies.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use cvrsync_core::UserId;
use cvrsync_protocol::{ErrorResponse, PullRequest, PullResponse, PushRequest};
use cvrsync_server::{SyncServer, PULL_PATH, PUSH_PATH};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST. `Err` means no response arrived.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks if the client is healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport with JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g. `https://sync.example.com/api`).
    base_url: String,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn post(&self, path: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url, body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;

        if (200..300).contains(&response.status) {
            return Ok(response.body);
        }
        match ErrorResponse::decode(&response.body) {
            Ok(body) => Err(SyncError::from_response(body)),
            Err(_) if response.status >= 500 => Err(SyncError::transport_retryable(format!(
                "HTTP {} from {url}",
                response.status
            ))),
            Err(_) => Err(SyncError::transport_fatal(format!(
                "HTTP {} from {url}",
                response.status
            ))),
        }
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn push(&self, request: &PushRequest) -> SyncResult<()> {
        self.post(PUSH_PATH, request.encode()?).map(|_| ())
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let body = self.post(PULL_PATH, request.encode()?)?;
        Ok(PullResponse::decode(&body)?)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// An [`HttpClient`] that routes requests to an in-process server's POST
/// router, authenticated as a fixed user.
pub struct LoopbackClient {
    server: Arc<SyncServer>,
    user: UserId,
}

impl LoopbackClient {
    /// Creates a loopback client.
    pub fn new(server: Arc<SyncServer>, user: impl Into<UserId>) -> Self {
        Self {
            server,
            user: user.into(),
        }
    }
}

impl HttpClient for LoopbackClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let path = url.rfind('/').map_or(url, |i| &url[i..]);
        let response = self.server.handle_post(path, &self.user, &body);
        Ok(HttpResponse {
            status: response.status,
            body: response.body,
        })
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
