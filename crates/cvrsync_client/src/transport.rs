//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use cvrsync_core::UserId;
use cvrsync_protocol::{PullRequest, PullResponse, PushRequest};
use cvrsync_server::{ServerError, SyncServer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A sync transport carries push and pull requests to the server.
///
/// Implementations map server-side failures into [`SyncError`]:
/// structured error bodies through [`SyncError::from_response`], transport
/// failures as [`SyncError::Transport`].
pub trait SyncTransport: Send + Sync {
    /// Sends a push. Success carries no body.
    fn push(&self, request: &PushRequest) -> SyncResult<()>;

    /// Sends a pull.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport.
    fn close(&self) -> SyncResult<()>;
}

/// A transport that calls an in-process [`SyncServer`] directly, as `user`.
#[derive(Debug)]
pub struct LoopbackTransport {
    server: Arc<SyncServer>,
    user: UserId,
    connected: AtomicBool,
}

impl LoopbackTransport {
    /// Creates a loopback transport authenticated as `user`.
    pub fn new(server: Arc<SyncServer>, user: impl Into<UserId>) -> Self {
        Self {
            server,
            user: user.into(),
            connected: AtomicBool::new(true),
        }
    }

    /// Returns the server behind this transport.
    pub fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }

    fn ensure_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

fn map_server_error(err: ServerError) -> SyncError {
    SyncError::from_response(err.to_response())
}

impl SyncTransport for LoopbackTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<()> {
        self.ensure_connected()?;
        self.server
            .handle_push(&self.user, request)
            .map(|_| ())
            .map_err(map_server_error)
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.ensure_connected()?;
        self.server
            .handle_pull(&self.user, request)
            .map_err(map_server_error)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
