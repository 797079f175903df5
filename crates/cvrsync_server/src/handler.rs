//! Request handlers for the push and pull endpoints.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::mutator::MutatorRegistry;
use crate::{pull, push};
use crate::push::PushSummary;
use cvrsync_core::{MemoryStore, UserId};
use cvrsync_protocol::{PullOk, PullRequest, PushRequest};
use cvrsync_schema::SchemaRegistry;
use std::sync::Arc;

/// Everything a request needs. Built once at startup, shared read-only.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Backing store, shared by all handlers.
    pub store: Arc<MemoryStore>,
    /// Entity types visible through pulls.
    pub schemas: Arc<SchemaRegistry>,
    /// Business logic per mutation name.
    pub mutators: Arc<MutatorRegistry>,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(
        config: ServerConfig,
        store: Arc<MemoryStore>,
        schemas: Arc<SchemaRegistry>,
        mutators: Arc<MutatorRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            schemas,
            mutators,
        }
    }
}

/// Handler for sync requests.
///
/// Handlers are stateless; all state lives in the store.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Applies a push on behalf of `user`.
    pub fn handle_push(&self, user: &UserId, request: &PushRequest) -> ServerResult<PushSummary> {
        push::handle_push(&self.context, user, request)
    }

    /// Serves a pull on behalf of `user`.
    pub fn handle_pull(&self, user: &UserId, request: &PullRequest) -> ServerResult<PullOk> {
        pull::handle_pull(&self.context, user, request)
    }

    /// Returns the shared context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }
}
