//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::mutator::MutatorRegistry;
use crate::push::PushSummary;
use cvrsync_core::{MemoryStore, UserId};
use cvrsync_protocol::{ErrorResponse, PullRequest, PullResponse, PushRequest};
use cvrsync_schema::SchemaRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/push";
/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/pull";

/// Status and JSON body for an HTTP layer to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body, empty for a successful push.
    pub body: Vec<u8>,
}

impl PostResponse {
    fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    fn error(err: &ServerError) -> Self {
        let status = match err {
            ServerError::Unauthorized(_) => 403,
            ServerError::UnknownEndpoint(_) => 404,
            ServerError::MutationOutOfOrder { .. } => 409,
            e if e.is_client_error() => 400,
            _ => 500,
        };
        let body = err
            .to_response()
            .encode()
            .unwrap_or_else(|_| br#"{"error":"Internal"}"#.to_vec());
        Self { status, body }
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request counters of a [`SyncServer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Push requests handled successfully.
    pub pushes: u64,
    /// Mutations applied by their mutator.
    pub mutations_applied: u64,
    /// Mutations already applied before.
    pub mutations_replayed: u64,
    /// Mutations accounted for in error mode.
    pub mutations_failed: u64,
    /// Pull requests answered with a patch.
    pub pulls: u64,
    /// Pulls that found nothing new.
    pub noop_pulls: u64,
    /// Pulls answered with `ClientStateNotFound`.
    pub resyncs_requested: u64,
    /// Requests that ended in an error.
    pub failed_requests: u64,
}

/// The sync server.
///
/// Owns the store and the immutable schema and mutator registries, and
/// serves push and pull requests against them. Transport and authentication
/// live outside: callers pass the authenticated user with every request.
///
/// # Example
///
/// ```
/// use cvrsync_server::{MutatorRegistry, ServerConfig, SyncServer};
/// use cvrsync_schema::SchemaRegistry;
///
/// let server = SyncServer::new(
///     ServerConfig::new("1"),
///     SchemaRegistry::new(),
///     MutatorRegistry::new(),
/// );
///
/// // An HTTP layer would mount this on its POST routes.
/// let response = server.handle_post("/metrics", &"u1".into(), b"{}");
/// assert_eq!(response.status, 404);
/// ```
#[derive(Debug)]
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    stats: Mutex<ServerStats>,
}

impl SyncServer {
    /// Creates a sync server with a fresh store.
    pub fn new(config: ServerConfig, schemas: SchemaRegistry, mutators: MutatorRegistry) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()), schemas, mutators)
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(
        config: ServerConfig,
        store: Arc<MemoryStore>,
        schemas: SchemaRegistry,
        mutators: MutatorRegistry,
    ) -> Self {
        tracing::info!(
            schema_version = %config.schema_version,
            entity_types = schemas.len(),
            mutators = mutators.len(),
            "sync server ready"
        );
        let context = Arc::new(HandlerContext::new(
            config,
            store,
            Arc::new(schemas),
            Arc::new(mutators),
        ));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            stats: Mutex::new(ServerStats::default()),
        }
    }

    /// Handles a push request.
    pub fn handle_push(&self, user: &UserId, request: &PushRequest) -> ServerResult<PushSummary> {
        let result = self.handler.handle_push(user, request);
        let mut stats = self.stats.lock();
        match &result {
            Ok(summary) => {
                stats.pushes += 1;
                stats.mutations_applied += summary.applied as u64;
                stats.mutations_replayed += summary.replayed as u64;
                stats.mutations_failed += summary.failed as u64;
            }
            Err(_) => stats.failed_requests += 1,
        }
        result
    }

    /// Handles a pull request.
    ///
    /// Conditions the protocol reports in the pull body itself (an unknown
    /// cookie, an unsupported version) come back as
    /// [`PullResponse::Error`]; everything else is an `Err`.
    pub fn handle_pull(&self, user: &UserId, request: &PullRequest) -> ServerResult<PullResponse> {
        let result = self.handler.handle_pull(user, request);
        let mut stats = self.stats.lock();
        match result {
            Ok(ok) => {
                if ok.patch.is_empty() && request.cookie == Some(ok.cookie) {
                    stats.noop_pulls += 1;
                } else {
                    stats.pulls += 1;
                }
                Ok(PullResponse::Ok(ok))
            }
            Err(e) => match e.to_response() {
                ErrorResponse::ClientStateNotFound => {
                    stats.resyncs_requested += 1;
                    Ok(PullResponse::Error(ErrorResponse::ClientStateNotFound))
                }
                body @ ErrorResponse::VersionNotSupported { .. } => {
                    stats.failed_requests += 1;
                    Ok(PullResponse::Error(body))
                }
                _ => {
                    stats.failed_requests += 1;
                    Err(e)
                }
            },
        }
    }

    /// Routes a JSON POST body to the push or pull endpoint.
    pub fn handle_post(&self, path: &str, user: &UserId, body: &[u8]) -> PostResponse {
        let result = match path {
            PUSH_PATH => self.post_push(user, body),
            PULL_PATH => self.post_pull(user, body),
            other => Err(ServerError::UnknownEndpoint(other.to_string())),
        };
        result.unwrap_or_else(|e| {
            if e.is_server_error() {
                tracing::error!(path, error = %e, "request failed");
            } else {
                tracing::debug!(path, error = %e, "request rejected");
            }
            PostResponse::error(&e)
        })
    }

    fn post_push(&self, user: &UserId, body: &[u8]) -> ServerResult<PostResponse> {
        let request = PushRequest::decode(body)?;
        self.handle_push(user, &request)?;
        Ok(PostResponse::ok(Vec::new()))
    }

    fn post_pull(&self, user: &UserId, body: &[u8]) -> ServerResult<PostResponse> {
        let request = PullRequest::decode(body)?;
        let response = self.handle_pull(user, &request)?;
        Ok(PostResponse::ok(response.encode()?))
    }

    /// Returns a snapshot of the request counters.
    pub fn stats(&self) -> ServerStats {
        self.stats.lock().clone()
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.context.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the schema registry.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.context.schemas
    }
}
