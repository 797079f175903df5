//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Schema version clients must present, compared exactly.
    pub schema_version: String,
    /// Maximum number of mutations in one push.
    pub max_push_batch: usize,
    /// Attempts per transaction before a serialization conflict is fatal.
    pub max_transaction_attempts: u32,
    /// Number of CVRs kept per client group. Older cookies stop resolving.
    pub cvr_retention: usize,
}

impl ServerConfig {
    /// Creates a configuration for the given schema version.
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            max_push_batch: 100,
            max_transaction_attempts: 5,
            cvr_retention: 16,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the transaction attempt bound (at least 1).
    pub fn with_max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = attempts.max(1);
        self
    }

    /// Sets how many CVRs are kept per group (at least 1).
    pub fn with_cvr_retention(mut self, count: usize) -> Self {
        self.cvr_retention = count.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("1")
    }
}
