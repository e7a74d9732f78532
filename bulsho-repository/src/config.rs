//! Configuration types for the MutationClient.

use std::time::Duration;

/// Default timeout applied to every store call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Default limit on the number of targets in a batch fetch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Configuration for the MutationClient.
///
/// Controls how long a single store call may stay pending and how many
/// targets a batch fetch may carry.
#[derive(Debug, Clone)]
pub struct MutationClientConfig {
    /// Maximum number of target ids in a single batch fetch.
    ///
    /// Set to `None` to disable the limit.
    pub max_batch_size: Option<usize>,

    /// Time after which a pending store call is abandoned and reported as failed.
    pub request_timeout: Duration,
}

impl Default for MutationClientConfig {
    fn default() -> Self {
        Self {
            max_batch_size: Some(DEFAULT_MAX_BATCH_SIZE),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MutationClientConfig {
    /// Create a config with no batch size limit.
    pub fn unlimited() -> Self {
        Self {
            max_batch_size: None,
            ..Self::default()
        }
    }

    /// Create a config with a custom batch size limit.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: Some(max_batch_size),
            ..Self::default()
        }
    }

    /// Replace the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
