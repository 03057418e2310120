use blueblock_types::Principal;

/// Errors produced by ledger transitions, stores, and configuration.
///
/// A transition that returns an error has changed nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{caller} is not authorized to {operation}")]
    Unauthorized {
        caller: Principal,
        operation: &'static str,
    },

    #[error("anchor {index} not found (anchor_count = {anchor_count})")]
    NotFound { index: u64, anchor_count: u64 },

    #[error("ledger already initialized")]
    AlreadyInitialized,

    #[error("ledger has not been created")]
    NotInitialized,

    #[error("ledger has been deleted; it no longer accepts writes")]
    Deleted,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("state schema exhausted: {kind} slots needed {needed}, limit {limit}")]
    SchemaExhausted {
        kind: &'static str,
        needed: u64,
        limit: u64,
    },

    #[error("integrity violation at anchor {index}: {reason}")]
    IntegrityViolation { index: u64, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// Returns `true` for errors raised by transition validation rather than
    /// by the store or host.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. }
                | Self::NotFound { .. }
                | Self::AlreadyInitialized
                | Self::NotInitialized
                | Self::Deleted
                | Self::InvalidArgument(_)
                | Self::SchemaExhausted { .. }
        )
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}
