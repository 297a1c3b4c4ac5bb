//! Error kinds surfaced to callers of the transformer and the
//! parameter-server glue.

/// Errors produced by the transformer core and its configuration layer.
///
/// `Full` is deliberately not a variant here: a table-full condition during
/// `transform` is a normal outcome, surfaced as `TransformResult::ok ==
/// false` with a partial `ids_to_fetch`, not as an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum TransformerError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),

    #[error("out of memory: failed to grow buffer to {requested} elements")]
    OutOfMemory { requested: usize },
}

pub type Result<T> = std::result::Result<T, TransformerError>;
