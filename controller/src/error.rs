use crate::ApiVersion;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reflector was started without a watch source, or it was already started.
    #[error("ingress reflector has no watch source")]
    NotInitialized,

    #[error("stopped before the ingress cache synced")]
    SyncTimeout,

    #[error("ingress watch ended before the cache synced")]
    WatchClosed,

    #[error("unsupported ingress API version: {0}")]
    UnsupportedApiVersion(String),

    /// A query for one API version was made against a monitor of the other.
    #[error("ingress query expects {expected}, but the monitor watches {actual}")]
    WrongSchemaVersion {
        expected: ApiVersion,
        actual: ApiVersion,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
