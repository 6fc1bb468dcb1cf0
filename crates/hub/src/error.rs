use thiserror::Error;

/// Failures the coordinator reports to whoever initiated an operation.
///
/// Racing or redundant commands (`start` while running, `stop` while idle)
/// are not errors; they come back as [`crate::coordinator::Transition::Ignored`].
/// A viewer whose channel breaks is dropped by the hub and never surfaces here.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A log or reading store write did not complete.
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

pub type Result<T, E = CoordinatorError> = std::result::Result<T, E>;
