// channel error types.

use thiserror::Error;


// ==== base error types ====


/// Error for trying to give a value into a channel which has already been closed or errored
///
/// Errors are "sticky": once a channel is finalized, every further give returns this error. The
/// value which could not be given is handed back.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("cannot give into a finalized channel")]
pub struct GiveError<T> {
    /// The value that could not be given
    pub value: T,
}

/// Error for a given value which was dropped without any consumer retrieving it
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("value was dropped without being consumed")]
pub struct UnconsumedError;

/// Error for attempting to wait on a channel future with no or limited blocking, and the future
/// not resolving immediately or by the specified deadline
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("operation would block")]
pub struct WouldBlockError;


// ==== compound error types ====


/// Error for waiting on a [`Consumed`](crate::future::Consumed) signal with no or limited
/// blocking
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum TryConsumedError {
    /// The value was dropped without being consumed
    #[error(transparent)]
    Unconsumed(#[from] UnconsumedError),
    /// The value was not consumed immediately or by the specified deadline
    #[error(transparent)]
    WouldBlock(#[from] WouldBlockError),
}
