// exposed API of channels

use self::future::*;
use super::{
    error::*,
    core,
};
use std::{
    convert::Infallible,
    fmt::{self, Debug, Formatter},
    sync::Once,
};


// ==== helper functions for adapting core API to exposed API ====


// make a request on the channel and wrap it in a future.
//
// the future is built after unlocking, as that may clone the terminal outcome.
fn request<T, E>(channel: &core::Channel<T, E>) -> NextFut<T, E> {
    let request = channel.lock().next();
    NextFut::new(request)
}

// finish giving a value once the channel is unlocked, dropping whatever a request could not take.
fn finish_give<T, E>(given: core::Given<T, E>) -> Consumed {
    let (consumed, undelivered) = given;
    drop(undelivered);
    consumed
}


// ==== the exposed API ====


/// Outcome of a single request on a [`Channel`]
///
/// Resolves to `Err` if and only if the channel was finalized with [`error`](Channel::error).
pub type Outcome<T, E> = Result<Step<T>, E>;

/// A successful step of a [`Channel`]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Step<T> {
    /// A value given into the channel
    Value(T),
    /// The channel was closed, with the final value it was closed with, if any
    ///
    /// Once a request resolves to this, every later request on the channel resolves to it too.
    Done(Option<T>),
}

impl<T> Step<T> {
    /// Whether this is the done step
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }

    /// Get the carried value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            Step::Value(value) => Some(value),
            Step::Done(value) => value,
        }
    }
}

/// Backlog between the input and output sides of a [`Channel`]
///
/// At most one kind of backlog exists at a time.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Backlog {
    /// Nothing is buffered and nothing is waiting
    Empty,
    /// This many values are buffered, waiting for requests
    Values(usize),
    /// This many requests are waiting, for values
    Requests(usize),
}

/// Unbounded handshake channel
///
/// Values are [given](Self::give) into the channel and handed out to requests made with
/// [`next`](Self::next), in FIFO order: the Nth value given is handed to the Nth request made,
/// regardless of which came first. Giving never blocks. A producer that wants backpressure can
/// await the [`Consumed`] signal returned for each value, which resolves once a consumer has
/// actually retrieved it.
///
/// A channel is finalized, exactly once, by [`close`](Self::close) or [`error`](Self::error).
/// Values buffered at that point are still handed out, after which every request, including
/// requests already waiting and any number made later, resolves to the same terminal outcome.
///
/// `Channel` is a cheap-to-clone handle to shared state, and may be used from any number of
/// producers and consumers on any number of threads. With the `futures` feature, it is also a
/// `Stream` of its values.
///
/// The second type parameter is the error type the channel may be finalized with.
pub struct Channel<T, E = Infallible> {
    channel: core::Channel<T, E>,
    // request in flight for this handle's stream implementation.
    in_flight: Option<NextFut<T, E>>,
    // whether this handle's stream has ended.
    stream_ended: bool,
}

impl<T, E> Channel<T, E> {
    /// Create an empty channel
    pub fn new() -> Self {
        Channel {
            channel: core::Channel::new(),
            in_flight: None,
            stream_ended: false,
        }
    }

    /// Give a value into the channel
    ///
    /// If a request is waiting, the longest-waiting one receives it. Otherwise it is buffered
    /// behind any previously given values.
    ///
    /// Returns a signal which resolves once a consumer has retrieved the value. Awaiting it is
    /// optional: a producer which never does so can grow the buffer without limit.
    ///
    /// Errors are "sticky": if the channel has been finalized, this and every further give
    /// returns an error, handing the value back.
    pub fn give(&self, value: T) -> Result<Consumed, GiveError<T>> {
        let given = self.channel.lock().give(value)?;
        Ok(finish_give(given))
    }

    /// Create a future to take the next value from the channel
    ///
    /// The request is placed in line as soon as this is called, not when the future is first
    /// polled. Dropping the future abandons its place in line: a value later handed to it is
    /// dropped, and that value's [`Consumed`] signal resolves to [`UnconsumedError`].
    ///
    /// See the API of [`NextFut`], as it is not only a future, but also provides additional
    /// methods, including the API for blocking on a request or trying to resolve it immediately.
    pub fn next(&self) -> NextFut<T, E> {
        request(&self.channel)
    }

    /// Deprecated alias for [`next`](Self::next)
    #[deprecated(
        note = "The channel.take() function is deprecated, please use channel.next() or for await loops."
    )]
    pub fn take(&self) -> NextFut<T, E> {
        static WARN_ONCE: Once = Once::new();
        WARN_ONCE.call_once(|| {
            warn!(
                "The channel.take() function is deprecated, please use channel.next() or for await \
                loops."
            );
        });
        self.next()
    }

    /// Put a value back so that it is the very next value handed out
    ///
    /// This is for a consumer which took a value but cannot handle it yet:
    ///
    /// - If requests are waiting, the longest-waiting one receives it.
    /// - If values are buffered, it is placed in front of all of them.
    /// - If the channel is empty, this is the same as [`give`](Self::give).
    ///
    /// Unlike `give`, this is permitted after the channel is finalized, in which case the value is
    /// still handed out before the terminal outcome.
    pub fn give_back(&self, value: T) -> Consumed {
        let given = self.channel.lock().give_back(value);
        finish_give(given)
    }

    /// Close the channel without a final value
    ///
    /// Once buffered values are handed out, every request resolves to `Ok(Step::Done(None))`.
    /// Returns whether this call finalized the channel: if it was already finalized, this has no
    /// effect.
    pub fn close(&self) -> bool {
        self.channel.finalize(core::Terminal::closed_empty())
    }

    /// Close the channel with a final value
    ///
    /// Once buffered values are handed out, every request resolves to
    /// `Ok(Step::Done(Some(value)))`, with a clone of the value. Returns whether this call
    /// finalized the channel: if it was already finalized, this has no effect.
    ///
    /// Clones are made without the channel locked, possibly on several threads at once, hence
    /// the `Sync` bound.
    pub fn close_with(&self, value: T) -> bool
    where
        T: Clone + Sync,
    {
        self.channel.finalize(core::Terminal::closed(Some(value)))
    }

    /// Finalize the channel with an error
    ///
    /// Once buffered values are handed out, every request resolves to `Err(error)`, with a clone
    /// of the error. Returns whether this call finalized the channel: if it was already
    /// finalized, this has no effect.
    ///
    /// Clones are made without the channel locked, possibly on several threads at once, hence
    /// the `Sync` bound.
    pub fn error(&self, error: E) -> bool
    where
        E: Clone + Sync,
    {
        self.channel.finalize(core::Terminal::errored(error))
    }

    /// Whether the channel has been closed or errored
    ///
    /// If this returns `true`, it will never again return `false`.
    pub fn is_finalized(&self) -> bool {
        self.channel.lock().is_finalized()
    }

    /// The current backlog of buffered values or waiting requests
    pub fn backlog(&self) -> Backlog {
        self.channel.lock().backlog()
    }
}

impl<T, E> Clone for Channel<T, E> {
    fn clone(&self) -> Self {
        Channel {
            channel: self.channel.clone(),
            in_flight: None,
            stream_ended: false,
        }
    }
}

impl<T, E> Default for Channel<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Debug for Channel<T, E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let lock = self.channel.lock();
        f.debug_struct("Channel")
            .field("backlog", &lock.backlog())
            .field("finalized", &lock.is_finalized())
            .finish()
    }
}

// no field is ever structurally pinned.
impl<T, E> Unpin for Channel<T, E> {}

/// Yields each value, yields `Err` once if the channel was errored, and ends once the channel is
/// done. Each handle has its own in-flight request.
#[cfg(feature = "futures")]
impl<T, E> futures::stream::Stream for Channel<T, E> {
    type Item = Result<T, E>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::{future::Future, pin::Pin, task::{Poll, ready}};

        let this = self.get_mut();
        if this.stream_ended {
            return Poll::Ready(None);
        }
        let fut = this.in_flight.get_or_insert_with(|| request(&this.channel));
        let outcome = ready!(Pin::new(fut).poll(cx));
        this.in_flight = None;
        Poll::Ready(match outcome {
            Ok(Step::Value(value)) => Some(Ok(value)),
            Ok(Step::Done(_)) => {
                this.stream_ended = true;
                None
            }
            Err(error) => {
                this.stream_ended = true;
                Some(Err(error))
            }
        })
    }
}

#[cfg(feature = "futures")]
impl<T, E> futures::stream::FusedStream for Channel<T, E> {
    fn is_terminated(&self) -> bool {
        self.stream_ended
    }
}


// future types for channels.
pub(crate) mod future {
    use super::*;
    use crate::channel::{
        node::Delivery,
        polling::{Timeout, poll},
    };
    use std::{
        task::{Poll, Context},
        future::Future,
        pin::Pin,
        mem::replace,
        time::{Duration, Instant},
    };
    use tokio::sync::oneshot;

    /// Future for taking the next value from a [`Channel`]
    ///
    /// The request this represents was placed in line when the future was created. Requests are
    /// matched with values in the order they were created, regardless of the order they are
    /// polled in.
    ///
    /// Resolves to `Ok(Step::Value(_))` for a value, `Ok(Step::Done(_))` if the channel was
    /// closed, and `Err(_)` if the channel was errored. Terminal outcomes are "sticky": every
    /// request made on the channel afterwards resolves to the same outcome.
    ///
    /// Resolving to a value is what fires that value's [`Consumed`] signal.
    pub struct NextFut<T, E>(NextState<T, E>);

    enum NextState<T, E> {
        // waiting on a claimed node of the channel.
        Claimed(oneshot::Receiver<Delivery<T, E>>),
        // already has the channel's terminal outcome.
        Terminal(Delivery<T, E>),
        // already resolved.
        Resolved,
    }

    // convert a delivery into its outcome, firing the consumed signal if it is a value.
    fn outcome<T, E>(delivery: Delivery<T, E>) -> Outcome<T, E> {
        match delivery {
            Delivery::Value(value, consumed) => {
                // the producer may have stopped listening, which is fine
                let _ = consumed.send(());
                Ok(Step::Value(value))
            }
            Delivery::Done(value) => Ok(Step::Done(value)),
            Delivery::Error(error) => Err(error),
        }
    }

    impl<T, E> NextFut<T, E> {
        pub(crate) fn new(request: core::Request<T, E>) -> Self {
            NextFut(match request {
                core::Request::Claimed(claim) => NextState::Claimed(claim),
                core::Request::Terminal(terminal) => NextState::Terminal(terminal.delivery()),
            })
        }

        /// Block until this future resolves
        ///
        /// Calling this method counts as polling this future, and when this method returns, that
        /// counts as this future resolving. This method will panic if this future has already
        /// resolved.
        pub fn block(&mut self) -> Outcome<T, E> {
            assert!(!self.is_terminated(), "NextFut.block called after terminated");
            poll(self, Timeout::Never).expect("poll timed out with Timeout::Never")
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// `WouldBlockError`, the request keeps its place in line. This method will panic if this
        /// future has already resolved.
        pub fn try_now(&mut self) -> Result<Outcome<T, E>, WouldBlockError> {
            assert!(!self.is_terminated(), "NextFut.try_now called after terminated");
            poll(self, Timeout::NonBlocking).ok_or(WouldBlockError)
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// `WouldBlockError`, the request keeps its place in line. This method will panic if this
        /// future has already resolved.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<Outcome<T, E>, WouldBlockError> {
            assert!(!self.is_terminated(), "NextFut.block_timeout called after terminated");
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// `WouldBlockError`, the request keeps its place in line. This method will panic if this
        /// future has already resolved.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<Outcome<T, E>, WouldBlockError> {
            assert!(!self.is_terminated(), "NextFut.block_deadline called after terminated");
            poll(self, Timeout::At(deadline)).ok_or(WouldBlockError)
        }

        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            matches!(&self.0, &NextState::Resolved)
        }
    }

    impl<T, E> Future for NextFut<T, E> {
        type Output = Outcome<T, E>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            match replace(&mut this.0, NextState::Resolved) {
                NextState::Claimed(mut claim) => match Pin::new(&mut claim).poll(cx) {
                    Poll::Ready(Ok(delivery)) => Poll::Ready(outcome(delivery)),
                    Poll::Ready(Err(_)) => {
                        // every handle to the channel was dropped without finalizing it
                        debug!("channel dropped while request was waiting");
                        Poll::Ready(Ok(Step::Done(None)))
                    }
                    Poll::Pending => {
                        this.0 = NextState::Claimed(claim);
                        Poll::Pending
                    }
                },
                NextState::Terminal(delivery) => Poll::Ready(outcome(delivery)),
                // for implementation of FusedFuture
                NextState::Resolved => Poll::Pending,
            }
        }
    }

    // no field is ever structurally pinned.
    impl<T, E> Unpin for NextFut<T, E> {}

    #[cfg(feature = "futures")]
    impl<T, E> futures::future::FusedFuture for NextFut<T, E> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    impl<T, E> Debug for NextFut<T, E> {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            let state = match &self.0 {
                &NextState::Claimed(_) => "Claimed",
                &NextState::Terminal(_) => "Terminal",
                &NextState::Resolved => "Resolved",
            };
            f.debug_tuple("NextFut").field(&state).finish()
        }
    }


    /// Future which resolves once a given value has been retrieved by a consumer
    ///
    /// Awaiting this is how a producer opts into backpressure: a producer which awaits the signal
    /// of every value it gives proceeds at the pace of its consumers. Dropping this does not
    /// affect the value.
    ///
    /// Resolves to [`UnconsumedError`] if the value is dropped without any consumer retrieving
    /// it, for example because the request it was handed to was dropped, or because every handle
    /// to the channel was dropped with the value still buffered.
    #[derive(Debug)]
    pub struct Consumed(Option<oneshot::Receiver<()>>);

    impl Consumed {
        pub(crate) fn new(consumed: oneshot::Receiver<()>) -> Self {
            Consumed(Some(consumed))
        }

        /// Block until the value is consumed
        ///
        /// This method will panic if this future has already resolved.
        pub fn block(&mut self) -> Result<(), UnconsumedError> {
            assert!(!self.is_terminated(), "Consumed.block called after terminated");
            poll(self, Timeout::Never).expect("poll timed out with Timeout::Never")
        }

        /// Check whether the value has been consumed without blocking
        ///
        /// This method will panic if this future has already resolved.
        pub fn try_now(&mut self) -> Result<(), TryConsumedError> {
            assert!(!self.is_terminated(), "Consumed.try_now called after terminated");
            Ok(poll(self, Timeout::NonBlocking).ok_or(WouldBlockError)??)
        }

        /// Block until the value is consumed or a timeout elapses
        ///
        /// This method will panic if this future has already resolved.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<(), TryConsumedError> {
            assert!(!self.is_terminated(), "Consumed.block_timeout called after terminated");
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until the value is consumed or the deadline is reached
        ///
        /// This method will panic if this future has already resolved.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<(), TryConsumedError> {
            assert!(!self.is_terminated(), "Consumed.block_deadline called after terminated");
            Ok(poll(self, Timeout::At(deadline)).ok_or(WouldBlockError)??)
        }

        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_none()
        }
    }

    impl Future for Consumed {
        type Output = Result<(), UnconsumedError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            let Some(consumed) = this.0.as_mut() else { return Poll::Pending };
            let result = match Pin::new(consumed).poll(cx) {
                Poll::Ready(result) => result.map_err(|_| UnconsumedError),
                Poll::Pending => return Poll::Pending,
            };
            this.0 = None;
            Poll::Ready(result)
        }
    }

    #[cfg(feature = "futures")]
    impl futures::future::FusedFuture for Consumed {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }
}


// ==== tests ====
