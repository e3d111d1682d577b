// minimal safe API for the channel. the exposed API is a convenience wrapper around this.

use super::{
    api::{Backlog, future::Consumed},
    chain::Chain,
    node::{Node, Delivery},
    error::GiveError,
};
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;


// handle to a channel.
pub(crate) struct Channel<T, E>(Arc<Mutex<Lockable<T, E>>>);

// channel lockable state.
struct Lockable<T, E> {
    // nodes spanning from the lagging cursor (front) to the leading cursor (back).
    chain: Chain<Node<T, E>>,
    // which cursor is at the front of the chain, or none if they coincide.
    //
    // - if Some(Output), the nodes before the back are buffered values.
    // - if Some(Input), the nodes before the back are waiting requests.
    // - none if and only if the chain has exactly one node.
    lagging: Option<Cursor>,
    // begins as none. once set, never changes again.
    //
    // - holds some only if lagging is not Some(Input).
    terminal: Option<Arc<Terminal<T, E>>>,
}

// one of the two cursors into the chain.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Cursor {
    // where the next give lands.
    Input,
    // where the next request reads.
    Output,
}

// terminal state a channel has been finalized with.
//
// stores the clone function captured at finalization, so that only finalizing requires Clone.
// it is shared out of the lock and copied from there, so only finalizing requires Sync.
pub(crate) enum Terminal<T, E> {
    Closed(Option<(T, fn(&T) -> T)>),
    Errored(E, fn(&E) -> E),
}

// safety: a T or E is only ever stored by the constructors, which require it to be Sync. shared
// access never does anything with it other than clone it.
unsafe impl<T: Send, E: Send> Sync for Terminal<T, E> {}

// a value given into the channel, with what a request could not take of it.
//
// the undelivered part holds user values, so it must be dropped only once the channel is
// unlocked.
pub(crate) type Given<T, E> = (Consumed, Option<Delivery<T, E>>);

// what a request made on the channel gets.
pub(crate) enum Request<T, E> {
    // a claimed slot, which may or may not be resolved yet.
    Claimed(oneshot::Receiver<Delivery<T, E>>),
    // the channel's terminal state, to copy the outcome from once unlocked.
    Terminal(Arc<Terminal<T, E>>),
}

impl Cursor {
    fn other(self) -> Self {
        match self {
            Cursor::Input => Cursor::Output,
            Cursor::Output => Cursor::Input,
        }
    }
}

impl<T, E> Terminal<T, E> {
    // terminal state for closing with an optional final value.
    pub(crate) fn closed(value: Option<T>) -> Self
    where
        T: Clone + Sync,
    {
        Terminal::Closed(value.map(|value| (value, T::clone as fn(&T) -> T)))
    }

    // terminal state for closing without a final value.
    pub(crate) fn closed_empty() -> Self {
        Terminal::Closed(None)
    }

    // terminal state for erroring.
    pub(crate) fn errored(error: E) -> Self
    where
        E: Clone + Sync,
    {
        Terminal::Errored(error, E::clone as fn(&E) -> E)
    }

    // resolve the node with a copy of the terminal outcome. returns the copy back if the node's
    // request was abandoned.
    fn finalize(&self, node: &mut Node<T, E>) -> Option<Delivery<T, E>> {
        match self {
            &Terminal::Closed(ref value) =>
                node.close(value.as_ref().map(|&(ref value, clone)| clone(value))),
            &Terminal::Errored(ref error, clone) => node.error(clone(error)),
        }
    }

    // produce a fresh copy of the terminal outcome.
    pub(crate) fn delivery(&self) -> Delivery<T, E> {
        match self {
            &Terminal::Closed(ref value) =>
                Delivery::Done(value.as_ref().map(|&(ref value, clone)| clone(value))),
            &Terminal::Errored(ref error, clone) => Delivery::Error(clone(error)),
        }
    }
}

impl<T, E> Channel<T, E> {
    // construct empty channel.
    pub(crate) fn new() -> Self {
        Channel(Arc::new(Mutex::new(Lockable {
            chain: Chain::new(Node::new()),
            lagging: None,
            terminal: None,
        })))
    }

    // clone another handle to the channel.
    pub(crate) fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }

    // lock the channel.
    pub(crate) fn lock(&self) -> Lock<'_, T, E> {
        Lock(self.0.lock().unwrap())
    }

    // finalize the channel, unless it is already finalized. returns whether this call finalized
    // it.
    //
    // every waiting request is resolved with the terminal outcome, after the lock is released.
    // if the channel was already finalized, the terminal passed in is dropped after unlocking.
    pub(crate) fn finalize(&self, terminal: Terminal<T, E>) -> bool {
        let terminal = Arc::new(terminal);
        let mut waiting: SmallVec<[Node<T, E>; 4]> = SmallVec::new();
        {
            let mut lock = self.lock();
            let lockable = &mut *lock.0;
            if lockable.terminal.is_some() {
                return false;
            }
            if lockable.lagging == Some(Cursor::Input) {
                // every node before the back is a waiting request
                while lockable.chain.len() > 1 {
                    let node = lockable.chain.pop_front();
                    debug_assert!(node.is_claimed() && !node.is_resolved());
                    waiting.push(node);
                }
                lockable.lagging = None;
            }
            lockable.terminal = Some(Arc::clone(&terminal));
        }

        trace!(waiting = waiting.len(), "channel finalized");
        for node in waiting.iter_mut() {
            drop(terminal.finalize(node));
        }
        true
    }
}

// lock on a channel.
pub(crate) struct Lock<'a, T, E>(MutexGuard<'a, Lockable<T, E>>);

impl<'a, T, E> Lock<'a, T, E> {
    // give a value at the input cursor.
    //
    // errors if the channel is finalized.
    pub(crate) fn give(&mut self, value: T) -> Result<Given<T, E>, GiveError<T>> {
        if self.0.terminal.is_some() {
            return Err(GiveError { value });
        }
        Ok(self.give_unchecked(value))
    }

    // make a request at the output cursor.
    //
    // buffered values are still handed out after finalization. only once they are drained do
    // requests get the terminal outcome.
    pub(crate) fn next(&mut self) -> Request<T, E> {
        if self.0.lagging != Some(Cursor::Output) {
            if let Some(terminal) = self.0.terminal.as_ref() {
                return Request::Terminal(Arc::clone(terminal));
            }
        }
        let claim = self.at(Cursor::Output).claim();
        self.ensure_next(Cursor::Output);
        Request::Claimed(claim)
    }

    // give a value such that it is the next value handed out.
    //
    // permitted after finalization, in which case it is still handed out before the terminal
    // outcome.
    pub(crate) fn give_back(&mut self, value: T) -> Given<T, E> {
        let finalized = self.is_finalized();
        let lagging = self.0.lagging;
        match lagging {
            // channel is empty, so same as a give
            None if !finalized => self.give_unchecked(value),
            // longest-waiting request gets it, so same as a give
            Some(Cursor::Input) => self.give_unchecked(value),
            // put it in front of the buffered values
            _ => self.wrap().send(value),
        }
    }

    // whether the channel has been finalized.
    pub(crate) fn is_finalized(&self) -> bool {
        self.0.terminal.is_some()
    }

    // current backlog between the cursors.
    pub(crate) fn backlog(&self) -> Backlog {
        let n = self.0.chain.len() - 1;
        match self.0.lagging {
            None => Backlog::Empty,
            Some(Cursor::Output) => Backlog::Values(n),
            Some(Cursor::Input) => Backlog::Requests(n),
        }
    }

    // number of live nodes.
    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.0.chain.len()
    }

    // give a value at the input cursor without checking the terminal state.
    fn give_unchecked(&mut self, value: T) -> Given<T, E> {
        let given = self.at(Cursor::Input).send(value);
        self.ensure_next(Cursor::Input);
        given
    }

    // borrow the node at the cursor.
    fn at(&mut self, cursor: Cursor) -> &mut Node<T, E> {
        if self.0.lagging == Some(cursor) {
            self.0.chain.front()
        } else {
            self.0.chain.back()
        }
    }

    // advance the cursor to its next node.
    //
    // if the cursor is lagging, its next node already exists, and the node it leaves has now
    // been passed by both cursors and is dropped. otherwise a fresh node is linked at the back.
    fn ensure_next(&mut self, cursor: Cursor) {
        let lockable = &mut *self.0;
        if lockable.lagging == Some(cursor) {
            let node = lockable.chain.pop_front();
            debug_assert!(node.is_claimed() && node.is_resolved());
            if lockable.chain.len() == 1 {
                lockable.lagging = None;
            }
        } else {
            lockable.chain.push_back(Node::new());
            lockable.lagging = Some(cursor.other());
        }
    }

    // link a fresh node in front of the chain and move the output cursor onto it.
    //
    // must not be called while requests are waiting.
    fn wrap(&mut self) -> &mut Node<T, E> {
        let lockable = &mut *self.0;
        debug_assert!(lockable.lagging != Some(Cursor::Input), "internal bug");
        lockable.chain.push_front(Node::new());
        lockable.lagging = Some(Cursor::Output);
        lockable.chain.front()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::error::{TryConsumedError, UnconsumedError, WouldBlockError};

    fn value_of(request: Request<u32, &'static str>) -> u32 {
        let Request::Claimed(mut claim) = request else { panic!("expected claimed slot") };
        match claim.try_recv() {
            Ok(Delivery::Value(value, consumed)) => {
                let _ = consumed.send(());
                value
            }
            _ => panic!("expected value"),
        }
    }

    fn terminal_of(request: Request<u32, &'static str>) -> Delivery<u32, &'static str> {
        let Request::Terminal(terminal) = request else { panic!("expected terminal") };
        terminal.delivery()
    }

    #[test]
    fn balanced_traffic_keeps_one_node() {
        let channel = Channel::<u32, &str>::new();
        let mut lock = channel.lock();
        for i in 0..1000 {
            lock.give(i).unwrap();
            assert_eq!(lock.node_count(), 2);
            assert_eq!(value_of(lock.next()), i);
            assert_eq!(lock.node_count(), 1);
        }
        let mut claims = Vec::new();
        for _ in 0..1000 {
            claims.push(lock.next());
        }
        assert_eq!(lock.backlog(), Backlog::Requests(1000));
        for i in 0..1000 {
            lock.give(i).unwrap();
        }
        assert_eq!(lock.node_count(), 1);
        assert_eq!(lock.backlog(), Backlog::Empty);
        for (i, request) in claims.into_iter().enumerate() {
            assert_eq!(value_of(request), i as u32);
        }
    }

    #[test]
    fn backlog_tracks_lagging_cursor() {
        let channel = Channel::<u32, &str>::new();
        let mut lock = channel.lock();
        assert_eq!(lock.backlog(), Backlog::Empty);
        lock.give(1).unwrap();
        lock.give(2).unwrap();
        assert_eq!(lock.backlog(), Backlog::Values(2));
        assert_eq!(lock.node_count(), 3);
        assert_eq!(value_of(lock.next()), 1);
        assert_eq!(lock.backlog(), Backlog::Values(1));
        assert_eq!(value_of(lock.next()), 2);
        assert_eq!(lock.backlog(), Backlog::Empty);
    }

    #[test]
    fn give_back_wraps_in_front_of_buffered_values() {
        let channel = Channel::<u32, &str>::new();
        let mut lock = channel.lock();
        lock.give(1).unwrap();
        lock.give(2).unwrap();
        lock.give_back(0);
        assert_eq!(lock.backlog(), Backlog::Values(3));
        assert_eq!(value_of(lock.next()), 0);
        assert_eq!(value_of(lock.next()), 1);
        assert_eq!(value_of(lock.next()), 2);
        assert_eq!(lock.node_count(), 1);
    }

    #[test]
    fn give_back_to_waiting_request() {
        let channel = Channel::<u32, &str>::new();
        let mut lock = channel.lock();
        let first = lock.next();
        let second = lock.next();
        lock.give_back(5);
        assert_eq!(lock.backlog(), Backlog::Requests(1));
        assert_eq!(value_of(first), 5);
        lock.give(6).unwrap();
        assert_eq!(value_of(second), 6);
        assert_eq!(lock.backlog(), Backlog::Empty);
    }

    #[test]
    fn finalize_resolves_waiting_requests() {
        let channel = Channel::<u32, &str>::new();
        let requests = {
            let mut lock = channel.lock();
            [lock.next(), lock.next(), lock.next()]
        };
        assert!(channel.finalize(Terminal::errored("boom")));
        assert!(!channel.finalize(Terminal::closed(Some(1))));
        for request in requests {
            let Request::Claimed(mut claim) = request else { panic!("expected claimed slot") };
            assert!(matches!(claim.try_recv(), Ok(Delivery::Error("boom"))));
        }
        let mut lock = channel.lock();
        assert!(lock.is_finalized());
        assert_eq!(lock.node_count(), 1);
        assert!(matches!(terminal_of(lock.next()), Delivery::Error("boom")));
        assert!(lock.give(1).is_err());
    }

    #[test]
    fn give_into_abandoned_request_returns_value() {
        let channel = Channel::<u32, &str>::new();
        let mut lock = channel.lock();
        drop(lock.next());
        let (mut consumed, undelivered) = lock.give(3).unwrap();
        assert!(matches!(undelivered, Some(Delivery::Value(3, _))));
        assert_eq!(lock.backlog(), Backlog::Empty);
        assert_eq!(consumed.try_now(), Err(TryConsumedError::WouldBlock(WouldBlockError)));
        drop(lock);
        drop(undelivered);
        assert_eq!(consumed.try_now(), Err(TryConsumedError::Unconsumed(UnconsumedError)));
    }

    #[test]
    fn finalize_keeps_buffered_values() {
        let channel = Channel::<u32, &str>::new();
        channel.lock().give(1).unwrap();
        assert!(channel.finalize(Terminal::closed(Some(9))));
        let mut lock = channel.lock();
        assert_eq!(value_of(lock.next()), 1);
        assert!(matches!(terminal_of(lock.next()), Delivery::Done(Some(9))));
        assert!(matches!(terminal_of(lock.next()), Delivery::Done(Some(9))));
        lock.give_back(4);
        assert_eq!(value_of(lock.next()), 4);
        assert!(matches!(terminal_of(lock.next()), Delivery::Done(Some(9))));
    }
}
