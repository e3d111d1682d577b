// internal future polling system for channel.
//
// design based on pollster crate, but with timeouts, and with the future left intact if it times
// out so that it can still be awaited or blocked on later.

use std::{
    future::Future,
    sync::{Arc, Condvar, Mutex},
    task::{Context, Poll, Wake, Waker},
    time::Instant,
    pin::Pin,
};


// timeout for blocking on a future.
pub(crate) enum Timeout {
    // never time out.
    Never,
    // time out at the given deadline.
    At(Instant),
    // time out if the future is cannot be resolved without blocking.
    NonBlocking,
}

// poll the future until it resolves or the timeout is reached, in which case return none.
pub(crate) fn poll<F>(fut: &mut F, timeout: Timeout) -> Option<F::Output>
where
    F: Future + Unpin,
{
    let signal = Arc::new(Signal {
        state: Mutex::new(State::Empty),
        cond: Condvar::new(),
    });
    let waker = Waker::from(Arc::clone(&signal));
    let mut cx = Context::from_waker(&waker);

    loop {
        // return if ready
        if let Poll::Ready(output) = Pin::new(&mut *fut).poll(&mut cx) {
            return Some(output);
        }

        // otherwise, block until notification or timeout
        let mut lock = signal.state.lock().unwrap();

        // if a notification is already present, skip to the next loop iteration so as to release
        // the lock and try polling again without blocking.
        if let &State::Notified = &*lock {
            *lock = State::Empty;
            continue;
        }

        // otherwise, actually block until notification or timeout
        debug_assert!(matches!(&*lock, State::Empty));
        *lock = State::Waiting;
        match &timeout {
            // block on mutex + condvar indefinitely
            &Timeout::Never =>
                while let &State::Waiting = &*lock {
                    lock = signal.cond.wait(lock).unwrap();
                },

            // block on mutex + condvar until deadline, at which point return none
            &Timeout::At(deadline) =>
                while let &State::Waiting = &*lock {
                    let Some(duration) =
                        deadline.checked_duration_since(Instant::now())
                        else { return None };
                    let (lock2, wait_result) = signal.cond.wait_timeout(lock, duration).unwrap();
                    lock = lock2;
                    if wait_result.timed_out() { return None; }
                },

            // dont block on mutex + condvar, return none instead
            &Timeout::NonBlocking => return None,
        }
        *lock = State::Empty;
    }
}

// synchronization signal state
enum State {
    Empty,
    Waiting,
    Notified,
}

// synchronization signal, which is what our wakers point to
struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

impl Wake for Signal {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // notify signal
        let mut lock = self.state.lock().unwrap();
        match &*lock {
            &State::Notified => (),
            &State::Empty => {
                *lock = State::Notified;
            }
            &State::Waiting => {
                *lock = State::Empty;
                self.cond.notify_one();
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        future::{pending, ready},
        thread,
        time::Duration,
    };
    use tokio::sync::oneshot;

    #[test]
    fn ready_future_resolves() {
        assert_eq!(poll(&mut ready(5), Timeout::NonBlocking), Some(5));
        assert_eq!(poll(&mut ready(6), Timeout::Never), Some(6));
    }

    #[test]
    fn pending_future_times_out() {
        assert_eq!(poll(&mut pending::<()>(), Timeout::NonBlocking), None);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(poll(&mut pending::<()>(), Timeout::At(deadline)), None);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn woken_from_other_thread() {
        let (send, mut recv) = oneshot::channel();
        assert!(poll(&mut recv, Timeout::NonBlocking).is_none());
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            send.send(3).unwrap();
        });
        assert_eq!(poll(&mut recv, Timeout::Never), Some(Ok(3)));
        join.join().unwrap();
    }
}
