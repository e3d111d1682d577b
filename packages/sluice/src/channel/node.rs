// node part of channel: a single exchange point between one give and one next.

use super::api::future::Consumed;
use tokio::sync::oneshot;


// what a node resolves to.
pub(crate) enum Delivery<T, E> {
    // a given value, along with the sender for its consumed signal.
    Value(T, oneshot::Sender<()>),
    // the channel was closed, with an optional final value.
    Done(Option<T>),
    // the channel was errored.
    Error(E),
}

// single exchange point. begins with both halves of a single-assignment slot.
//
// - `fill` is taken when a value or terminal outcome is sent through the node.
// - `claim` is taken when a request claims the node.
//
// once both are taken the node has been passed by both cursors and may be dropped.
pub(crate) struct Node<T, E> {
    fill: Option<oneshot::Sender<Delivery<T, E>>>,
    claim: Option<oneshot::Receiver<Delivery<T, E>>>,
}

impl<T, E> Node<T, E> {
    // construct a pending node.
    pub(crate) fn new() -> Self {
        let (fill, claim) = oneshot::channel();
        Node { fill: Some(fill), claim: Some(claim) }
    }

    // resolve this node with a value. returns the consumed signal for it, and the delivery back
    // if it was undeliverable.
    pub(crate) fn send(&mut self, value: T) -> (Consumed, Option<Delivery<T, E>>) {
        let (consumed_send, consumed_recv) = oneshot::channel();
        let undelivered = self.resolve(Delivery::Value(value, consumed_send));
        (Consumed::new(consumed_recv), undelivered)
    }

    // resolve this node with a done outcome.
    pub(crate) fn close(&mut self, value: Option<T>) -> Option<Delivery<T, E>> {
        self.resolve(Delivery::Done(value))
    }

    // resolve this node with an error.
    pub(crate) fn error(&mut self, error: E) -> Option<Delivery<T, E>> {
        self.resolve(Delivery::Error(error))
    }

    // resolve this node with a delivery.
    //
    // panics if already resolved. if the request that claimed this node has since been dropped,
    // the delivery is handed back. it holds user values, so the caller must not drop it while
    // the channel is locked. dropping it makes a value's consumed signal resolve to err.
    fn resolve(&mut self, delivery: Delivery<T, E>) -> Option<Delivery<T, E>> {
        let fill = self.fill.take().expect("internal bug: node resolved twice");
        match fill.send(delivery) {
            Ok(()) => None,
            Err(delivery) => {
                trace!("delivery returned from abandoned request");
                Some(delivery)
            }
        }
    }

    // take the receiving half of this node's slot.
    //
    // panics if already claimed.
    pub(crate) fn claim(&mut self) -> oneshot::Receiver<Delivery<T, E>> {
        self.claim.take().expect("internal bug: node claimed twice")
    }

    // whether this node has been resolved.
    pub(crate) fn is_resolved(&self) -> bool {
        self.fill.is_none()
    }

    // whether this node has been claimed by a request.
    pub(crate) fn is_claimed(&self) -> bool {
        self.claim.is_none()
    }
}
