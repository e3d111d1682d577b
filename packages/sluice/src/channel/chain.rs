// linked chain part of channel.

use std::ptr::NonNull;


// singly linked chain of nodes. never empty.
//
// the front node is the node at whichever cursor is lagging, the back node is the node at
// whichever cursor is leading. every node between them is backlog.
pub(crate) struct Chain<N> {
    // first link, towards which nodes are unlinked.
    front: NonNull<Link<N>>,
    // last link, after which nodes are linked.
    back: NonNull<Link<N>>,
    // number of links. always at least 1.
    len: usize,
}

// heap allocation for a link.
struct Link<N> {
    node: N,
    // next link towards back. none if and only if this is the back.
    next: Option<NonNull<Link<N>>>,
}

// allocate a new unlinked link.
fn alloc<N>(node: N, next: Option<NonNull<Link<N>>>) -> NonNull<Link<N>> {
    NonNull::from(Box::leak(Box::new(Link { node, next })))
}

impl<N> Chain<N> {
    // construct a chain containing only the given node.
    pub(crate) fn new(node: N) -> Self {
        let link = alloc(node, None);
        Chain { front: link, back: link, len: 1 }
    }

    // number of nodes in the chain.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    // borrow the front node.
    pub(crate) fn front(&mut self) -> &mut N {
        // safety: front is always a live link owned by self.
        unsafe { &mut self.front.as_mut().node }
    }

    // borrow the back node.
    pub(crate) fn back(&mut self) -> &mut N {
        // safety: back is always a live link owned by self.
        unsafe { &mut self.back.as_mut().node }
    }

    // link the node to the back of this chain.
    pub(crate) fn push_back(&mut self, node: N) {
        let link = alloc(node, None);
        unsafe {
            // safety: back is a live link owned by self.
            let back_link = self.back.as_mut();
            debug_assert!(back_link.next.is_none());
            back_link.next = Some(link);
        }
        self.back = link;
        self.len += 1;
    }

    // link the node to the front of this chain.
    pub(crate) fn push_front(&mut self, node: N) {
        self.front = alloc(node, Some(self.front));
        self.len += 1;
    }

    // unlink and return the front node.
    //
    // panics if it is the only node, as the chain is never empty.
    pub(crate) fn pop_front(&mut self) -> N {
        assert!(self.len > 1, "internal bug: popped last node of chain");
        // safety: front is a live link owned by self, and we immediately stop referencing it.
        let link = unsafe { Box::from_raw(self.front.as_ptr()) };
        self.front = link.next.unwrap();
        self.len -= 1;
        link.node
    }
}

impl<N> Drop for Chain<N> {
    fn drop(&mut self) {
        // all links are owned by the chain
        let mut next = Some(self.front);
        while let Some(curr) = next {
            let link = unsafe { Box::from_raw(curr.as_ptr()) };
            next = link.next;
            drop(link);
        }
    }
}


unsafe impl<N: Send> Send for Chain<N> {}
unsafe impl<N: Sync> Sync for Chain<N> {}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{rc::Rc, cell::Cell};

    #[allow(dead_code)]
    fn ensure_chain_is_send() -> impl Send {
        Chain::new(0u32)
    }

    #[allow(dead_code)]
    fn ensure_chain_is_sync() -> impl Sync {
        Chain::new(0u32)
    }

    #[test]
    fn push_and_pop_order() {
        let mut chain = Chain::new(1);
        chain.push_back(2);
        chain.push_back(3);
        chain.push_front(0);
        assert_eq!(chain.len(), 4);
        assert_eq!(*chain.back(), 3);
        assert_eq!(chain.pop_front(), 0);
        assert_eq!(chain.pop_front(), 1);
        assert_eq!(chain.pop_front(), 2);
        assert_eq!(*chain.front(), 3);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn front_and_back_coincide_when_single() {
        let mut chain = Chain::new(String::from("a"));
        chain.front().push('b');
        assert_eq!(chain.back().as_str(), "ab");
    }

    #[test]
    #[should_panic]
    fn pop_last_panics() {
        let mut chain = Chain::new(());
        chain.pop_front();
    }

    #[test]
    fn drop_frees_every_node() {
        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut chain = Chain::new(Counted(Rc::clone(&drops)));
        for _ in 0..9 {
            chain.push_back(Counted(Rc::clone(&drops)));
        }
        chain.push_front(Counted(Rc::clone(&drops)));
        drop(chain.pop_front());
        assert_eq!(drops.get(), 1);
        drop(chain);
        assert_eq!(drops.get(), 11);
    }
}
