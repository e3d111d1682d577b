// implementation of the sluice channel.
//
// the basic architecture is as such:
//
// channel handles wrap around Arc<Mutex<shared state>>
//                                         |
//          /------------------------------/
//          v
//       shared state
//          |
//          |------ it contains a chain::Chain of nodes, a singly linked list which spans from
//          |       the lagging cursor (its front) to the leading cursor (its back):
//          |
//          |       - the input cursor is where the next give lands.
//          |       - the output cursor is where the next request reads.
//          |
//          |       each node is a single exchange point: a oneshot slot which a give resolves and
//          |       a request claims. the nodes between the cursors are the backlog, which is
//          |       either buffered values (output lags) or waiting requests (input lags), never
//          |       both. the back node is always fresh, so a channel with no backlog holds exactly
//          |       one node. a node is dropped as soon as both cursors have passed it.
//          |
//          \------ it contains the terminal state, set once by close or error and never
//                  changed again. requests made once it is set and buffered values are drained
//                  resolve straight to it without touching the chain.
//
// each given value carries a second oneshot back to its producer, which the request that takes
// the value fires. this is the backpressure signal.
//
// blocking versions of operations are built as a layer on top of the futures, in the polling
// module.
//
// the organization of these modules is as such:
//
//      These are used like
//      library utilities:
//    /--------------------\
//
//      chain<-----------------core: This holds all of the unsafety and the cursor logic. It
//                   |         ^     presents an abstraction for channels which is fully safe and
//      node<--------/         |     sound, but panicky and inconvenient.
//                             |
//      polling<---------------api: This is a wrapper around core that adapts it into an API that
//                                  is convenient and defensive. The crate re-exports this API
//                                  publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;

mod chain;
mod node;
mod polling;
mod core;
