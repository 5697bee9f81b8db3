//! The seam between the request lifecycle and the host's I/O.
//!
//! # Design
//! A `Transport` executes one `HttpRequest` per `send` call and reports
//! what happens through the supplied `TransportEvents` sink: any number of
//! progress events followed by one terminal event. Events may be emitted
//! synchronously from inside `send` or later from any thread. Duplicate or
//! late terminal events are tolerated; the handle ignores everything after
//! the first.

use crate::http::HttpRequest;

pub use crate::handle::TransportEvents;

/// Host-provided request executor.
pub trait Transport: Send + Sync {
    /// Start the exchange described by `request`.
    fn send(&self, request: HttpRequest, events: TransportEvents) -> Box<dyn Exchange>;
}

/// One in-flight exchange started by a `Transport`.
pub trait Exchange: Send {
    /// Whether the exchange reached its terminal ready state.
    fn is_done(&self) -> bool;

    /// Ask the transport to cancel. The resulting `aborted` event is
    /// expected through the event sink, possibly later.
    fn abort(&mut self);
}
