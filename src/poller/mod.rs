//! Generic poll driver.
//!
//! Turns a non-blocking, maybe-empty poll function into a blocking wait for
//! the next payload or a notification loop that dispatches a handler per
//! payload, with adaptive back-off between empty polls and cooperative
//! cancellation.

mod driver;

pub use driver::{
    handler_fn, DriverMode, HandlerFuture, PayloadHandler, PollDriver, PollFn, PollFuture,
    PollOutcome,
};
