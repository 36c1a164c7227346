//! Middleware layer.
//!
//! A middleware is a handler that owns a [`Next`](crate::Next) and decides,
//! per request, whether to pass the request along. It exposes itself as a
//! [`Handler`](crate::Handler), so the router cannot tell it apart from the
//! route handler it wraps.
//!
//! Built-in middleware:
//! - [`simulated`]: provisions a simulated device on the IoT hub before
//!   letting a device-link request through

pub mod simulated;
