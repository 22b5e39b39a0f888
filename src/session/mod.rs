//! Per-client sessions
//!
//! The boundary between the request layer and the fan-out core. A request
//! opens a [`ConsumerSession`], streams from it, and the session gives its
//! subscriber and hub reference back on every exit path.

pub mod consumer;

pub use consumer::{ConsumerSession, SessionEnd};
