//! Broadcast hubs
//!
//! A hub owns one upstream transcoder and fans its output out to every
//! subscriber of that source. One distribution task per hub reads fixed-size
//! chunks from the upstream and pushes each chunk into every subscriber's
//! bounded queue.
//!
//! # Architecture
//!
//! ```text
//!   [transcoder stdout]
//!           │ read(chunk_size)
//!           ▼
//!   distribution task ── snapshot of subscribers (read lock)
//!           │
//!     ┌─────┼──────────────┐
//!     ▼     ▼              ▼
//!   mpsc  mpsc    ...    mpsc     (bounded, queue_capacity)
//!     │     │              │
//!  session session      session ──► HTTP body
//! ```
//!
//! # Backpressure
//!
//! Delivery to each subscriber is bounded by `delivery_timeout`. A subscriber
//! whose queue stays full for that long simply misses the chunk; other
//! subscribers are not held up. Live audio favours freshness over
//! completeness, so gaps are silent (only counted in [`HubStats`]).
//!
//! `Bytes` is reference counted, so each chunk is copied out of the read
//! buffer once and then shared by all subscribers.

pub mod broadcast;
pub mod config;
pub mod subscriber;

pub use broadcast::{BroadcastHub, HubState, HubStats};
pub use config::HubConfig;
pub use subscriber::Subscriber;
