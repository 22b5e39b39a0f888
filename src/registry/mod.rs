//! Source registry
//!
//! Maps each source key to its live [`BroadcastHub`] and is the only place
//! where hubs are created or torn down.
//!
//! # Lifetime
//!
//! ```text
//!   acquire ──► refcount += 1 ─────────────────────────────┐
//!                                                           │
//!   Lease::release ──► refcount -= 1 ──► 0? ──► sleep(grace)│
//!                                                │          │
//!                              registry lock ◄───┘          │
//!                              same hub id && refcount == 0?│
//!                               yes: close + remove         │
//!                               no:  keep running ◄─────────┘
//! ```
//!
//! The refcount is re-checked when the grace timer fires, under the same lock
//! `acquire` takes, so a reconnect inside the window keeps the transcoder
//! alive. Every hub carries a generation id; stale teardown tasks that find a
//! different hub under their key leave it alone.
//!
//! [`BroadcastHub`]: crate::hub::BroadcastHub

pub mod config;
pub mod key;
pub mod lease;
pub mod store;

pub use config::RegistryConfig;
pub use key::SourceKey;
pub use lease::Lease;
pub use store::SourceRegistry;
