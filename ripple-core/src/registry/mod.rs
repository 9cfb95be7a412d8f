//! Session Registry
//!
//! The registry is the single answer to "is this session alive". Every
//! component that needs a lookup (stream endpoint, action gateway, close
//! endpoint, reaper) is handed the same `Arc<SessionRegistry>`; there is no
//! global table.
//!
//! # Lifecycle
//!
//! ```text
//!   page request ──► register ──► stream attaches ──► ... ──┐
//!                       │                                   │
//!                       └── no stream past TTL ──► reaper ──┤
//!                                                           ▼
//!                              close beacon / stream end ─► evict
//! ```
//!
//! `evict` disposes before unregistering. Both steps are idempotent, so the
//! reaper, the stream and the close endpoint may race on the same session.

mod reaper;
mod table;

pub use reaper::{reap_expired, Reaper};
pub use table::SessionRegistry;
