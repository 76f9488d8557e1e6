//! Embedded SQLite-backed durable stores (§4.2, §4.3, §4.10.1).
//!
//! Dolt itself is driven as an external CLI process (see the `dmms-dolt`
//! crate), so it can't double as the pending-op log's backing store — a
//! durable local queue is needed regardless of whether the VCS process is
//! reachable at the moment an operation is recorded. `rusqlite` (bundled)
//! gives each repository its own embedded, dependency-free `.db` file for
//! that queue.

pub mod migrations;
pub mod pending_ops;
pub mod sync_state;

pub use pending_ops::PendingOpStore;
pub use sync_state::SyncStateStore;
