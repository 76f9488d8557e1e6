//! Chroma vector-store gateways for the sync core.
//!
//! Two implementations of [`dmms_core::gateway::ChromaGateway`] are provided:
//! [`PersistentChromaGateway`] wraps an embedded SQLite database (for local
//! development or single-process servers), and [`HttpChromaGateway`] talks to
//! a running Chroma server's REST API. Both implement
//! [`dmms_core::chunk::ChunkLookup`] so chunk-ID resolution works the same
//! way regardless of which backend is in play.

mod http;
mod persistent;

pub use http::HttpChromaGateway;
pub use persistent::PersistentChromaGateway;
