//! Process-based Dolt CLI gateway (§4, §6).
//!
//! Dolt has no first-class Rust client, so this crate drives the `dolt`
//! binary as a subprocess the same way `dmms-core`'s teacher drives `git`:
//! one `Command` per operation, stdout/stderr captured, exit code checked.
//! Every value that has to cross into a SQL string literal goes through
//! [`dmms_core::sqljson`] first.

mod cli;

pub use cli::{DoltCliGateway, DoltConfig};
