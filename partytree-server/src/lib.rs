//! Party invite tree.
//!
//! Hosts hand out invite links, invitees hand out their own, down to a fixed
//! depth. Each RSVP is approved only once someone the participant invited has
//! confirmed, recursively, and the whole tree freezes into a permanent
//! snapshot when the party starts.
//!
//! - `identity`: phone normalization for per-event uniqueness
//! - `store`: SQLite rows and scoped transactions
//! - `tree`: root and child creation
//! - `invite`: invite link minting and redemption
//! - `approval`: RSVP approval and upward propagation
//! - `freeze`: lock check and snapshot
//! - `engine`: transactional operations over all of the above
//! - `api`: HTTP endpoints

pub mod api;
pub mod approval;
pub mod config;
pub mod engine;
pub mod error;
pub mod freeze;
pub mod identity;
pub mod invite;
pub mod server;
pub mod store;
pub mod tree;
pub mod types;

pub use engine::{PartyEngine, RsvpOutcome, SnapshotView};
pub use error::EngineError;
pub use store::TreeStore;
