/// ArcID - decentralized identity issuance
///
/// Verifies proof-of-personhood, scores KYC attributes, publishes identity
/// metadata to a content-addressed store, records the identity in an
/// on-chain registry and keeps an off-chain mirror for history and
/// dApp connections.

pub mod address;
pub mod api;
pub mod auth;
pub mod config;
pub mod content_store;
pub mod context;
pub mod crypto;
pub mod db;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod mirror;
pub mod orchestrator;
pub mod proof;
pub mod rate_limit;
pub mod scoring;
pub mod server;

pub use context::AppContext;
pub use error::{ArcIdError, ArcIdResult};
