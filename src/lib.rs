//! Whale Alert Library
//!
//! Polls a DEX subgraph for large liquidity events and posts tiered Discord alerts

pub mod alerts;
pub mod config;
pub mod dedup;
pub mod persistence;
pub mod scheduler;
pub mod subgraph;
pub mod types;
