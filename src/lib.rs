//! Code Relay Bot - watches source channels for code drops and rebroadcasts
//! them to subscriber channels with per-destination link rewriting.
//!
//! This library provides the recognition, deduplication, directory, and
//! fan-out logic; the binary wires it to the Bot API and Postgres.

pub mod broadcast;
pub mod config;
pub mod dedup;
pub mod directory;
pub mod ingest;
pub mod recognize;
pub mod relay;
pub mod telegram;
pub mod types;
