#![forbid(unsafe_code)]

//! gallery-sync — scan engine for a media-library synchronization service.
//!
//! Walks configured source directories, classifies qualifying image
//! collections ("galleries") and loose archives, plans idempotent output
//! actions (zip/foldercopy materialization under an output root), and
//! executes those actions atomically. Driven by a background job queue and
//! an optional auto-scan tick loop, with activity reported through a
//! dual-write (SQLite + JSONL) sink.

#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod job;
pub mod logger;
pub mod prelude;
pub mod scanner;
pub mod status;
pub mod store;
