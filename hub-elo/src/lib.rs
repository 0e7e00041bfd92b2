//! Match ingestion and Elo-style ratings for FACEIT hubs.
//!
//! A run lists a hub's past matches, fetches their stats concurrently and
//! folds them oldest first into a player store and a match store.
#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![allow(clippy::cast_precision_loss)]

pub mod api;
pub mod balance;
pub mod builder;
pub mod config;
pub mod elo;
pub mod ingest;
pub mod parser;
pub mod persist;
pub mod stats;
pub mod task;
pub mod types;
