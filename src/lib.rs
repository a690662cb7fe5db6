//! tripsync - offline-first trip planner sync
//!
//! This crate provides the sync engine behind the `tripsync` CLI: a local
//! SQLite cache that keeps working without a network, an online-first
//! repository layer over a remote store, and portable trip export/import.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Trip graph entities and their dual-keyed identity
//! - [`remote`] - Remote store client (REST) and an in-memory store
//! - [`connectivity`] - Reachability probe for the remote store
//! - [`storage`] - SQLite local cache
//! - [`sync`] - Repositories, reconciliation, access gate, import/export
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
