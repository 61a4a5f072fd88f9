//! loongshot - rebuild queue, build driver and package ledger for the
//! loong64 distribution port
//!
//! This library provides:
//! - A durable multi-list task queue with priority insertion and
//!   at-most-once dequeue across worker processes
//! - A package ledger holding build status bits and failure codes
//! - Build-log classification and the retrying build orchestrator
//! - The `loongshot` command-line interface
//!
//! # Example
//!
//! ```no_run
//! use loongshot::db::DbConnection;
//! use loongshot::models::{Channel, InsertMode};
//! use loongshot::repo::TaskRepo;
//!
//! let conn = DbConnection::connect().unwrap();
//! let names = vec!["zlib".to_string(), "xz".to_string()];
//! TaskRepo::enqueue(&conn, &names, 1, Channel::Stable, InsertMode::Append).unwrap();
//! ```

pub mod build;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repo;
pub mod utils;
