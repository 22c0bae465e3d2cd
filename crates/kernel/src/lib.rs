//! Sift Kernel Library
//!
//! Configuration-driven search, filtering and pagination over tabular data
//! sources. The main entry point for running the server is the `sift`
//! binary.

pub mod config;
pub mod db;
pub mod error;
pub mod registry;
pub mod routes;
pub mod search;
pub mod source;
pub mod state;
