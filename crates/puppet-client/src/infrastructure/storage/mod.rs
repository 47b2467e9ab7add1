//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the optional TOML file, fills in defaults
//! for anything absent, and converts the result into the settings objects
//! the network worker, handoff and host loop take.

pub mod config;
