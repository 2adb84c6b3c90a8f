//! # ironaudit-cli
//!
//! Command line front end for the audit engine.
//!
//! - `ironaudit audit`: one audit run, settings from `ironaudit.toml` plus flags
//! - `ironaudit rules`: list or validate default configuration rules
//! - `ironaudit config`: validate or show the effective settings

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
