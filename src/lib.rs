//! procgov - rule-driven process governor
//!
//! This library exposes the rule file model, the matching and application
//! engine and the governor loop that ties them to the operating system.

#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod error;
pub mod models;
pub mod monitor;
pub mod output;
pub mod platform;
pub mod rules;
pub mod scheduler;
