//! Core domain + application logic for clipwatch.
//!
//! This crate is intentionally framework-agnostic. Telegram / yt-dlp / the RSS
//! mirror live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod ports;
pub mod scan;
pub mod scheduler;
pub mod source_chain;
pub mod store;

pub use errors::{Error, Result};
