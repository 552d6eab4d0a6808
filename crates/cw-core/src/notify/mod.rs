//! Outbound notification channel abstractions.

pub mod port;
pub mod throttled;
