//! Yieldloop Backend Library
//!
//! Exposes core modules for use by the binary and integration tests.
//! All modules are standalone; the binary only does wiring.

pub mod api;
pub mod hub;
pub mod models;
pub mod oracle;
pub mod reactive;
pub mod vault;
