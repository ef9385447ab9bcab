//! CLI command implementations
//!
//! Each command is implemented in its own module.

pub mod checkout;
pub mod reconcile;
pub mod status;
pub mod update;
