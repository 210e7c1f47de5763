//! # Service Keeper Testing Utils
//!
//! Shared testing utilities for the service keeper workspace: recording test
//! doubles for the bus, directory and mediator traits, plus builders for task
//! graphs and service advertisements.
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! keeper-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
