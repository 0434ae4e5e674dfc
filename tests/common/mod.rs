//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Test fixtures and factories
//! - Test database setup
//! - API test client

pub mod fixtures;
pub mod test_app;

pub use fixtures::*;
pub use test_app::*;
