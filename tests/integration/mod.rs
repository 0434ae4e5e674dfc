//! Integration tests for Keyvault
//!
//! These tests verify the behavior of the API endpoints with a real
//! (in-memory) database and all middleware.

mod api_tests;
mod rate_limit_tests;
mod vault_tests;
