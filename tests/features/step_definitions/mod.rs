//! Step definitions for Cucumber scenarios

pub mod common_steps;
pub mod rate_limit_steps;
pub mod team_steps;
pub mod vault_steps;
