//! Data models

mod access;
mod audit;
mod client;
mod secret;
mod team;
mod user;

pub use access::*;
pub use audit::*;
pub use client::*;
pub use secret::*;
pub use team::*;
pub use user::*;
