//! Shared types and error definitions used across all missive crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, Result},
    types::{Headers, Request, Response, Type},
};
