//! Benchline Core
//!
//! Core domain types, traits, and error handling for Benchline.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod artifact;
pub mod change;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod ports;
pub mod run;
pub mod secrets;

pub use error::{Error, Result};
pub use ids::*;
