//! # pickr-core
//!
//! Core crate for the Pickr job monitor. Contains the configuration schema,
//! the job and queue domain types, change-notification events, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other Pickr crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
