//! Ebridge Core Library
//!
//! Core domain models, state machines, error types and configuration shared
//! across all ebridge components. This crate performs no I/O: lifecycle
//! legality, batch roll-up rules and structural-edit guards are plain
//! functions so that every other crate treats them as the single source of
//! truth.

pub mod config;
pub mod error;
pub mod models;

pub use config::{BaseConfig, BatchConfig, Config, ProviderConfig};
pub use error::AppError;
