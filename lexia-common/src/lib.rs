//! Lexia Common - Shared configuration, logging, and security helpers.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment overrides)
//! - Configuration validation
//! - Logging setup and request trace context
//! - Constant-time secret comparison

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod security;
pub mod validation;

pub use config::{
    AgentConfig, AuthConfig, Config, DedupConfig, ObservabilityConfig, ServerConfig,
};
pub use validation::{Validate, ValidationError, ValidationResult};
