//! Fileflow Common Library
//!
//! Shared types, utilities, and error handling for the fileflow workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all fileflow
//! workspace members:
//!
//! - **Error Handling**: the [`FlowError`] type and [`Result`] alias
//! - **Logging**: tracing subscriber configuration and initialization
//! - **Types**: lineage records shared by the engine and the store layer

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{FlowError, Result};
