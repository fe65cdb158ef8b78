//! HTTP request handlers for the Manager API.
//!
//! - `common` - Shared response envelope and error mapping
//! - `repair` - Repair control and run history endpoints

pub mod common;
pub mod repair;

pub use repair::*;
