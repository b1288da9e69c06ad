//! wodata Terraform Provider
//!
//! Terraform provider exposing a single `wodata_wo_data` resource that turns
//! a write-only input into persisted state when its version changes. Speaks
//! the Terraform Plugin Protocol v6.

pub mod config;
pub mod error;
pub mod id;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod state;
pub mod tfplugin6;

pub use error::{Error, Result};
pub use provider::WodataProvider;
