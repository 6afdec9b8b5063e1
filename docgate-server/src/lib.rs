//! HTTP surface of docgate.
//!
//! Exposes every collection of the configured store under `/{collection}` with
//! create, list, read, update and delete routes, plus filtered bulk updates and
//! deletes. Writes can be gated behind signed owner tokens.

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod state;

pub use config::{AppConfig, loader::load_config};
pub use error::ApiError;
pub use server::{build_app, build_router, build_store, run};
