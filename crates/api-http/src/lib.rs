//! # STSV HTTP
//!
//! HTTP surface of the STSV state backend:
//! - the Terraform HTTP backend protocol adapter at `/api/<name>`
//!   (GET/POST/DELETE/LOCK/UNLOCK with `Content-MD5` and `?ID=` semantics)
//! - a read-only HTML browsing UI at `/html/`
//! - optional HTTP Basic authentication over both
//!
//! All handlers are thin mappings onto the `stsv-core` datastore; this
//! crate adds no storage semantics of its own.

mod api;
mod config;
mod error;
mod html;
mod server;

pub use config::{BasicAuth, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::StateServer;
