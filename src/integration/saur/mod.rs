//! SAUR Integration Module
//! The integration is done via the SAUR customer HTTP JSON API.
mod client;
mod error;
mod http_client;
mod schemas;

pub use client::Client;
pub use error::{Error, ErrorKind, Result};
