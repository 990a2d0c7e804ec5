//! grelwater - Sync water meter consumption history from SAUR to Home Assistant.
pub mod core;
pub mod integration;
pub mod models;
pub mod server;
pub mod services;
pub mod storage;
