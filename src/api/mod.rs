//! HTTP API Module
//!
//! Provides the REST API of both node roles.

mod http;

pub use http::{master_router, slave_router, HttpServer, MasterState, SlaveState};
