//! Common utilities and types shared across Harbor modules.
//!
//! This module provides the error taxonomy and the request/response model
//! that every other crate speaks: the router, the strategies, the cache
//! stores and the pending-operation queue.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Headers, Method, Request, RequestKey, RequestMode, Response, ResponseSource};
