//! # Data Retrieval Module
//!
//! The shared HTTP layer used by the API and web-portal sources: request
//! building, body reading and request logging with credentials masked.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: `ApiClient`, a `reqwest` client composed with
//!   `reqwest-middleware`, plus the `RequestLogger` middleware.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with request-logging middleware.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse, ClientOptions};
